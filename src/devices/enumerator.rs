use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::capture::CaptureBackend;

/// Device ids that alias another physical device
const ALIAS_IDS: [&str; 2] = ["default", "communications"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    /// Physical device group; empty when the platform does not report one
    pub group_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

impl DeviceDescriptor {
    pub fn is_alias(&self) -> bool {
        ALIAS_IDS.contains(&self.device_id.as_str())
    }
}

/// Deduplicated microphones and cameras
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLists {
    pub mics: Vec<DeviceDescriptor>,
    pub cameras: Vec<DeviceDescriptor>,
}

impl DeviceLists {
    pub fn from_devices(devices: &[DeviceDescriptor]) -> Self {
        let of_kind = |kind: DeviceKind| -> Vec<DeviceDescriptor> {
            devices.iter().filter(|d| d.kind == kind).cloned().collect()
        };

        Self {
            mics: dedup_by_group(&of_kind(DeviceKind::AudioInput)),
            cameras: dedup_by_group(&of_kind(DeviceKind::VideoInput)),
        }
    }
}

/// Keep one device per physical group, preferring a non-alias id.
///
/// Groups are keyed by `group_id`, or by `device_id` when the group is
/// missing. Output order follows the first appearance of each group.
pub fn dedup_by_group(devices: &[DeviceDescriptor]) -> Vec<DeviceDescriptor> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&DeviceDescriptor>> = HashMap::new();

    for device in devices {
        let key = if device.group_id.is_empty() {
            device.device_id.as_str()
        } else {
            device.group_id.as_str()
        };
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(device);
    }

    order
        .iter()
        .filter_map(|key| {
            let members = groups.get(key)?;
            members
                .iter()
                .find(|d| !d.is_alias())
                .or_else(|| members.first())
                .map(|d| (*d).clone())
        })
        .collect()
}

/// Keep a previous selection only if the device is still present
pub fn retain_selection(previous: Option<&str>, devices: &[DeviceDescriptor]) -> Option<String> {
    previous
        .filter(|id| devices.iter().any(|d| d.device_id == *id))
        .map(str::to_string)
}

/// Lists input devices and keeps the lists fresh across hot-plug events.
///
/// Enumeration never fails from the caller's point of view: on error the
/// last-known-good lists are returned.
pub struct DeviceEnumerator {
    backend: Arc<dyn CaptureBackend>,
    last_known: Mutex<DeviceLists>,
    updates: watch::Sender<DeviceLists>,
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            last_known: Mutex::new(DeviceLists::default()),
            updates: watch::channel(DeviceLists::default()).0,
        }
    }

    /// Enumerate and deduplicate devices
    pub async fn list_devices(&self) -> DeviceLists {
        match self.backend.enumerate_devices().await {
            Ok(devices) => {
                let lists = DeviceLists::from_devices(&devices);
                debug!(
                    "Enumerated {} devices: {} mics, {} cameras",
                    devices.len(),
                    lists.mics.len(),
                    lists.cameras.len()
                );
                if let Ok(mut last) = self.last_known.lock() {
                    *last = lists.clone();
                }
                self.updates.send_replace(lists.clone());
                lists
            }
            Err(e) => {
                error!("Device enumeration failed: {:#}", e);
                self.last_known
                    .lock()
                    .map(|last| last.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Receive the device lists every time they are refreshed
    pub fn subscribe(&self) -> watch::Receiver<DeviceLists> {
        self.updates.subscribe()
    }

    /// Re-enumerate on every hot-plug event until the backend goes away.
    ///
    /// Abort the returned handle to unsubscribe.
    pub fn watch_hotplug(self: &Arc<Self>) -> JoinHandle<()> {
        let enumerator = Arc::clone(self);
        let mut changes = self.backend.device_changes();

        tokio::spawn(async move {
            enumerator.list_devices().await;
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        info!("Device change detected, re-enumerating");
                        enumerator.list_devices().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
