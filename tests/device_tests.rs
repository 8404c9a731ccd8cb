// Integration tests for device enumeration and hot-plug refresh

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use screencast_recorder::capture::{SyntheticBackend, SyntheticConfig};
use screencast_recorder::devices::{retain_selection, DeviceDescriptor, DeviceEnumerator, DeviceKind, DeviceLists};
use tokio::sync::watch;

fn camera(id: &str, group: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        device_id: id.to_string(),
        group_id: group.to_string(),
        kind: DeviceKind::VideoInput,
        label: format!("Camera {}", id),
    }
}

async fn next_lists(updates: &mut watch::Receiver<DeviceLists>) -> Result<DeviceLists> {
    tokio::time::timeout(Duration::from_secs(2), updates.changed()).await??;
    Ok(updates.borrow_and_update().clone())
}

#[tokio::test]
async fn test_aliases_collapse_to_one_physical_mic() -> Result<()> {
    let enumerator = DeviceEnumerator::new(Arc::new(SyntheticBackend::default()));
    let lists = enumerator.list_devices().await;

    let mic_ids: Vec<&str> = lists.mics.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(mic_ids, vec!["mic-1", "mic-2"]);
    assert_eq!(lists.cameras.len(), 1);
    assert!(lists.mics.iter().all(|d| !d.is_alias()));
    Ok(())
}

#[tokio::test]
async fn test_hotplug_refreshes_lists() -> Result<()> {
    let backend = Arc::new(SyntheticBackend::default());
    let enumerator = Arc::new(DeviceEnumerator::new(backend.clone()));
    let mut updates = enumerator.subscribe();
    let watcher = enumerator.watch_hotplug();

    let initial = next_lists(&mut updates).await?;
    assert_eq!(initial.cameras.len(), 1);

    backend.plug(camera("cam-2", "cam-group-2"));
    let plugged = next_lists(&mut updates).await?;
    assert_eq!(plugged.cameras.len(), 2);
    assert_eq!(
        retain_selection(Some("cam-2"), &plugged.cameras),
        Some("cam-2".to_string())
    );

    backend.unplug("cam-2");
    let unplugged = next_lists(&mut updates).await?;
    assert_eq!(unplugged.cameras.len(), 1);
    assert_eq!(retain_selection(Some("cam-2"), &unplugged.cameras), None);

    watcher.abort();
    Ok(())
}

#[tokio::test]
async fn test_enumeration_failure_returns_last_known_lists() -> Result<()> {
    let backend = Arc::new(SyntheticBackend::default());
    let enumerator = DeviceEnumerator::new(backend.clone());
    let good = enumerator.list_devices().await;

    backend.reconfigure(|c| c.fail_enumeration = true);
    let after_failure = enumerator.list_devices().await;
    assert_eq!(after_failure, good);
    Ok(())
}

#[tokio::test]
async fn test_failure_before_any_success_is_empty() {
    let backend = Arc::new(SyntheticBackend::new(SyntheticConfig {
        fail_enumeration: true,
        ..Default::default()
    }));
    let enumerator = DeviceEnumerator::new(backend);
    assert_eq!(enumerator.list_devices().await, DeviceLists::default());
}
