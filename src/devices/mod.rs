//! Input device enumeration with per-group deduplication and hot-plug refresh

mod enumerator;

pub use enumerator::{
    dedup_by_group, retain_selection, DeviceDescriptor, DeviceEnumerator, DeviceKind, DeviceLists,
};
