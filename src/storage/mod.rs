//! Streaming recordings to disk
//!
//! A recording is written to `<final>.part` and only promoted to its final
//! name once complete. Writes for one file go through a single ordered queue.

pub mod queue;
pub mod writer;

pub use queue::{QueueStats, WriteQueue};
pub use writer::{partial_path, ChunkedDiskWriter, DiskSink, WRITE_BUFFER_BYTES};
