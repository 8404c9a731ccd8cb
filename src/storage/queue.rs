// Serialized write queue for one recording
//
// Chunks are written by a single worker in submission order. Each write is
// awaited before the next starts; a failed write is logged and the queue
// moves on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::writer::DiskSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub chunks_written: u64,
    pub chunks_failed: u64,
    pub bytes_written: u64,
}

#[derive(Default)]
struct Counters {
    chunks_written: AtomicU64,
    chunks_failed: AtomicU64,
    bytes_written: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

enum Op {
    Write(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

pub struct WriteQueue {
    tx: Option<mpsc::UnboundedSender<Op>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl WriteQueue {
    /// Start the worker for the stream opened at `path`
    pub fn new(sink: Arc<dyn DiskSink>, path: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(sink, path, rx, counters.clone()));

        Self {
            tx: Some(tx),
            worker: Some(worker),
            counters,
        }
    }

    /// Queue a chunk behind all previously queued ones
    pub fn enqueue(&self, bytes: Vec<u8>) {
        let sent = self.tx.as_ref().is_some_and(|tx| tx.send(Op::Write(bytes)).is_ok());
        if !sent {
            warn!("Write queue closed; dropping chunk");
            self.counters.chunks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Resolve once every chunk queued before this call has settled
    pub async fn flush(&self) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Op::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// Drain outstanding writes and stop the worker
    pub async fn shutdown(&mut self) -> QueueStats {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Write queue worker panicked: {}", e);
            }
        }
        self.stats()
    }
}

async fn run_worker(
    sink: Arc<dyn DiskSink>,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<Op>,
    counters: Arc<Counters>,
) {
    let mut index = 0u64;
    while let Some(op) = rx.recv().await {
        match op {
            Op::Write(bytes) => {
                index += 1;
                match sink.write(&path, &bytes).await {
                    Ok(()) => {
                        counters.chunks_written.fetch_add(1, Ordering::Relaxed);
                        counters
                            .bytes_written
                            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!("Failed to write chunk {} to {:?}: {}", index, path, e);
                        counters.chunks_failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Op::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Write queue for {:?} drained after {} chunks", path, index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriterError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records writes; chunks starting with 0xFF fail
    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl DiskSink for RecordingSink {
        async fn open(&self, path: &Path) -> Result<PathBuf, WriterError> {
            Ok(path.to_path_buf())
        }

        async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), WriterError> {
            if bytes.first() == Some(&0xFF) {
                return Err(WriterError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                ));
            }
            self.written.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        async fn close(&self, _: &Path) -> Result<(), WriterError> {
            Ok(())
        }

        async fn finalize(&self, path: &Path) -> Result<PathBuf, WriterError> {
            Ok(path.to_path_buf())
        }

        async fn delete_partial(&self, _: &Path) -> Result<(), WriterError> {
            Ok(())
        }

        async fn save(&self, path: &Path, _: &[u8]) -> Result<PathBuf, WriterError> {
            Ok(path.to_path_buf())
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_break_chain() {
        let sink = Arc::new(RecordingSink::default());
        let mut queue = WriteQueue::new(sink.clone(), PathBuf::from("rec.mp4"));

        queue.enqueue(vec![1]);
        queue.enqueue(vec![0xFF]);
        queue.enqueue(vec![3, 3]);
        queue.flush().await;

        assert_eq!(*sink.written.lock().unwrap(), vec![vec![1], vec![3, 3]]);
        let stats = queue.shutdown().await;
        assert_eq!(
            stats,
            QueueStats {
                chunks_written: 2,
                chunks_failed: 1,
                bytes_written: 3
            }
        );
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_counted_as_failed() {
        let sink = Arc::new(RecordingSink::default());
        let mut queue = WriteQueue::new(sink, PathBuf::from("rec.mp4"));
        queue.shutdown().await;

        queue.enqueue(vec![1]);
        queue.flush().await;
        assert_eq!(queue.stats().chunks_failed, 1);
    }
}
