use std::collections::HashMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::WriterError;

/// Buffer in front of each open file. A full buffer makes `write` wait for the disk.
pub const WRITE_BUFFER_BYTES: usize = 1024 * 1024;

/// Staging path for `path`: the same name with `.part` appended
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Append-only file sink with atomic promotion.
///
/// All operations are keyed by the final path of the recording.
#[async_trait]
pub trait DiskSink: Send + Sync {
    /// Open `<path>.part` for streaming. Returns the partial path.
    async fn open(&self, path: &Path) -> Result<PathBuf, WriterError>;

    /// Append bytes. Resolves once they are buffered or flushed.
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), WriterError>;

    /// Flush and release the handle. A no-op when nothing is open.
    async fn close(&self, path: &Path) -> Result<(), WriterError>;

    /// Close if needed and rename the partial file to `path`
    async fn finalize(&self, path: &Path) -> Result<PathBuf, WriterError>;

    /// Close if needed and remove the partial file
    async fn delete_partial(&self, path: &Path) -> Result<(), WriterError>;

    /// Write a complete payload, promoted atomically like a streamed one
    async fn save(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, WriterError>;
}

type Handle = Arc<Mutex<BufWriter<File>>>;

/// Local filesystem sink allowing one open handle per path
#[derive(Default)]
pub struct ChunkedDiskWriter {
    handles: Mutex<HashMap<PathBuf, Handle>>,
}

impl ChunkedDiskWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stream is currently open for `path`
    pub async fn is_open(&self, path: &Path) -> bool {
        self.handles.lock().await.contains_key(path)
    }

    async fn take_handle(&self, path: &Path) -> Option<Handle> {
        self.handles.lock().await.remove(path)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), WriterError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| WriterError::io(parent, e))?;
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool, WriterError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(WriterError::io(path, e)),
    }
}

async fn flush_handle(handle: Handle, part: &Path) -> Result<(), WriterError> {
    let mut writer = handle.lock().await;
    writer.flush().await.map_err(|e| WriterError::io(part, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| WriterError::io(part, e))
}

/// An existing file at `path` is replaced atomically by the rename
async fn promote(part: &Path, path: &Path) -> Result<PathBuf, WriterError> {
    fs::rename(part, path)
        .await
        .map_err(|e| WriterError::io(path, e))?;
    Ok(path.to_path_buf())
}

#[async_trait]
impl DiskSink for ChunkedDiskWriter {
    async fn open(&self, path: &Path) -> Result<PathBuf, WriterError> {
        let mut handles = self.handles.lock().await;
        if handles.contains_key(path) {
            return Err(WriterError::AlreadyOpen(path.to_path_buf()));
        }

        ensure_parent(path).await?;
        let part = partial_path(path);
        if remove_if_exists(&part).await? {
            warn!("Removed stale partial file {:?}", part);
        }
        let file = File::create(&part)
            .await
            .map_err(|e| WriterError::io(&part, e))?;

        handles.insert(
            path.to_path_buf(),
            Arc::new(Mutex::new(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file))),
        );
        info!("Streaming recording to {:?}", part);
        Ok(part)
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), WriterError> {
        let handle = self
            .handles
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| WriterError::NotOpen(path.to_path_buf()))?;

        let mut writer = handle.lock().await;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| WriterError::io(partial_path(path), e))
    }

    async fn close(&self, path: &Path) -> Result<(), WriterError> {
        match self.take_handle(path).await {
            Some(handle) => {
                flush_handle(handle, &partial_path(path)).await?;
                debug!("Closed recording stream for {:?}", path);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn finalize(&self, path: &Path) -> Result<PathBuf, WriterError> {
        self.close(path).await?;
        let final_path = promote(&partial_path(path), path).await?;
        info!("Recording finalized at {:?}", final_path);
        Ok(final_path)
    }

    async fn delete_partial(&self, path: &Path) -> Result<(), WriterError> {
        if let Some(handle) = self.take_handle(path).await {
            // Contents are discarded; a failed flush does not matter here
            if let Err(e) = flush_handle(handle, &partial_path(path)).await {
                debug!("Ignoring flush failure before delete: {}", e);
            }
        }
        let part = partial_path(path);
        if remove_if_exists(&part).await? {
            info!("Deleted partial recording {:?}", part);
        }
        Ok(())
    }

    async fn save(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, WriterError> {
        ensure_parent(path).await?;
        let part = partial_path(path);
        let mut file = File::create(&part)
            .await
            .map_err(|e| WriterError::io(&part, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| WriterError::io(&part, e))?;
        file.sync_all().await.map_err(|e| WriterError::io(&part, e))?;
        drop(file);

        let final_path = promote(&part, path).await?;
        info!("Saved {} byte recording to {:?}", bytes.len(), final_path);
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/rec.mp4")),
            PathBuf::from("/tmp/rec.mp4.part")
        );
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        let writer = ChunkedDiskWriter::new();

        writer.open(&path).await.unwrap();
        let err = writer.open(&path).await.unwrap_err();
        assert!(matches!(err, WriterError::AlreadyOpen(_)));
    }

    #[tokio::test]
    async fn test_write_without_open_fails() {
        let dir = TempDir::new().unwrap();
        let writer = ChunkedDiskWriter::new();
        let err = writer.write(&dir.path().join("x.mp4"), b"data").await.unwrap_err();
        assert!(matches!(err, WriterError::NotOpen(_)));
    }

    #[tokio::test]
    async fn test_open_replaces_stale_partial_and_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/rec.mp4");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(partial_path(&path), b"crash leftovers").unwrap();

        let writer = ChunkedDiskWriter::new();
        writer.open(&path).await.unwrap();
        writer.write(&path, b"new").await.unwrap();
        writer.finalize(&path).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_delete_partial_without_open_is_ok() {
        let dir = TempDir::new().unwrap();
        let writer = ChunkedDiskWriter::new();
        writer.delete_partial(&dir.path().join("none.mp4")).await.unwrap();
        writer.close(&dir.path().join("none.mp4")).await.unwrap();
    }

    #[tokio::test]
    async fn test_promote_never_leaves_target_missing() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("take.mp4");
        let part = partial_path(&path);
        std::fs::write(&path, b"take 0").unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let watcher = {
            let done = done.clone();
            let path = path.clone();
            std::thread::spawn(move || {
                let mut gaps = 0;
                while !done.load(Ordering::Relaxed) {
                    if !path.exists() {
                        gaps += 1;
                    }
                }
                gaps
            })
        };

        for take in 1..=200 {
            std::fs::write(&part, format!("take {}", take)).unwrap();
            promote(&part, &path).await.unwrap();
        }
        done.store(true, Ordering::Relaxed);

        assert_eq!(watcher.join().unwrap(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"take 200");
        assert!(!part.exists());
    }
}
