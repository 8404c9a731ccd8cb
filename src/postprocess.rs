// Container metadata fix-up after a recording is finalized
//
// Streamed MP4 output lacks a seekable index at the front. ffmpeg remuxes it
// with stream copy; nothing is re-encoded.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[async_trait]
pub trait MetadataFixer: Send + Sync {
    /// Fix the container at `path` in place and return the path of the result
    async fn fix(&self, path: &Path) -> Result<PathBuf>;
}

/// Leaves files untouched
pub struct PassthroughFixer;

#[async_trait]
impl MetadataFixer for PassthroughFixer {
    async fn fix(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

pub struct FfmpegMetadataFixer {
    candidates: Vec<PathBuf>,
}

impl FfmpegMetadataFixer {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// First candidate that exists on disk
    pub async fn resolve_binary(&self) -> Option<PathBuf> {
        for candidate in &self.candidates {
            if fs::metadata(candidate).await.is_ok_and(|m| m.is_file()) {
                return Some(candidate.clone());
            }
        }
        None
    }
}

/// `<dir>/<stem>.fixed.<ext>`
fn fixed_output_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path.extension().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!("{}.fixed.{}", stem, ext))
}

fn is_mp4(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
}

#[async_trait]
impl MetadataFixer for FfmpegMetadataFixer {
    async fn fix(&self, path: &Path) -> Result<PathBuf> {
        if !is_mp4(path) {
            debug!("Not an MP4; skipping metadata fix for {:?}", path);
            return Ok(path.to_path_buf());
        }
        let Some(ffmpeg) = self.resolve_binary().await else {
            warn!("FFmpeg not found; skipping metadata fix for {:?}", path);
            return Ok(path.to_path_buf());
        };

        let output = fixed_output_path(path);
        let _ = fs::remove_file(&output).await;

        let status = Command::new(&ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-c", "copy", "-movflags", "+faststart"])
            .arg(&output)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run {:?}", ffmpeg))?;

        if !status.success() {
            let _ = fs::remove_file(&output).await;
            bail!("ffmpeg exited with {}", status);
        }

        // rename replaces the raw file in one step; on failure the raw file stays
        if let Err(e) = fs::rename(&output, path).await {
            let _ = fs::remove_file(&output).await;
            return Err(e).with_context(|| format!("Failed to replace {:?} with fixed output", path));
        }

        info!("Fixed container metadata for {:?}", path);
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fixed_output_name() {
        assert_eq!(
            fixed_output_path(Path::new("/r/recording-a.mp4")),
            PathBuf::from("/r/recording-a.fixed.mp4")
        );
    }

    #[tokio::test]
    async fn test_non_mp4_untouched() -> Result<()> {
        let fixer = FfmpegMetadataFixer::new(vec![PathBuf::from("/bin/false")]);
        let path = Path::new("/nonexistent/clip.webm");
        assert_eq!(fixer.fix(path).await?, path);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary_skips() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("rec.mp4");
        std::fs::write(&path, b"raw")?;

        let fixer = FfmpegMetadataFixer::new(vec![dir.path().join("no-ffmpeg")]);
        assert_eq!(fixer.fix(&path).await?, path);
        assert_eq!(std::fs::read(&path)?, b"raw");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_keeps_raw_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("rec.mp4");
        std::fs::write(&path, b"raw")?;

        // `false` ignores its arguments and exits non-zero
        let fixer = FfmpegMetadataFixer::new(vec![PathBuf::from("/bin/false"), PathBuf::from("/usr/bin/false")]);
        if fixer.resolve_binary().await.is_none() {
            return Ok(());
        }
        assert!(fixer.fix(&path).await.is_err());
        assert_eq!(std::fs::read(&path)?, b"raw");
        assert!(!dir.path().join("rec.fixed.mp4").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_fixed_output_keeps_raw_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("rec.mp4");
        std::fs::write(&path, b"raw")?;

        // `true` exits cleanly without writing anything, so the rename fails
        let fixer = FfmpegMetadataFixer::new(vec![PathBuf::from("/bin/true"), PathBuf::from("/usr/bin/true")]);
        if fixer.resolve_binary().await.is_none() {
            return Ok(());
        }
        let err = fixer.fix(&path).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to replace"));
        assert_eq!(std::fs::read(&path)?, b"raw");
        Ok(())
    }
}
