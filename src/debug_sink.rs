//! Best-effort copy of the latest poster on disk.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

/// Distinguishes temp files created within the same clock tick.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader sees either the previous image or the new one, never a torn file.
pub async fn store_file_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("poster");
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let temp_path = parent.join(format!(".{file_name}.tmp-{nonce}-{seq}"));
    if let Err(err) = fs::write(&temp_path, bytes).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }
    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }
    Ok(())
}

/// Persist `bytes` in the background. Failures are logged and dropped.
pub fn persist_in_background(path: PathBuf, bytes: Vec<u8>) {
    tokio::spawn(async move {
        match store_file_atomic(&path, &bytes).await {
            Ok(()) => debug!("Debug poster written to {}", path.display()),
            Err(e) => warn!("Could not write debug poster {}: {}", path.display(), e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replaces_existing_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("avis.png");

        store_file_atomic(&path, b"first").await.unwrap();
        store_file_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_each_use_their_own_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avis.png");
        let payloads: Vec<Vec<u8>> = (0..16u8).map(|i| vec![i; 64 * 1024]).collect();

        let writers: Vec<_> = payloads
            .iter()
            .cloned()
            .map(|bytes| {
                let path = path.clone();
                tokio::spawn(async move { store_file_atomic(&path, &bytes).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let written = std::fs::read(&path).unwrap();
        assert!(payloads.contains(&written), "torn debug poster");
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn unwritable_target_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory occupies the target name, so the rename must fail.
        let path = dir.path().join("taken");
        std::fs::create_dir_all(path.join("child")).unwrap();
        assert!(store_file_atomic(&path, b"x").await.is_err());
    }
}
