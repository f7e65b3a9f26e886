// src/snapshot/store.rs
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CacheWriteError;
use crate::snapshot::{Snapshot, META_KEY};

/// Durable home for the published snapshot. Saving is best-effort: the live
/// in-memory view never waits on or depends on it.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), CacheWriteError>;

    /// `None` when nothing valid is stored (missing, unreadable or corrupt).
    async fn load(&self) -> Option<Snapshot>;
}

/// Single JSON document replaced atomically: tmp file, fsync, rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), CacheWriteError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| CacheWriteError::Io {
                path: self.path.display().to_string(),
                source: std::io::Error::other(e),
            })?
    }

    async fn load(&self) -> Option<Snapshot> {
        let path = self.path.clone();
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(target: "snapshot", path = %path.display(), error = %e, "snapshot unreadable");
                return None;
            }
        };
        match serde_json::from_str::<Snapshot>(&body) {
            Ok(s) => Some(sanitize(s)),
            Err(e) => {
                tracing::warn!(target: "snapshot", path = %path.display(), error = %e, "snapshot corrupt; ignoring");
                None
            }
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheWriteError> {
    let io_err = |source: std::io::Error| CacheWriteError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let tmp = tmp_path(path);
    let mut f = fs::File::create(&tmp).map_err(io_err)?;
    f.write_all(bytes).map_err(io_err)?;
    f.sync_all().map_err(io_err)?;
    drop(f);
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reserved keys never surface as subjects, whatever the file says.
fn sanitize(mut s: Snapshot) -> Snapshot {
    s.summaries.retain(|k, _| !k.starts_with('_') && k != META_KEY);
    s.history.retain(|k, _| !k.starts_with('_') && k != META_KEY);
    s
}
