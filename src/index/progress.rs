//! Crash-safe progress reporting for bulk index operations.
//!
//! One small JSON file per collection root, polled by unrelated readers
//! (a UI, the `status` CLI command). Writes go to a temp file in the same
//! directory and are renamed over the target, so a concurrent reader never
//! observes a partially-written record. The file does not exist while the
//! collection is idle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::db::{SecondsSinceUnix, now_i64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Rebuilding,
    Resyncing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: BulkStatus,
    /// Preserved across updates, so a resumed operation reports total
    /// elapsed time correctly.
    pub started_at: SecondsSinceUnix,
    pub updated_at: SecondsSinceUnix,
    /// -1 while the item count is still being computed.
    pub total: i64,
    pub current: u64,
    /// current/total, always within [0, 1]; 0 while total is unknown.
    pub progress: f64,
}

pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// The status file for one collection root, keyed by a hash of the
    /// root path so independent collections never collide in the same
    /// status directory.
    pub fn for_root(dir: &Path, root: &Path) -> StatusFile {
        let key = blake3::hash(root.to_string_lossy().as_bytes());
        let name = format!("status-{}.json", &key.to_hex()[..16]);
        StatusFile {
            path: dir.join(name),
        }
    }

    pub fn set(&self, status: BulkStatus, total: i64, current: u64) -> std::io::Result<()> {
        let now = now_i64();
        let started_at = match self.get() {
            Some(previous) => previous.started_at,
            None => now,
        };
        let progress = if total > 0 {
            (current as f64 / total as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.write_atomic(&StatusRecord {
            status,
            started_at,
            updated_at: now,
            total,
            current,
            progress,
        })
    }

    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Missing and corrupt files both read as "no status"; corruption is
    /// logged but never surfaced to the caller.
    pub fn get(&self) -> Option<StatusRecord> {
        let data = fs::read(&self.path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("corrupt status file '{}': {e}", self.path.display());
                None
            }
        }
    }

    fn write_atomic(&self, record: &StatusRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(record).map_err(std::io::Error::other)?)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)
    }
}
