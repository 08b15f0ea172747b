//! Removal of abandoned room output
//!
//! Rooms are dropped from memory as soon as their last participant leaves,
//! but downloaded models stay on disk so a late viewer can still fetch them.
//! The janitor deletes room directories that outlived `max_age` and whose
//! room is no longer live.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::session::RoomId;

/// Sweeps stale room directories under the output root
#[derive(Debug, Clone)]
pub struct Janitor {
    output_dir: PathBuf,
    max_age: Duration,
}

impl Janitor {
    pub fn new(output_dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_age,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Delete stale directories, skipping rooms in `live`
    ///
    /// Returns the removed paths. A missing output root is not an error.
    pub async fn sweep(&self, live: &HashSet<RoomId>) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let is_live = name
                .to_str()
                .and_then(|n| RoomId::parse(n).ok())
                .is_some_and(|room| live.contains(&room));
            if is_live {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            let path = entry.path();
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed stale room output");
                    removed.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove room output"),
            }
        }

        Ok(removed)
    }
}
