//! Pre-mutation snapshots and their restoration.
//!
//! A backup record captures the timestamps (and optionally a content
//! checksum) of a file before anything touches it. Records live for one
//! transaction: discarded on commit, applied on rollback.

use crate::error::{RedateError, Result};
use crate::share::{content_checksum, FileTimes, ShareClient};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Snapshot of a file's original state, taken before mutation
#[derive(Debug, Clone)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub times: FileTimes,
    pub size: u64,
    pub checksum: Option<[u8; 32]>,
    pub taken_at: DateTime<Utc>,
}

pub struct BackupManager {
    capture_checksum: bool,
}

impl BackupManager {
    pub fn new(capture_checksum: bool) -> Self {
        Self { capture_checksum }
    }

    /// Capture the file's current timestamps (and checksum, if enabled).
    /// Fails before any mutation has happened, so a failure here leaves
    /// nothing to roll back.
    pub async fn begin(&self, client: &dyn ShareClient, path: &Path) -> Result<BackupRecord> {
        let stat = client.stat(path).await?;

        let checksum = if self.capture_checksum {
            Some(content_checksum(client, path).await?)
        } else {
            None
        };

        debug!(
            "Captured backup for {} (mtime {})",
            path.display(),
            stat.times.modified
        );

        Ok(BackupRecord {
            path: path.to_path_buf(),
            times: stat.times,
            size: stat.size,
            checksum,
            taken_at: Utc::now(),
        })
    }

    /// Reapply the captured timestamps. Any failure here is fatal for the
    /// transaction and is never retried automatically; retrying could
    /// mask a file left in an inconsistent state.
    pub async fn restore(&self, client: &dyn ShareClient, record: &BackupRecord) -> Result<()> {
        if let Some(expected) = record.checksum {
            match content_checksum(client, &record.path).await {
                Ok(actual) if actual != expected => {
                    warn!(
                        "Content of {} changed since backup was taken",
                        record.path.display()
                    );
                }
                Err(err) => {
                    warn!(
                        "Could not re-check content of {}: {}",
                        record.path.display(),
                        err
                    );
                }
                Ok(_) => {}
            }
        }

        client
            .set_times(&record.path, record.times)
            .await
            .map_err(|err| RedateError::Restore {
                path: record.path.clone(),
                reason: err.to_string(),
            })?;

        info!("Restored original timestamps for {}", record.path.display());
        Ok(())
    }
}
