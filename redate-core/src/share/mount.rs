//! Share client for shares reachable through a local mount point.
//!
//! Talks to the share via the kernel's SMB/CIFS mount (mount.cifs, Finder
//! or Explorer mapping), so all calls are plain filesystem I/O with the
//! network behind them. Every call runs under the configured deadline and
//! raw I/O errors are classified into the engine taxonomy.

use super::{Capabilities, DirEntry, FileStat, FileTimes, ShareClient};
use crate::config::Config;
use crate::error::{RedateError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

pub struct MountedShare {
    root: PathBuf,
    call_timeout: Duration,
    time_resolution: Duration,
}

impl MountedShare {
    pub fn new(root: impl Into<PathBuf>, time_resolution: Duration, call_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            call_timeout,
            time_resolution,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let root = config.share.mount_point.join(&config.share.base_path);
        Self::new(root, config.time_resolution(), config.call_timeout())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a share-relative path against the mount root. Absolute
    /// inputs are reinterpreted as share-relative so callers cannot
    /// escape the mount.
    fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir | Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {}
            }
        }
        resolved
    }

    /// Run one filesystem call under the per-call deadline
    async fn bounded<T, F>(&self, path: &Path, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(RedateError::from_io(err, path)),
            Err(_) => Err(RedateError::Timeout(self.call_timeout)),
        }
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

fn stat_from_metadata(path: &Path, metadata: &std::fs::Metadata) -> Result<FileStat> {
    let modified = metadata
        .modified()
        .map_err(|e| RedateError::from_io(e, path))?;
    let created = metadata.created().ok();

    Ok(FileStat {
        size: metadata.len(),
        times: FileTimes {
            modified: to_utc(modified),
            created: created.map(to_utc),
        },
        is_dir: metadata.is_dir(),
    })
}

#[async_trait]
impl ShareClient for MountedShare {
    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let full = self.resolve(path);
        let metadata = self.bounded(path, tokio::fs::metadata(&full)).await?;
        stat_from_metadata(path, &metadata)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        self.bounded(path, tokio::fs::read(&full)).await
    }

    async fn set_times(&self, path: &Path, times: FileTimes) -> Result<()> {
        if times.created.is_some() {
            // btime is not settable through the mount; the writer only
            // asks for it when capabilities() says so
            tracing::debug!(
                "Ignoring creation time for {}: not supported through mount",
                path.display()
            );
        }

        let full = self.resolve(path);
        let mtime = FileTime::from_unix_time(
            times.modified.timestamp(),
            times.modified.timestamp_subsec_nanos(),
        );

        let op = async move {
            match tokio::task::spawn_blocking(move || filetime::set_file_mtime(&full, mtime)).await
            {
                Ok(result) => result,
                Err(join_err) => Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    join_err,
                )),
            }
        };
        self.bounded(path, op).await
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let full = self.resolve(path);
        let listing = async {
            let mut entries = Vec::new();
            let mut reader = tokio::fs::read_dir(&full).await?;
            while let Some(entry) = reader.next_entry().await? {
                let metadata = entry.metadata().await?;
                entries.push((entry.file_name(), metadata));
            }
            Ok::<_, std::io::Error>(entries)
        };

        let raw = self.bounded(path, listing).await?;
        let mut entries = Vec::with_capacity(raw.len());
        for (name, metadata) in raw {
            let child = path.join(&name);
            let stat = stat_from_metadata(&child, &metadata)?;
            entries.push(DirEntry { path: child, stat });
        }
        Ok(entries)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            creation_time: false,
            time_resolution: self.time_resolution,
        }
    }
}
