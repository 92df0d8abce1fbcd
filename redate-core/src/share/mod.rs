//! Share client abstraction and file entities.
//!
//! The engine never talks SMB itself; it consumes a small client interface
//! that any backend can implement. The bundled [`mount::MountedShare`]
//! reaches the share through a local mount point.

pub mod catalog;
pub mod mount;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timestamps attached to a remote file. Creation time is an optional
/// capability; not every share protocol (or mount) can store one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTimes {
    pub modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl FileTimes {
    pub fn modified_only(modified: DateTime<Utc>) -> Self {
        Self {
            modified,
            created: None,
        }
    }
}

/// Metadata for a single path on the share
#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub times: FileTimes,
    pub is_dir: bool,
}

/// One addressable file on the share, as produced by a catalog listing
#[derive(Debug, Clone, Serialize)]
pub struct RemoteFile {
    /// Share-relative path
    pub path: PathBuf,
    pub size: u64,
    pub times: FileTimes,
}

/// A raw directory listing entry (files and directories)
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub stat: FileStat,
}

/// What the backing protocol can represent
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether creation time can be written at all
    pub creation_time: bool,

    /// Coarsest timestamp granularity the protocol stores. Values finer
    /// than this are truncated by the share, not by us.
    pub time_resolution: Duration,
}

/// Client interface for one share connection.
///
/// Implementations must surface connectivity failures distinctly from
/// permission / not-found failures (see [`crate::error::RedateError`]).
#[async_trait]
pub trait ShareClient: Send + Sync {
    /// Read metadata for a path
    async fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Read the full contents of a file
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write timestamps for a path
    async fn set_times(&self, path: &Path, times: FileTimes) -> Result<()>;

    /// List the immediate children of a directory
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    fn capabilities(&self) -> Capabilities;
}

/// SHA-256 over the file's current contents. Computed on demand; nothing
/// caches it because the whole point is detecting drift.
pub async fn content_checksum(client: &dyn ShareClient, path: &Path) -> Result<[u8; 32]> {
    use sha2::{Digest, Sha256};

    let bytes = client.read(path).await?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.into())
}
