//! Scriptable in-memory share for exercising failure paths in tests.

use super::{Capabilities, DirEntry, FileStat, FileTimes, ShareClient};
use crate::error::{RedateError, Result};
use crate::ops::writer::truncate_to_resolution;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
struct MockFile {
    times: FileTimes,
    bytes: Vec<u8>,
}

/// Failure kinds a test can queue against a single operation
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    Connectivity,
    Timeout,
    NotFound,
    PermissionDenied,
}

impl Fault {
    fn to_error(self, path: &Path) -> RedateError {
        match self {
            Self::Connectivity => {
                RedateError::Connectivity(format!("{}: connection reset", path.display()))
            }
            Self::Timeout => RedateError::Timeout(Duration::from_secs(30)),
            Self::NotFound => RedateError::NotFound(path.to_path_buf()),
            Self::PermissionDenied => RedateError::PermissionDenied(path.to_path_buf()),
        }
    }
}

pub(crate) struct MockShare {
    files: Mutex<HashMap<PathBuf, MockFile>>,
    faults: Mutex<HashMap<&'static str, VecDeque<Fault>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    time_resolution: Duration,
    /// When set, `set_times` stores a value one hour off the request,
    /// simulating a share that mangles timestamps
    skew_writes: AtomicBool,
}

impl MockShare {
    pub(crate) fn new(time_resolution: Duration) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            time_resolution,
            skew_writes: AtomicBool::new(false),
        }
    }

    pub(crate) fn insert_file(&self, path: &str, mtime_secs: i64, bytes: Vec<u8>) {
        let times = FileTimes::modified_only(
            DateTime::<Utc>::from_timestamp(mtime_secs, 0).expect("valid test timestamp"),
        );
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), MockFile { times, bytes });
    }

    /// Queue a failure for the next call of `op` (fifo per operation)
    pub(crate) fn fail_next(&self, op: &'static str, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    pub(crate) fn skew_writes(&self, skew: bool) {
        self.skew_writes.store(skew, Ordering::SeqCst);
    }

    pub(crate) fn call_count(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub(crate) fn modified_of(&self, path: &str) -> Option<DateTime<Utc>> {
        self.files
            .lock()
            .unwrap()
            .get(Path::new(path))
            .map(|f| f.times.modified)
    }

    fn record_call(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }

    fn take_fault(&self, op: &'static str, path: &Path) -> Option<RedateError> {
        self.faults
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
            .map(|fault| fault.to_error(path))
    }
}

#[async_trait]
impl ShareClient for MockShare {
    async fn stat(&self, path: &Path) -> Result<FileStat> {
        self.record_call("stat");
        if let Some(err) = self.take_fault("stat", path) {
            return Err(err);
        }

        let files = self.files.lock().unwrap();
        let file = files
            .get(path)
            .ok_or_else(|| RedateError::NotFound(path.to_path_buf()))?;
        Ok(FileStat {
            size: file.bytes.len() as u64,
            times: file.times,
            is_dir: false,
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.record_call("read");
        if let Some(err) = self.take_fault("read", path) {
            return Err(err);
        }

        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|f| f.bytes.clone())
            .ok_or_else(|| RedateError::NotFound(path.to_path_buf()))
    }

    async fn set_times(&self, path: &Path, times: FileTimes) -> Result<()> {
        self.record_call("set_times");
        if let Some(err) = self.take_fault("set_times", path) {
            return Err(err);
        }

        let mut files = self.files.lock().unwrap();
        let file = files
            .get_mut(path)
            .ok_or_else(|| RedateError::NotFound(path.to_path_buf()))?;

        // The share stores what the protocol can represent, not what was
        // requested
        let mut stored = truncate_to_resolution(times.modified, self.time_resolution);
        if self.skew_writes.load(Ordering::SeqCst) {
            stored = stored + TimeDelta::hours(1);
        }
        file.times = FileTimes {
            modified: stored,
            created: file.times.created,
        };
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.record_call("list_dir");
        if let Some(err) = self.take_fault("list_dir", path) {
            return Err(err);
        }

        let files = self.files.lock().unwrap();
        let mut entries = Vec::new();
        let mut seen_dirs = Vec::new();

        for (file_path, file) in files.iter() {
            let Ok(rest) = file_path.strip_prefix(path) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };

            let child = path.join(first);
            if components.next().is_some() {
                // Deeper file implies an intermediate directory
                if !seen_dirs.contains(&child) {
                    seen_dirs.push(child.clone());
                    entries.push(DirEntry {
                        path: child,
                        stat: FileStat {
                            size: 0,
                            times: FileTimes::modified_only(Utc::now()),
                            is_dir: true,
                        },
                    });
                }
            } else {
                entries.push(DirEntry {
                    path: child,
                    stat: FileStat {
                        size: file.bytes.len() as u64,
                        times: file.times,
                        is_dir: false,
                    },
                });
            }
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
