//! Per-path mutual exclusion.
//!
//! Gates are created on demand and reclaimed once no transaction holds a
//! reference, so a long-running process does not accumulate one mutex per
//! file it ever touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

#[derive(Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Weak<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the gate for a path, creating it if no live one exists. Dead
    /// entries are swept on each call.
    pub fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = map.get(path).and_then(Weak::upgrade) {
            return existing;
        }

        let gate = Arc::new(tokio::sync::Mutex::new(()));
        map.insert(path.to_path_buf(), Arc::downgrade(&gate));
        gate
    }

    /// Number of live gates (after sweeping dead entries)
    pub fn tracked(&self) -> usize {
        let mut map = self.inner.lock().unwrap();
        map.retain(|_, weak| weak.strong_count() > 0);
        map.len()
    }
}
