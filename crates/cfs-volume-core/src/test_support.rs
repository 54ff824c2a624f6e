//! Minimal in-crate `Volume` stub used only by this crate's own unit tests,
//! so they don't need to depend back on `cfs-volume-mem`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Capabilities, FileInfo, PathError, PathResult, Volume};

pub struct StubVolume {
    entries: Mutex<BTreeMap<String, FileInfo>>,
    available: AtomicBool,
}

impl StubVolume {
    pub fn with_dir(path: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(path.to_string(), FileInfo::new_dir(path));
        Self { entries: Mutex::new(entries), available: AtomicBool::new(true) }
    }

    pub fn with_file(path: &str, size: u64) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(path.to_string(), FileInfo::new_file(path, size));
        Self { entries: Mutex::new(entries), available: AtomicBool::new(true) }
    }

    pub fn empty() -> Self {
        Self { entries: Mutex::new(BTreeMap::new()), available: AtomicBool::new(true) }
    }

    pub fn insert(&self, info: FileInfo) {
        self.entries.lock().unwrap().insert(info.path.clone(), info);
    }

    /// Flips what [`Volume::available`] reports, for exercising
    /// `VolumeGroup`'s availability filtering.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl Volume for StubVolume {
    async fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PathError::not_found(path))
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| {
                e.path
                    .strip_prefix(&prefix[..])
                    .map(|rest| !rest.is_empty() && !rest.contains('/'))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn mkdir(&self, path: &str) -> PathResult<()> {
        self.insert(FileInfo::new_dir(path));
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE
    }
}
