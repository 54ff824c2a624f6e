//! Path-to-inode bookkeeping.
//!
//! FUSE addresses everything by inode number; a [`cfs_volume_core::Volume`]
//! addresses everything by path. This table is the bridge: it hands out a
//! stable inode for every path a lookup has ever visited and never reuses
//! one while the kernel could still hold a reference to it. Non-durable by
//! design — a remount starts from a fresh table, matching the absence of
//! any persistent-metadata requirement for this filesystem.

use std::collections::HashMap;

use parking_lot::Mutex;

pub const ROOT_INO: u64 = 1;

struct Inner {
    path_to_ino: HashMap<String, u64>,
    ino_to_path: HashMap<u64, String>,
    next_ino: u64,
}

/// Bidirectional path/inode map, guarded by a single lock since lookups
/// never cross an `.await` point.
pub struct InodeTable {
    inner: Mutex<Inner>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert(String::new(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, String::new());
        Self {
            inner: Mutex::new(Inner {
                path_to_ino,
                ino_to_path,
                next_ino: ROOT_INO + 1,
            }),
        }
    }

    /// Returns the path a previously-seen inode refers to.
    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.inner.lock().ino_to_path.get(&ino).cloned()
    }

    /// Returns the existing inode for `path`, allocating a fresh one if
    /// this is the first time the path has been seen.
    pub fn ino_for(&self, path: &str) -> u64 {
        let mut inner = self.inner.lock();
        if let Some(ino) = inner.path_to_ino.get(path) {
            return *ino;
        }
        let ino = inner.next_ino;
        inner.next_ino += 1;
        inner.path_to_ino.insert(path.to_string(), ino);
        inner.ino_to_path.insert(ino, path.to_string());
        ino
    }

    /// Joins a parent path (already resolved to an inode) with a child
    /// name, in volume-path form (`/`-separated, no leading slash).
    pub fn child_path(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        }
    }

    /// Drops the translation for `ino`, called from `forget`. The root
    /// inode is never forgotten.
    pub fn forget(&self, ino: u64) {
        if ino == ROOT_INO {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(path) = inner.ino_to_path.remove(&ino) {
            inner.path_to_ino.remove(&path);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preallocated() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INO), Some(String::new()));
    }

    #[test]
    fn repeated_lookups_return_the_same_inode() {
        let table = InodeTable::new();
        let a = table.ino_for("dir/file.txt");
        let b = table.ino_for("dir/file.txt");
        assert_eq!(a, b);
        assert_eq!(table.path_of(a).as_deref(), Some("dir/file.txt"));
    }

    #[test]
    fn forget_frees_the_path_but_not_the_root() {
        let table = InodeTable::new();
        let ino = table.ino_for("a.txt");
        table.forget(ino);
        assert_eq!(table.path_of(ino), None);
        table.forget(ROOT_INO);
        assert_eq!(table.path_of(ROOT_INO), Some(String::new()));
    }

    #[test]
    fn child_path_handles_root_parent() {
        assert_eq!(InodeTable::child_path("", "a"), "a");
        assert_eq!(InodeTable::child_path("dir", "a"), "dir/a");
    }
}
