//! In-memory [`cfs_volume_core::Volume`]. Used by tests across the
//! workspace and as the staging area a hub publisher can point at before
//! it has real storage wired up.
//!
//! Deliberately flat: a single map from path to bytes under a read/write
//! lock, with no directory nodes and no hierarchy synthesis. `Stat("")`
//! answers for the root directory; every other path is a direct key
//! lookup. `ReadDir("")` enumerates every key as a flat sibling, even one
//! that itself contains a `/`. This mirrors the Memory backend's intended
//! simplicity over faithfully modelling a tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cfs_volume_core::{normalize_path, Capabilities, FileInfo, FileReader, FileWriter, PathError, PathResult, Volume};
use parking_lot::RwLock;

struct Inner {
    files: RwLock<BTreeMap<String, Arc<RwLock<Vec<u8>>>>>,
}

/// A volume whose entire contents live in process memory.
#[derive(Clone)]
pub struct MemVolume {
    inner: Arc<Inner>,
}

impl MemVolume {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner { files: RwLock::new(BTreeMap::new()) }) }
    }
}

impl Default for MemVolume {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Volume for MemVolume {
    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Ok(FileInfo::new_dir(path));
        }
        match self.inner.files.read().get(&path) {
            Some(buf) => Ok(FileInfo::new_file(path, buf.read().len() as u64)),
            None => Err(PathError::not_found(path)),
        }
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        let path = normalize_path(path)?;
        if !path.is_empty() {
            return Err(PathError::new(path, cfs_volume_core::PathErrorKind::NotDirectory));
        }
        Ok(self
            .inner
            .files
            .read()
            .iter()
            .map(|(key, buf)| FileInfo::new_file(key.clone(), buf.read().len() as u64))
            .collect())
    }

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        let path = normalize_path(path)?;
        match self.inner.files.read().get(&path) {
            Some(buf) => Ok(Box::new(MemReader { buf: buf.clone() })),
            None => Err(PathError::not_found(path)),
        }
    }

    async fn open_writer(&self, path: &str, create: bool) -> PathResult<Box<dyn FileWriter>> {
        let path = normalize_path(path)?;
        let existing = self.inner.files.read().get(&path).cloned();
        let buf = match existing {
            Some(buf) => buf,
            None if create => {
                let buf = Arc::new(RwLock::new(Vec::new()));
                self.inner.files.write().insert(path.clone(), buf.clone());
                buf
            }
            None => return Err(PathError::not_found(path)),
        };
        Ok(Box::new(MemWriter { buf }))
    }

    async fn remove(&self, path: &str) -> PathResult<()> {
        let path = normalize_path(path)?;
        self.inner.files.write().remove(&path).ok_or_else(|| PathError::not_found(&path))?;
        Ok(())
    }

    async fn mkdir(&self, _path: &str) -> PathResult<()> {
        // No directory nodes exist in a flat map; accepted as a no-op so
        // callers that unconditionally `mkdir` parents before writing
        // (e.g. `cfs-fuse`) don't need a Memory-specific branch.
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE
    }
}

struct MemReader {
    buf: Arc<RwLock<Vec<u8>>>,
}

#[async_trait]
impl FileReader for MemReader {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let data = self.buf.read();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    async fn size(&self) -> std::io::Result<u64> {
        Ok(self.buf.read().len() as u64)
    }
}

struct MemWriter {
    buf: Arc<RwLock<Vec<u8>>>,
}

#[async_trait]
impl FileWriter for MemWriter {
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self.buf.write();
        let offset = offset as usize;
        if buf.len() < offset + data.len() {
            buf.resize(offset + data.len(), 0);
        }
        buf[offset..offset + data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    async fn truncate(&mut self, size: u64) -> std::io::Result<()> {
        self.buf.write().resize(size as usize, 0);
        Ok(())
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let vol = MemVolume::new();
        {
            let mut w = vol.open_writer("dir/f.txt", true).await.unwrap();
            w.write_at(0, b"hello world").await.unwrap();
        }
        let mut r = vol.open_reader("dir/f.txt").await.unwrap();
        let mut buf = [0u8; 5];
        let n = r.read_at(6, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"world");

        let info = vol.stat("dir/f.txt").await.unwrap();
        assert_eq!(info.size, 11);
    }

    #[tokio::test]
    async fn read_dir_of_root_lists_every_key_as_a_flat_sibling() {
        let vol = MemVolume::new();
        vol.open_writer("a/b.txt", true).await.unwrap();
        vol.open_writer("c.txt", true).await.unwrap();
        let mut names: Vec<_> = vol.read_dir("").await.unwrap().into_iter().map(|i| i.path).collect();
        names.sort();
        assert_eq!(names, vec!["a/b.txt".to_string(), "c.txt".to_string()]);
    }

    #[tokio::test]
    async fn read_dir_of_a_non_root_path_is_not_a_directory() {
        let vol = MemVolume::new();
        vol.open_writer("a/b.txt", true).await.unwrap();
        let err = vol.read_dir("a").await.unwrap_err();
        assert_eq!(err.kind, cfs_volume_core::PathErrorKind::NotDirectory);
    }

    #[tokio::test]
    async fn remove_of_missing_path_is_not_found() {
        let vol = MemVolume::new();
        let err = vol.remove("nope.txt").await.unwrap_err();
        assert_eq!(err.kind, cfs_volume_core::PathErrorKind::NotFound);
    }
}
