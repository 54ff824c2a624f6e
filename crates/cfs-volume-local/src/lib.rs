//! Local-disk [`cfs_volume_core::Volume`], grounded on the host filesystem
//! through `tokio::fs` and watched through the `notify` crate.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cfs_volume_core::{
    normalize_path, Capabilities, EventStream, FileInfo, FileMode, FileReader, FileWriter,
    PathError, PathErrorKind, PathResult, Volume, WatchEvent, WatchEventKind,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

mod watch;

/// Volume rooted at a directory on the local filesystem. Every path passed
/// to its methods is normalized and then joined under `root`; `..` never
/// escapes it because [`normalize_path`] rejects it up front.
pub struct LocalVolume {
    root: PathBuf,
    read_only: bool,
}

impl LocalVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), read_only: false }
    }

    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), read_only: true }
    }

    fn resolve(&self, path: &str) -> PathResult<PathBuf> {
        let rel = normalize_path(path)?;
        Ok(self.root.join(rel))
    }

    async fn info_for(&self, path: &str, full: &Path) -> PathResult<FileInfo> {
        let meta = tokio::fs::metadata(full)
            .await
            .map_err(|e| PathError::from_io(path, e))?;
        Ok(meta_to_info(path, &meta))
    }
}

fn meta_to_info(path: &str, meta: &std::fs::Metadata) -> FileInfo {
    let mut mode = if meta.permissions().readonly() {
        FileMode::OWNER_READ | FileMode::GROUP_READ | FileMode::OTHER_READ
    } else {
        FileMode::default()
    };
    if meta.is_dir() {
        mode |= FileMode::IS_DIR | FileMode::OWNER_EXEC | FileMode::GROUP_EXEC | FileMode::OTHER_EXEC;
    }
    let updated = meta
        .modified()
        .ok()
        .and_then(|t| time::OffsetDateTime::from_unix_timestamp(
            t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64,
        ).ok())
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    let created = meta
        .created()
        .ok()
        .and_then(|t| time::OffsetDateTime::from_unix_timestamp(
            t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64,
        ).ok())
        .unwrap_or(updated);
    FileInfo {
        path: path.to_string(),
        size: meta.len(),
        created_time: created,
        updated_time: updated,
        mode,
        metadata: Default::default(),
    }
}

#[async_trait]
impl Volume for LocalVolume {
    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        let full = self.resolve(path)?;
        self.info_for(path, &full).await
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        let rel = normalize_path(path)?;
        let full = self.root.join(&rel);
        let mut rd = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| PathError::from_io(path, e))?;
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(|e| PathError::from_io(path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() { name } else { format!("{rel}/{name}") };
            let meta = entry.metadata().await.map_err(|e| PathError::from_io(&child_rel, e))?;
            out.push(meta_to_info(&child_rel, &meta));
        }
        Ok(out)
    }

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        let full = self.resolve(path)?;
        let file = tokio::fs::File::open(&full).await.map_err(|e| PathError::from_io(path, e))?;
        Ok(Box::new(LocalReader { file, pos: 0 }))
    }

    async fn open_writer(&self, path: &str, create: bool) -> PathResult<Box<dyn FileWriter>> {
        if self.read_only {
            return Err(PathError::permission_denied(path));
        }
        let full = self.resolve(path)?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(create)
            .truncate(false)
            .open(&full)
            .await
            .map_err(|e| PathError::from_io(path, e))?;
        Ok(Box::new(LocalWriter { file }))
    }

    async fn remove(&self, path: &str) -> PathResult<()> {
        if self.read_only {
            return Err(PathError::permission_denied(path));
        }
        let full = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full).await.map_err(|e| PathError::from_io(path, e))?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&full).await.map_err(|e| PathError::from_io(path, e))?;
        } else {
            tokio::fs::remove_file(&full).await.map_err(|e| PathError::from_io(path, e))?;
        }
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> PathResult<()> {
        if self.read_only {
            return Err(PathError::permission_denied(path));
        }
        let full = self.resolve(path)?;
        tokio::fs::create_dir(&full).await.map_err(|e| PathError::from_io(path, e))
    }

    async fn watch(&self, path: &str) -> PathResult<Box<dyn EventStream>> {
        let full = self.resolve(path)?;
        watch::watch_path(&self.root, &full, path).await
    }

    fn capabilities(&self) -> Capabilities {
        if self.read_only {
            Capabilities::READ | Capabilities::WATCH
        } else {
            Capabilities::READ | Capabilities::WRITE | Capabilities::WATCH
        }
    }
}

struct LocalReader {
    file: tokio::fs::File,
    pos: u64,
}

#[async_trait]
impl FileReader for LocalReader {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        if offset != self.pos {
            self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        }
        let n = self.file.read(buf).await?;
        self.pos = offset + n as u64;
        Ok(n)
    }

    async fn size(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }
}

struct LocalWriter {
    file: tokio::fs::File,
}

#[async_trait]
impl FileWriter for LocalWriter {
    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize> {
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        self.file.write(buf).await
    }

    async fn truncate(&mut self, size: u64) -> std::io::Result<()> {
        self.file.set_len(size).await
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        self.file.sync_all().await
    }
}

pub(crate) fn kind_from_notify(kind: &notify::EventKind) -> Option<WatchEventKind> {
    use notify::EventKind::*;
    match kind {
        Create(_) => Some(WatchEventKind::Created),
        Modify(_) => Some(WatchEventKind::Modified),
        Remove(_) => Some(WatchEventKind::Removed),
        _ => None,
    }
}

pub(crate) fn relativize(root: &Path, full: &Path) -> Option<String> {
    full.strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let vol = LocalVolume::new(dir.path());
        vol.mkdir("sub").await.unwrap();
        {
            let mut w = vol.open_writer("sub/f.txt", true).await.unwrap();
            w.write_at(0, b"payload").await.unwrap();
        }
        let info = vol.stat("sub/f.txt").await.unwrap();
        assert_eq!(info.size, 7);
        let listing = vol.read_dir("sub").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].path, "sub/f.txt");
    }

    #[tokio::test]
    async fn read_only_volume_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let vol = LocalVolume::read_only(dir.path());
        let err = vol.mkdir("x").await.unwrap_err();
        assert_eq!(err.kind, PathErrorKind::PermissionDenied);
    }
}
