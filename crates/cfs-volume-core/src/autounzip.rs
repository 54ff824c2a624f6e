use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::{Capabilities, EventStream, FileInfo, FileReader, FileWriter, PathError, PathResult, Volume};

/// Literal separator between an archive path and a path inside it, e.g.
/// `data/archive.zip/:/readme.txt`. Deliberately not just `:` so it can't
/// collide with a Windows drive letter or a URL scheme.
pub const ARCHIVE_SEPARATOR: &str = "/:/";

/// Opens a seekable reader as a sub-[`Volume`]. Implemented by
/// `cfs-volume-zip`; kept as a trait here so this crate never depends on a
/// concrete archive format.
#[async_trait]
pub trait ArchiveOpener: Send + Sync {
    async fn open(&self, reader: Box<dyn FileReader>) -> PathResult<Arc<dyn Volume>>;

    /// Whether `path` looks like an archive this opener understands, used
    /// to decide whether a bare (non-separator) path should be offered as
    /// an auto-expandable directory. `cfs-volume-zip` matches `.zip`.
    fn looks_like_archive(&self, path: &str) -> bool;
}

/// Wraps a volume so any path containing [`ARCHIVE_SEPARATOR`] is resolved
/// by opening the archive named by the part before the separator and
/// delegating the remainder to it. Opened archives are cached by their
/// outer path and themselves wrapped in `AutoUnzip`, so archives nested
/// inside archives resolve transparently.
pub struct AutoUnzip {
    inner: Arc<dyn Volume>,
    opener: Arc<dyn ArchiveOpener>,
    cache: AsyncMutex<HashMap<String, Arc<dyn Volume>>>,
}

impl AutoUnzip {
    pub fn new(inner: Arc<dyn Volume>, opener: Arc<dyn ArchiveOpener>) -> Arc<Self> {
        Arc::new(Self { inner, opener, cache: AsyncMutex::new(HashMap::new()) })
    }

    /// Splits at the first [`ARCHIVE_SEPARATOR`], but only if the outer
    /// part is actually an archive this opener understands (e.g. ends in
    /// `.zip`, case-insensitive, for `cfs-volume-zip`). A path like
    /// `foo.tar/:/inner` is left unsplit so it falls through to `self.inner`
    /// and fails there as an ordinary not-found path, rather than being
    /// routed into the archive opener.
    fn split<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
        let (outer, inner) = path.split_once(ARCHIVE_SEPARATOR)?;
        if self.opener.looks_like_archive(outer) {
            Some((outer, inner))
        } else {
            None
        }
    }

    async fn archive_at(&self, outer: &str) -> PathResult<Arc<dyn Volume>> {
        if let Some(cached) = self.cache.lock().await.get(outer) {
            return Ok(cached.clone());
        }
        let reader = self.inner.open_reader(outer).await?;
        let opened = self.opener.open(reader).await?;
        let wrapped: Arc<dyn Volume> = AutoUnzip::new(opened, self.opener.clone());
        self.cache.lock().await.insert(outer.to_string(), wrapped.clone());
        Ok(wrapped)
    }
}

#[async_trait]
impl Volume for AutoUnzip {
    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        if let Some((outer, inner_path)) = self.split(path) {
            let archive = self.archive_at(outer).await?;
            let mut info = archive.stat(inner_path).await?;
            info.path = path.to_string();
            return Ok(info);
        }
        self.inner.stat(path).await
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        if let Some((outer, inner_path)) = self.split(path) {
            let archive = self.archive_at(outer).await?;
            let mut entries = archive.read_dir(inner_path).await?;
            for entry in &mut entries {
                entry.path = format!("{outer}{ARCHIVE_SEPARATOR}{}", entry.path);
            }
            return Ok(entries);
        }

        match self.inner.read_dir(path).await {
            Ok(entries) => Ok(entries),
            Err(err) if self.opener.looks_like_archive(path) => {
                let archive = self.archive_at(path).await.map_err(|_| err)?;
                let mut entries = archive.read_dir("").await?;
                for entry in &mut entries {
                    entry.path = format!("{path}{ARCHIVE_SEPARATOR}{}", entry.path);
                }
                Ok(entries)
            }
            Err(err) => Err(err),
        }
    }

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        if let Some((outer, inner_path)) = self.split(path) {
            let archive = self.archive_at(outer).await?;
            return archive.open_reader(inner_path).await;
        }
        self.inner.open_reader(path).await
    }

    async fn open_writer(&self, path: &str, create: bool) -> PathResult<Box<dyn FileWriter>> {
        if self.split(path).is_some() {
            return Err(PathError::permission_denied(path));
        }
        self.inner.open_writer(path, create).await
    }

    async fn remove(&self, path: &str) -> PathResult<()> {
        if self.split(path).is_some() {
            return Err(PathError::permission_denied(path));
        }
        self.inner.remove(path).await
    }

    async fn mkdir(&self, path: &str) -> PathResult<()> {
        if self.split(path).is_some() {
            return Err(PathError::permission_denied(path));
        }
        self.inner.mkdir(path).await
    }

    async fn watch(&self, path: &str) -> PathResult<Box<dyn EventStream>> {
        self.inner.watch(path).await
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubVolume;

    #[tokio::test]
    async fn non_archive_paths_pass_through() {
        let inner: Arc<dyn Volume> = Arc::new(StubVolume::with_file("a.txt", 5));
        struct NeverArchive;
        #[async_trait]
        impl ArchiveOpener for NeverArchive {
            async fn open(&self, _reader: Box<dyn FileReader>) -> PathResult<Arc<dyn Volume>> {
                unreachable!()
            }
            fn looks_like_archive(&self, _path: &str) -> bool {
                false
            }
        }
        let wrapped = AutoUnzip::new(inner, Arc::new(NeverArchive));
        assert!(wrapped.stat("a.txt").await.is_ok());
    }

    struct ZipLike;
    #[async_trait]
    impl ArchiveOpener for ZipLike {
        async fn open(&self, _reader: Box<dyn FileReader>) -> PathResult<Arc<dyn Volume>> {
            unreachable!("outer path doesn't end in .zip, open() must not be called")
        }
        fn looks_like_archive(&self, path: &str) -> bool {
            path.to_ascii_lowercase().ends_with(".zip")
        }
    }

    #[tokio::test]
    async fn non_zip_outer_path_containing_the_separator_is_not_treated_as_an_archive() {
        let inner: Arc<dyn Volume> = Arc::new(StubVolume::empty());
        let wrapped = AutoUnzip::new(inner, Arc::new(ZipLike));

        let err = wrapped.stat("foo.tar/:/inner").await.unwrap_err();
        assert_eq!(err.kind, crate::PathErrorKind::NotFound);
    }

    #[tokio::test]
    async fn zip_outer_path_is_case_insensitively_recognized() {
        let inner: Arc<dyn Volume> = Arc::new(StubVolume::with_file("a.ZIP", 5));
        let wrapped = AutoUnzip::new(inner, Arc::new(ZipLike));
        // The outer path itself still resolves as a plain file through
        // `self.inner`; only a path carrying the separator routes through
        // `archive_at`, which would call `open()` and panic here if hit.
        assert!(wrapped.stat("a.ZIP").await.is_ok());
    }
}
