use async_trait::async_trait;

use crate::{FileInfo, PathError, PathResult};

/// A single open handle for sequential or random-access reads.
///
/// Backends that can only stream (e.g. a lazily-opened HTTP body) are free
/// to implement `read_at` by discarding buffered state and reopening when
/// the requested offset doesn't continue the previous read; see
/// `cfs-volume-http` and `cfs-volume-zip` for the two concrete strategies
/// this crate's tests exercise.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;
    async fn size(&self) -> std::io::Result<u64>;
}

#[async_trait]
pub trait FileWriter: Send + Sync {
    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<usize>;
    async fn truncate(&mut self, size: u64) -> std::io::Result<()>;
    async fn sync(&mut self) -> std::io::Result<()>;
}

/// One filesystem change notification. `path` is relative to the volume
/// root that produced the watch, matching [`FileInfo::path`]'s convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
}

/// A live subscription to [`WatchEvent`]s under a watched path. Dropping it
/// (or calling [`EventStream::close`]) tears down the underlying watch.
#[async_trait]
pub trait EventStream: Send + Sync {
    async fn next(&mut self) -> Option<WatchEvent>;
    async fn close(&mut self);
}

bitflags::bitflags! {
    /// What a particular [`Volume`] instance actually supports, for
    /// introspection by callers (e.g. the hub deciding whether `-w` publish
    /// is meaningful). Not load-bearing for dispatch: every `Volume` method
    /// always exists, and unsupported calls fail at the call site with
    /// [`crate::PathErrorKind::Unsupported`] rather than being hidden behind
    /// a marker trait.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const READ   = 1 << 0;
        const WRITE  = 1 << 1;
        const WATCH  = 1 << 2;
    }
}

/// The capability-discriminated volume abstraction. Every backend
/// (`cfs-volume-local`, `-mem`, `-zip`, `-http`) and every composite
/// (`ReadOnlyVolume`, `VolumeGroup`, `AutoUnzip`) and the remote stub in
/// `cfs-ws-volume` implement this single trait; absent capabilities are
/// discovered by calling a method and getting back
/// [`crate::PathErrorKind::Unsupported`] or
/// [`crate::PathErrorKind::PermissionDenied`], never by a missing trait impl.
#[async_trait]
pub trait Volume: Send + Sync {
    /// Whether this volume is currently reachable. [`crate::VolumeGroup`]'s
    /// `resolve` skips entries where this returns `false` (e.g. a
    /// `cfs-ws-volume` remote whose connection has dropped), falling
    /// through to the next matching mount instead of failing the whole
    /// lookup. Local backends are available unless they have a reason not
    /// to be.
    async fn available(&self) -> bool {
        true
    }

    async fn stat(&self, path: &str) -> PathResult<FileInfo>;

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>>;

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        Err(PathError::unsupported(path))
    }

    async fn open_writer(&self, path: &str, _create: bool) -> PathResult<Box<dyn FileWriter>> {
        Err(PathError::unsupported(path))
    }

    async fn remove(&self, path: &str) -> PathResult<()> {
        Err(PathError::unsupported(path))
    }

    async fn mkdir(&self, path: &str) -> PathResult<()> {
        Err(PathError::unsupported(path))
    }

    async fn watch(&self, path: &str) -> PathResult<Box<dyn EventStream>> {
        Err(PathError::unsupported(path))
    }

    /// Lazy traversal yielding non-directory entries under `root`. The
    /// default synthesizes this from recursive [`Volume::read_dir`] calls
    /// (see [`crate::walk::walk`]); a backend with a genuinely cheaper
    /// native walk (e.g. one syscall instead of one per directory) can
    /// override this instead.
    async fn walk(
        &self,
        root: &str,
        visit: &mut (dyn FnMut(&FileInfo) + Send),
    ) -> PathResult<()> {
        crate::walk::walk(self, root, visit).await
    }

    /// Advertised capability set; composites forward the narrowest of their
    /// members (see [`crate::ReadOnlyVolume`] and [`crate::VolumeGroup`]).
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ
    }
}
