use std::fmt;

/// Error taxonomy shared by every [`crate::Volume`] implementation and by the
/// wire protocol that carries volume operations across a WebSocket.
///
/// Variants are deliberately coarse: a backend that lacks a capability (no
/// writer, no watcher, ...) reports [`PathErrorKind::Unsupported`] from the
/// call site rather than hiding the method behind a different trait, so
/// wrappers like [`crate::ReadOnlyVolume`] never need to know ahead of time
/// which operations the inner volume would have supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    IsDirectory,
    NotDirectory,
    InvalidPath,
    Unsupported,
    Closed,
    Timeout,
    Other,
}

impl PathErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PathErrorKind::NotFound => "not found",
            PathErrorKind::PermissionDenied => "permission denied",
            PathErrorKind::AlreadyExists => "already exists",
            PathErrorKind::IsDirectory => "is a directory",
            PathErrorKind::NotDirectory => "not a directory",
            PathErrorKind::InvalidPath => "invalid path",
            PathErrorKind::Unsupported => "unsupported",
            PathErrorKind::Closed => "closed",
            PathErrorKind::Timeout => "timed out",
            PathErrorKind::Other => "error",
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{path}: {kind}")]
pub struct PathError {
    pub path: String,
    pub kind: PathErrorKind,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PathError {
    pub fn new(path: impl Into<String>, kind: PathErrorKind) -> Self {
        Self { path: path.into(), kind, source: None }
    }

    pub fn with_source(
        path: impl Into<String>,
        kind: PathErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { path: path.into(), kind, source: Some(Box::new(source)) }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(path, PathErrorKind::NotFound)
    }

    pub fn unsupported(path: impl Into<String>) -> Self {
        Self::new(path, PathErrorKind::Unsupported)
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::new(path, PathErrorKind::PermissionDenied)
    }

    pub fn invalid(path: impl Into<String>) -> Self {
        Self::new(path, PathErrorKind::InvalidPath)
    }

    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => PathErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => PathErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => PathErrorKind::AlreadyExists,
            std::io::ErrorKind::TimedOut => PathErrorKind::Timeout,
            _ => PathErrorKind::Other,
        };
        Self::with_source(path, kind, err)
    }
}

impl fmt::Display for PathErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PathResult<T> = Result<T, PathError>;
