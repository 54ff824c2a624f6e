use std::sync::Arc;

use async_trait::async_trait;

use crate::{Capabilities, EventStream, FileInfo, FileReader, PathError, PathResult, Volume};

/// Wraps a volume so every mutating operation fails with
/// [`crate::PathErrorKind::PermissionDenied`], regardless of what the inner
/// volume would otherwise allow. Watching and reading pass through
/// unchanged: read-only describes writes, not liveness.
pub struct ReadOnlyVolume {
    inner: Arc<dyn Volume>,
}

impl ReadOnlyVolume {
    pub fn new(inner: Arc<dyn Volume>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Volume for ReadOnlyVolume {
    async fn available(&self) -> bool {
        self.inner.available().await
    }

    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        self.inner.stat(path).await
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        self.inner.read_dir(path).await
    }

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        self.inner.open_reader(path).await
    }

    async fn open_writer(
        &self,
        path: &str,
        _create: bool,
    ) -> PathResult<Box<dyn crate::FileWriter>> {
        Err(PathError::permission_denied(path))
    }

    async fn remove(&self, path: &str) -> PathResult<()> {
        Err(PathError::permission_denied(path))
    }

    async fn mkdir(&self, path: &str) -> PathResult<()> {
        Err(PathError::permission_denied(path))
    }

    async fn watch(&self, path: &str) -> PathResult<Box<dyn EventStream>> {
        self.inner.watch(path).await
    }

    fn capabilities(&self) -> Capabilities {
        (self.inner.capabilities() & !Capabilities::WRITE) | Capabilities::READ
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubVolume;

    #[tokio::test]
    async fn write_operations_are_denied() {
        let inner: Arc<dyn Volume> = Arc::new(StubVolume::with_dir("d"));
        let ro = ReadOnlyVolume::new(inner);
        let err = ro.mkdir("d2").await.unwrap_err();
        assert_eq!(err.kind, crate::PathErrorKind::PermissionDenied);
        // reads still pass through
        assert!(ro.stat("d").await.is_ok());
    }
}
