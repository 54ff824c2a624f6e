use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cfs_volume_core::{EventStream, PathError, PathResult, WatchEvent};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{kind_from_notify, relativize};

pub struct LocalEventStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    // Kept alive for as long as the stream is; dropping it stops delivery.
    _watcher: RecommendedWatcher,
}

#[async_trait]
impl EventStream for LocalEventStream {
    async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

pub async fn watch_path(
    root: &Path,
    full: &Path,
    reported_path: &str,
) -> PathResult<Box<dyn EventStream>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = root.to_path_buf();
    let full_owned: PathBuf = full.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        let Some(kind) = kind_from_notify(&event.kind) else { return };
        for changed in &event.paths {
            if let Some(rel) = relativize(&root, changed) {
                let _ = tx.send(WatchEvent { path: rel, kind });
            }
        }
    })
    .map_err(|e| PathError::with_source(reported_path, cfs_volume_core::PathErrorKind::Other, e))?;

    watcher
        .watch(&full_owned, RecursiveMode::Recursive)
        .map_err(|e| PathError::with_source(reported_path, cfs_volume_core::PathErrorKind::Other, e))?;

    Ok(Box::new(LocalEventStream { rx, _watcher: watcher }))
}
