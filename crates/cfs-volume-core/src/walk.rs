//! Default recursive walk, built purely on `stat`/`read_dir` so every
//! [`crate::Volume`] gets it for free without implementing a separate
//! "walker" capability. Backing `Volume::walk`'s default body; see
//! [`crate::group::VolumeGroup`] for the one override that can't just
//! reuse this (it needs to prefix each emitted path by mount).

use std::future::Future;
use std::pin::Pin;

use crate::{FileInfo, PathResult, Volume};

/// Depth-first walk of `root` (use `""` for the volume root), invoking
/// `visit` once per non-directory entry. Directories are still descended
/// into but never passed to `visit` themselves. Stops and propagates the
/// first error encountered.
pub async fn walk(
    volume: &dyn Volume,
    root: &str,
    visit: &mut (dyn FnMut(&FileInfo) + Send),
) -> PathResult<()> {
    walk_inner(volume, root, visit).await
}

fn walk_inner<'a>(
    volume: &'a dyn Volume,
    path: &'a str,
    visit: &'a mut (dyn FnMut(&FileInfo) + Send),
) -> Pin<Box<dyn Future<Output = PathResult<()>> + Send + 'a>> {
    Box::pin(async move {
        for entry in volume.read_dir(path).await? {
            if entry.is_dir() {
                walk_inner(volume, &entry.path, visit).await?;
            } else {
                visit(&entry);
            }
        }
        Ok(())
    })
}

/// Convenience collector: same traversal as [`walk`] but gathers every
/// visited (non-directory) entry into a `Vec` rather than calling back.
pub async fn collect(volume: &dyn Volume, root: &str) -> PathResult<Vec<FileInfo>> {
    let mut out = Vec::new();
    walk(volume, root, &mut |info| out.push(info.clone())).await?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubVolume;

    #[tokio::test]
    async fn collects_nested_entries_but_not_directories_themselves() {
        let vol = StubVolume::empty();
        vol.insert(FileInfo::new_dir("a"));
        vol.insert(FileInfo::new_file("a/b.txt", 3));
        let found = collect(&vol, "").await.unwrap();
        let paths: Vec<_> = found.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"a/b.txt"));
        assert!(!paths.contains(&"a"));
    }
}
