use std::sync::Arc;

use async_trait::async_trait;

use crate::{Capabilities, EventStream, FileInfo, FileReader, FileWriter, PathError, PathResult, Volume};

struct Mount {
    prefix: String,
    volume: Arc<dyn Volume>,
}

/// A composite volume mounting several sub-volumes at distinct path
/// prefixes, matching longest-prefix-match semantics (so `a/b` beats `a`
/// when both are mounted). Directories that exist only because a deeper
/// mount point needs them (e.g. `a` when only `a/b` is mounted) are
/// synthesized on the fly rather than requiring an explicit mkdir.
pub struct VolumeGroup {
    mounts: Vec<Mount>,
}

impl VolumeGroup {
    pub fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    /// `prefix` is the mount point, relative and `/`-separated, `""` for
    /// the root volume. Mounts are kept sorted longest-prefix-first.
    pub fn mount(&mut self, prefix: impl Into<String>, volume: Arc<dyn Volume>) {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.mounts.retain(|m| m.prefix != prefix);
        self.mounts.push(Mount { prefix, volume });
        self.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// Longest-prefix match among entries whose [`Volume::available`]
    /// currently returns `true`; an unavailable entry is skipped in favor
    /// of the next matching mount (or `None` if none match).
    async fn resolve(&self, path: &str) -> Option<(&Mount, &str)> {
        for mount in &self.mounts {
            let rest = if mount.prefix.is_empty() {
                Some(path)
            } else if path == mount.prefix {
                Some("")
            } else {
                path.strip_prefix(&mount.prefix).and_then(|r| r.strip_prefix('/'))
            };
            let Some(rest) = rest else { continue };
            if !mount.volume.available().await {
                continue;
            }
            return Some((mount, rest));
        }
        None
    }

    /// Mount-point directories between the root and each mounted prefix,
    /// used to synthesize parent directory listings/stats.
    fn synthetic_children(&self, path: &str) -> Vec<FileInfo> {
        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for mount in &self.mounts {
            if mount.prefix.is_empty() || mount.prefix == path {
                continue;
            }
            let Some(rest) = mount.prefix.strip_prefix(&prefix[..]) else { continue };
            if rest.is_empty() {
                continue;
            }
            let child = rest.split('/').next().unwrap();
            if seen.insert(child.to_string()) {
                let child_path = if path.is_empty() {
                    child.to_string()
                } else {
                    format!("{path}/{child}")
                };
                out.push(FileInfo::new_dir(child_path));
            }
        }
        out
    }
}

impl Default for VolumeGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Volume for VolumeGroup {
    async fn stat(&self, path: &str) -> PathResult<FileInfo> {
        if let Some((mount, rest)) = self.resolve(path).await {
            if rest.is_empty() && !mount.prefix.is_empty() {
                return Ok(FileInfo::new_dir(path));
            }
            let mut info = mount.volume.stat(rest).await?;
            info.path = path.to_string();
            return Ok(info);
        }
        if path.is_empty() || !self.synthetic_children(path).is_empty() || self.is_synthetic_dir(path) {
            return Ok(FileInfo::new_dir(path));
        }
        Err(PathError::not_found(path))
    }

    async fn read_dir(&self, path: &str) -> PathResult<Vec<FileInfo>> {
        let mut out = Vec::new();
        if let Some((mount, rest)) = self.resolve(path).await {
            out.extend(mount.volume.read_dir(rest).await?.into_iter().map(|mut info| {
                info.path = if path.is_empty() {
                    info.path
                } else {
                    format!("{path}/{}", info.path)
                };
                info
            }));
        }
        out.extend(self.synthetic_children(path));
        if out.is_empty() && self.resolve(path).await.is_none() && !self.is_synthetic_dir(path) && !path.is_empty() {
            return Err(PathError::not_found(path));
        }
        Ok(out)
    }

    async fn open_reader(&self, path: &str) -> PathResult<Box<dyn FileReader>> {
        let (mount, rest) = self.resolve(path).await.ok_or_else(|| PathError::not_found(path))?;
        mount.volume.open_reader(rest).await
    }

    async fn open_writer(&self, path: &str, create: bool) -> PathResult<Box<dyn FileWriter>> {
        let (mount, rest) = self.resolve(path).await.ok_or_else(|| PathError::not_found(path))?;
        mount.volume.open_writer(rest, create).await
    }

    async fn remove(&self, path: &str) -> PathResult<()> {
        let (mount, rest) = self.resolve(path).await.ok_or_else(|| PathError::not_found(path))?;
        mount.volume.remove(rest).await
    }

    async fn mkdir(&self, path: &str) -> PathResult<()> {
        let (mount, rest) = self.resolve(path).await.ok_or_else(|| PathError::not_found(path))?;
        mount.volume.mkdir(rest).await
    }

    async fn watch(&self, path: &str) -> PathResult<Box<dyn EventStream>> {
        let (mount, rest) = self.resolve(path).await.ok_or_else(|| PathError::not_found(path))?;
        mount.volume.watch(rest).await
    }

    /// Iterates every mount (not just the one `root` resolves into) and
    /// prefixes each emitted entry's path with that mount's prefix, per
    /// the group walk contract.
    async fn walk(
        &self,
        root: &str,
        visit: &mut (dyn FnMut(&FileInfo) + Send),
    ) -> PathResult<()> {
        for mount in &self.mounts {
            if !mount.volume.available().await {
                continue;
            }
            let mut entries = Vec::new();
            crate::walk::walk(mount.volume.as_ref(), "", &mut |info| entries.push(info.clone())).await?;
            for mut info in entries {
                info.path = if mount.prefix.is_empty() {
                    info.path
                } else {
                    format!("{}/{}", mount.prefix, info.path)
                };
                if info.path.strip_prefix(root.trim_matches('/')).is_some() || root.is_empty() {
                    visit(&info);
                }
            }
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.mounts
            .iter()
            .fold(Capabilities::all(), |acc, m| acc & m.volume.capabilities())
    }
}

impl VolumeGroup {
    fn is_synthetic_dir(&self, path: &str) -> bool {
        self.mounts.iter().any(|m| {
            !m.prefix.is_empty() && (m.prefix == path || m.prefix.starts_with(&format!("{path}/")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubVolume;

    #[tokio::test]
    async fn longest_prefix_wins_and_stubs_intermediate_dirs() {
        let mut group = VolumeGroup::new();
        group.mount("a", Arc::new(StubVolume::with_file("x.txt", 3)));
        group.mount("a/b", Arc::new(StubVolume::with_file("y.txt", 4)));

        let stat = group.stat("a/b/y.txt").await.unwrap();
        assert_eq!(stat.path, "a/b/y.txt");

        let stat = group.stat("a/x.txt").await.unwrap();
        assert_eq!(stat.path, "a/x.txt");

        // "a" itself is a real mount so it stats as that volume's root,
        // while "a/b" is both a real mount AND a synthetic child of "a".
        let listing = group.read_dir("a").await.unwrap();
        assert!(listing.iter().any(|e| e.path == "a/b"));
    }

    #[tokio::test]
    async fn root_mount_serves_unprefixed_paths() {
        let mut group = VolumeGroup::new();
        group.mount("", Arc::new(StubVolume::with_file("root.txt", 1)));
        assert!(group.stat("root.txt").await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_entry_is_skipped_in_favor_of_the_next_match() {
        let unavailable = Arc::new(StubVolume::with_file("a/x.txt", 3));
        unavailable.set_available(false);
        let fallback = Arc::new(StubVolume::with_file("x.txt", 9));

        let mut group = VolumeGroup::new();
        group.mount("a", unavailable);
        group.mount("", fallback);

        // "a/x.txt" resolves through the root mount once "a" reports
        // unavailable, landing on the fallback's "a/x.txt" key — which
        // doesn't exist there, so it surfaces as not found rather than the
        // unavailable mount's file.
        let err = group.stat("a/x.txt").await.unwrap_err();
        assert_eq!(err.kind, crate::PathErrorKind::NotFound);

        let stat = group.stat("x.txt").await.unwrap();
        assert_eq!(stat.size, 9);
    }

    #[tokio::test]
    async fn walk_prefixes_each_entry_by_its_mount() {
        let root = Arc::new(StubVolume::empty());
        root.insert(FileInfo::new_file("root.txt", 1));
        let sub = Arc::new(StubVolume::empty());
        sub.insert(FileInfo::new_file("nested.txt", 2));

        let mut group = VolumeGroup::new();
        group.mount("", root);
        group.mount("sub", sub);

        let mut found = Vec::new();
        group.walk("", &mut |info| found.push(info.path.clone())).await.unwrap();
        found.sort();
        assert_eq!(found, vec!["root.txt".to_string(), "sub/nested.txt".to_string()]);
    }
}
