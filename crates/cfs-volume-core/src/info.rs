use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

bitflags::bitflags! {
    /// Mode bitfield for a [`FileInfo`]. Mirrors a Unix `st_mode` closely
    /// enough to round-trip through the wire protocol, but only `IS_DIR` is
    /// load-bearing for volume semantics; the permission bits are advisory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileMode: u32 {
        const OWNER_READ  = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC  = 0o100;
        const GROUP_READ  = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC  = 0o010;
        const OTHER_READ  = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC  = 0o001;
        /// Set when this entry is a directory rather than a regular file.
        const IS_DIR      = 1 << 31;
    }
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode::OWNER_READ | FileMode::OWNER_WRITE | FileMode::GROUP_READ | FileMode::OTHER_READ
    }
}

impl Serialize for FileMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(FileMode::from_bits_truncate(bits))
    }
}

impl FileMode {
    pub fn is_dir(self) -> bool {
        self.contains(FileMode::IS_DIR)
    }

    pub fn dir_default() -> Self {
        Self::default() | FileMode::IS_DIR | FileMode::OWNER_EXEC | FileMode::GROUP_EXEC | FileMode::OTHER_EXEC
    }
}

/// Opaque, backend-defined key/value bag carried alongside a [`FileInfo`].
/// Local/memory/zip backends leave it empty; HTTP and WS backends use it to
/// smuggle ETags, content types, and similar metadata that doesn't fit the
/// core fields.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Path is always `/`-separated and relative: it never starts with `/` and
/// never contains a Windows drive letter or backslash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_time: OffsetDateTime,
    pub mode: FileMode,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl FileInfo {
    pub fn new_file(path: impl Into<String>, size: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            path: path.into(),
            size,
            created_time: now,
            updated_time: now,
            mode: FileMode::default(),
            metadata: Metadata::new(),
        }
    }

    pub fn new_dir(path: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            path: path.into(),
            size: 0,
            created_time: now,
            updated_time: now,
            mode: FileMode::dir_default(),
            metadata: Metadata::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Normalizes a user-supplied path into the relative, `/`-separated form
/// every [`crate::Volume`] method expects. Rejects `..` segments and
/// absolute paths outright rather than silently resolving them, since a
/// volume has no concept of "above its own root".
pub fn normalize_path(path: &str) -> Result<String, crate::PathError> {
    let mut out = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return Err(crate::PathError::invalid(path)),
            s => out.push(s),
        }
    }
    Ok(out.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_rejects_traversal() {
        assert_eq!(normalize_path("a/b/").unwrap(), "a/b");
        assert_eq!(normalize_path("/a//b").unwrap(), "a/b");
        assert_eq!(normalize_path("./a/./b").unwrap(), "a/b");
        assert!(normalize_path("a/../b").is_err());
    }

    #[test]
    fn name_is_last_segment() {
        let info = FileInfo::new_file("a/b/c.txt", 10);
        assert_eq!(info.name(), "c.txt");
    }
}
