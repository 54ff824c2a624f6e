//! Conversions between `cfs-volume-core`'s wire-oriented types and fuser's
//! kernel-facing ones.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cfs_volume_core::{FileInfo, PathErrorKind};
use fuser::{Errno, FileAttr, FileType, INodeNo};

/// Attribute cache TTL handed back to the kernel on every `entry`/`attr`
/// reply. Short enough that a publish-side edit shows up promptly over the
/// WebSocket volume protocol's polling/watch path, long enough to avoid a
/// round trip on every `stat`.
pub const ATTR_TTL: Duration = Duration::from_secs(1);

fn to_system_time(t: time::OffsetDateTime) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs_f64(t.unix_timestamp() as f64 + f64::from(t.nanosecond()) / 1e9)
}

pub fn file_attr(ino: u64, info: &FileInfo) -> FileAttr {
    let kind = if info.is_dir() { FileType::Directory } else { FileType::RegularFile };
    let perm = (info.mode.bits() & 0o777) as u16;
    let mtime = to_system_time(info.updated_time);
    let ctime = to_system_time(info.updated_time);
    let crtime = to_system_time(info.created_time);
    FileAttr {
        ino: INodeNo(ino),
        size: info.size,
        blocks: info.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime,
        crtime,
        kind,
        perm,
        nlink: if info.is_dir() { 2 } else { 1 },
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Maps a volume-level error kind onto the closest POSIX errno the kernel
/// understands. There is no exact match for every [`PathErrorKind`]; picks
/// the code that gives callers (`ls`, `cat`, editors) the most useful
/// retry/no-retry signal.
pub fn errno(kind: PathErrorKind) -> Errno {
    match kind {
        PathErrorKind::NotFound => Errno::ENOENT,
        PathErrorKind::PermissionDenied => Errno::EACCES,
        PathErrorKind::AlreadyExists => Errno::EEXIST,
        PathErrorKind::IsDirectory => Errno::EISDIR,
        PathErrorKind::NotDirectory => Errno::ENOTDIR,
        PathErrorKind::InvalidPath => Errno::EINVAL,
        PathErrorKind::Unsupported => Errno::ENOSYS,
        PathErrorKind::Closed => Errno::EBADF,
        PathErrorKind::Timeout => Errno::ETIMEDOUT,
        PathErrorKind::Other => Errno::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_get_directory_kind_and_nlink_two() {
        let info = FileInfo::new_dir("a/b");
        let attr = file_attr(7, &info);
        assert_eq!(attr.ino, INodeNo(7));
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn files_get_regular_kind_and_nlink_one_and_block_count() {
        let info = FileInfo::new_file("a.txt", 513);
        let attr = file_attr(3, &info);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.blocks, 2);
    }

    #[test]
    fn not_found_maps_to_enoent() {
        assert_eq!(errno(PathErrorKind::NotFound), Errno::ENOENT);
    }

    #[test]
    fn unsupported_maps_to_enosys() {
        assert_eq!(errno(PathErrorKind::Unsupported), Errno::ENOSYS);
    }
}
