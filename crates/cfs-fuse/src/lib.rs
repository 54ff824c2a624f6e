//! FUSE bridge: presents a [`cfs_volume_core::Volume`] as a mounted,
//! kernel-visible filesystem via the `fuser` crate.

mod convert;
pub mod filesystem;
mod inode;

use std::path::Path;
use std::sync::Arc;

use cfs_volume_core::Volume;
pub use filesystem::VolumeFilesystem;
use fuser::MountOption;

/// Mounts `volume` at `mountpoint`, blocking the calling thread until the
/// filesystem is unmounted (by `umount`, or the kernel tearing it down).
/// `writable` controls whether the mount accepts writes, matching `cs
/// mount`'s `-w` flag.
pub fn mount(volume: Arc<dyn Volume>, mountpoint: impl AsRef<Path>, writable: bool) -> std::io::Result<()> {
    let fs = VolumeFilesystem::new(volume, writable)?;
    let mut options = vec![MountOption::FSName("cfs".to_string()), MountOption::AutoUnmount];
    options.push(if writable { MountOption::RW } else { MountOption::RO });
    tracing::info!(mountpoint = %mountpoint.as_ref().display(), writable, "mounting");
    fuser::mount2(fs, mountpoint, &options)
}

/// Like [`mount`], but spawns the FUSE session on a background thread and
/// returns immediately. Dropping the returned [`fuser::BackgroundSession`]
/// unmounts the filesystem.
pub fn spawn_mount(
    volume: Arc<dyn Volume>,
    mountpoint: impl AsRef<Path>,
    writable: bool,
) -> std::io::Result<fuser::BackgroundSession> {
    let fs = VolumeFilesystem::new(volume, writable)?;
    let mut options = vec![MountOption::FSName("cfs".to_string()), MountOption::AutoUnmount];
    options.push(if writable { MountOption::RW } else { MountOption::RO });
    tracing::info!(mountpoint = %mountpoint.as_ref().display(), writable, "spawning mount");
    fuser::spawn_mount2(fs, mountpoint, &options)
}
