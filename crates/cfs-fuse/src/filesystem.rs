//! Bridges an async [`Volume`] into fuser's synchronous, callback-based
//! `Filesystem` trait.
//!
//! Each trait method below owns a dedicated current-thread Tokio runtime
//! (built the same way fuser's own experimental `TokioAdapter` builds one)
//! and drives the volume call to completion with `block_on` before
//! replying. fuser dispatches requests from a small worker-thread pool, so
//! blocking one dispatch thread on the volume's async call is safe and
//! avoids the extra `Arc`-and-spawn indirection the adapter needs when it
//! must not block its caller at all.

use std::ffi::OsStr;
use std::sync::Arc;

use cfs_volume_core::{FileReader, FileWriter, Volume};
use fuser::{
    FileHandle, FileType, Filesystem, FopenFlags, KernelConfig, OpenAccMode, OpenFlags, ReadFlags,
    Request, WriteFlags,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::convert::{errno, file_attr, ATTR_TTL};
use crate::inode::InodeTable;

enum OpenHandle {
    Reader(Box<dyn FileReader>),
    Writer(Box<dyn FileWriter>),
    Dir,
}

/// Live FUSE session state for one mounted volume.
pub struct VolumeFilesystem {
    volume: Arc<dyn Volume>,
    runtime: tokio::runtime::Runtime,
    inodes: InodeTable,
    handles: Mutex<HashMap<u64, OpenHandle>>,
    next_fh: AtomicU64,
    writable: bool,
}

impl VolumeFilesystem {
    /// `writable` gates `open`/`create`/`write`/`mkdir`/`unlink`/`rmdir`
    /// with `EACCES` regardless of what the underlying volume supports,
    /// matching the CLI's `-w` publish flag and the hub's read-only
    /// default mount.
    pub fn new(volume: Arc<dyn Volume>, writable: bool) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            volume,
            runtime,
            inodes: InodeTable::new(),
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            writable,
        })
    }

    fn allocate_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.inodes.path_of(ino)
    }
}

impl Filesystem for VolumeFilesystem {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::io::Result<()> {
        Ok(())
    }

    fn lookup(&self, _req: &Request<'_>, parent: fuser::INodeNo, name: &OsStr, reply: fuser::ReplyEntry) {
        let Some(parent_path) = self.path_for(parent.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(fuser::Errno::EINVAL);
            return;
        };
        let child_path = InodeTable::child_path(&parent_path, name);
        let ino = self.inodes.ino_for(&child_path);
        let volume = self.volume.clone();
        self.runtime.block_on(async move {
            match volume.stat(&child_path).await {
                Ok(info) => reply.entry(&ATTR_TTL, &file_attr(ino, &info), fuser::Generation(0)),
                Err(err) => {
                    self.inodes.forget(ino);
                    reply.error(errno(err.kind))
                }
            }
        });
    }

    fn forget(&self, _req: &Request<'_>, ino: fuser::INodeNo, _nlookup: u64) {
        self.inodes.forget(ino.0);
    }

    fn getattr(&self, _req: &Request<'_>, ino: fuser::INodeNo, _fh: Option<FileHandle>, reply: fuser::ReplyAttr) {
        let Some(path) = self.path_for(ino.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let volume = self.volume.clone();
        self.runtime.block_on(async move {
            match volume.stat(&path).await {
                Ok(info) => reply.attr(&ATTR_TTL, &file_attr(ino.0, &info)),
                Err(err) => reply.error(errno(err.kind)),
            }
        });
    }

    fn open(&self, _req: &Request<'_>, ino: fuser::INodeNo, flags: OpenFlags, reply: fuser::ReplyOpen) {
        let wants_write = matches!(flags.acc_mode(), OpenAccMode::O_WRONLY | OpenAccMode::O_RDWR);
        if wants_write && !self.writable {
            tracing::debug!(ino = ino.0, "denying write-mode open on a read-only mount");
            reply.error(fuser::Errno::EACCES);
            return;
        }
        let Some(path) = self.path_for(ino.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let volume = self.volume.clone();
        let fh = self.allocate_fh();
        self.runtime.block_on(async move {
            let handle = if wants_write {
                volume.open_writer(&path, false).await.map(OpenHandle::Writer)
            } else {
                volume.open_reader(&path).await.map(OpenHandle::Reader)
            };
            match handle {
                Ok(h) => {
                    self.handles.lock().insert(fh, h);
                    reply.opened(FileHandle(fh), FopenFlags::empty());
                }
                Err(err) => reply.error(errno(err.kind)),
            }
        });
    }

    fn read(
        &self,
        _req: &Request<'_>,
        _ino: fuser::INodeNo,
        fh: FileHandle,
        offset: u64,
        size: u32,
        _read_flags: ReadFlags,
        _flags: u32,
        _lock_owner: Option<fuser::LockOwner>,
        reply: fuser::ReplyData,
    ) {
        let handle = self.handles.lock().remove(&fh.0);
        let Some(OpenHandle::Reader(mut reader)) = handle else {
            reply.error(fuser::Errno::EBADF);
            return;
        };
        self.runtime.block_on(async move {
            let mut buf = vec![0u8; size as usize];
            let result = reader.read_at(offset, &mut buf).await;
            self.handles.lock().insert(fh.0, OpenHandle::Reader(reader));
            match result {
                Ok(n) => reply.data(&buf[..n]),
                Err(err) => reply.error(fuser::Errno::from_i32(err.raw_os_error().unwrap_or(libc::EIO))),
            }
        });
    }

    fn write(
        &self,
        _req: &Request<'_>,
        _ino: fuser::INodeNo,
        fh: FileHandle,
        offset: i64,
        data: &[u8],
        _write_flags: WriteFlags,
        _flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        reply: fuser::ReplyWrite,
    ) {
        if !self.writable {
            reply.error(fuser::Errno::EACCES);
            return;
        }
        let handle = self.handles.lock().remove(&fh.0);
        let Some(OpenHandle::Writer(mut writer)) = handle else {
            reply.error(fuser::Errno::EBADF);
            return;
        };
        let data = data.to_vec();
        self.runtime.block_on(async move {
            let result = writer.write_at(offset as u64, &data).await;
            self.handles.lock().insert(fh.0, OpenHandle::Writer(writer));
            match result {
                Ok(n) => reply.written(n as u32),
                Err(err) => reply.error(fuser::Errno::from_i32(err.raw_os_error().unwrap_or(libc::EIO))),
            }
        });
    }

    fn release(
        &self,
        _req: &Request<'_>,
        _ino: fuser::INodeNo,
        fh: FileHandle,
        _flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        self.handles.lock().remove(&fh.0);
        reply.ok();
    }

    fn fsync(&self, _req: &Request<'_>, _ino: fuser::INodeNo, fh: FileHandle, _datasync: bool, reply: fuser::ReplyEmpty) {
        let handle = self.handles.lock().remove(&fh.0);
        let Some(OpenHandle::Writer(mut writer)) = handle else {
            reply.ok();
            return;
        };
        self.runtime.block_on(async move {
            let result = writer.sync().await;
            self.handles.lock().insert(fh.0, OpenHandle::Writer(writer));
            match result {
                Ok(()) => reply.ok(),
                Err(err) => reply.error(fuser::Errno::from_i32(err.raw_os_error().unwrap_or(libc::EIO))),
            }
        });
    }

    fn opendir(&self, _req: &Request<'_>, _ino: fuser::INodeNo, _flags: OpenFlags, reply: fuser::ReplyOpen) {
        let fh = self.allocate_fh();
        self.handles.lock().insert(fh, OpenHandle::Dir);
        reply.opened(FileHandle(fh), FopenFlags::empty());
    }

    fn readdir(
        &self,
        _req: &Request<'_>,
        ino: fuser::INodeNo,
        _fh: FileHandle,
        offset: u64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let Some(path) = self.path_for(ino.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let volume = self.volume.clone();
        self.runtime.block_on(async move {
            match volume.read_dir(&path).await {
                Ok(entries) => {
                    // `.` and `..` are synthesized here rather than
                    // returned by the volume, same convention every
                    // fuser example's readdir follows.
                    let dots: [(fuser::INodeNo, FileType, &str); 2] =
                        [(ino, FileType::Directory, "."), (ino, FileType::Directory, "..")];
                    for (index, (dino, kind, name)) in dots.iter().enumerate().skip(offset as usize) {
                        if reply.add(*dino, index as u64 + 1, *kind, name) {
                            reply.ok();
                            return;
                        }
                    }
                    let skip = (offset as usize).saturating_sub(dots.len());
                    for (index, info) in entries.iter().enumerate().skip(skip) {
                        let child_path = InodeTable::child_path(&path, info.name());
                        let child_ino = self.inodes.ino_for(&child_path);
                        let kind = if info.is_dir() { FileType::Directory } else { FileType::RegularFile };
                        let next_offset = (dots.len() + index) as u64 + 1;
                        if reply.add(fuser::INodeNo(child_ino), next_offset, kind, info.name()) {
                            break;
                        }
                    }
                    reply.ok();
                }
                Err(err) => reply.error(errno(err.kind)),
            }
        });
    }

    fn releasedir(&self, _req: &Request<'_>, _ino: fuser::INodeNo, fh: FileHandle, _flags: OpenFlags, reply: fuser::ReplyEmpty) {
        self.handles.lock().remove(&fh.0);
        reply.ok();
    }

    fn mkdir(&self, _req: &Request<'_>, parent: fuser::INodeNo, name: &OsStr, _mode: u32, _umask: u32, reply: fuser::ReplyEntry) {
        if !self.writable {
            reply.error(fuser::Errno::EACCES);
            return;
        }
        let Some(parent_path) = self.path_for(parent.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(fuser::Errno::EINVAL);
            return;
        };
        let child_path = InodeTable::child_path(&parent_path, name);
        let volume = self.volume.clone();
        self.runtime.block_on(async move {
            match volume.mkdir(&child_path).await {
                Ok(()) => match volume.stat(&child_path).await {
                    Ok(info) => {
                        let ino = self.inodes.ino_for(&child_path);
                        reply.entry(&ATTR_TTL, &file_attr(ino, &info), fuser::Generation(0));
                    }
                    Err(err) => reply.error(errno(err.kind)),
                },
                Err(err) => reply.error(errno(err.kind)),
            }
        });
    }

    fn unlink(&self, _req: &Request<'_>, parent: fuser::INodeNo, name: &OsStr, reply: fuser::ReplyEmpty) {
        self.remove_entry(parent, name, reply);
    }

    fn rmdir(&self, _req: &Request<'_>, parent: fuser::INodeNo, name: &OsStr, reply: fuser::ReplyEmpty) {
        self.remove_entry(parent, name, reply);
    }

    fn create(
        &self,
        _req: &Request<'_>,
        parent: fuser::INodeNo,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        if !self.writable {
            reply.error(fuser::Errno::EACCES);
            return;
        }
        let Some(parent_path) = self.path_for(parent.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(fuser::Errno::EINVAL);
            return;
        };
        let child_path = InodeTable::child_path(&parent_path, name);
        let volume = self.volume.clone();
        let fh = self.allocate_fh();
        self.runtime.block_on(async move {
            match volume.open_writer(&child_path, true).await {
                Ok(writer) => match volume.stat(&child_path).await {
                    Ok(info) => {
                        let ino = self.inodes.ino_for(&child_path);
                        self.handles.lock().insert(fh, OpenHandle::Writer(writer));
                        reply.created(&ATTR_TTL, &file_attr(ino, &info), fuser::Generation(0), FileHandle(fh), 0u32);
                    }
                    Err(err) => reply.error(errno(err.kind)),
                },
                Err(err) => reply.error(errno(err.kind)),
            }
        });
    }

    fn statfs(&self, _req: &Request<'_>, _ino: fuser::INodeNo, reply: fuser::ReplyStatfs) {
        // The volume abstraction has no notion of free space or inode
        // budgets; report a generous, unbounded-looking filesystem rather
        // than a hard zero, which some tools treat as "disk full".
        reply.statfs(u64::MAX / 512, u64::MAX / 512, u64::MAX / 512, 0, 0, 512, 255, 512);
    }

    fn access(&self, _req: &Request<'_>, ino: fuser::INodeNo, _mask: fuser::AccessFlags, reply: fuser::ReplyEmpty) {
        if self.path_for(ino.0).is_some() {
            reply.ok();
        } else {
            reply.error(fuser::Errno::ENOENT);
        }
    }
}

impl VolumeFilesystem {
    fn remove_entry(&self, parent: fuser::INodeNo, name: &OsStr, reply: fuser::ReplyEmpty) {
        if !self.writable {
            reply.error(fuser::Errno::EACCES);
            return;
        }
        let Some(parent_path) = self.path_for(parent.0) else {
            reply.error(fuser::Errno::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(fuser::Errno::EINVAL);
            return;
        };
        let child_path = InodeTable::child_path(&parent_path, name);
        let volume = self.volume.clone();
        self.runtime.block_on(async move {
            match volume.remove(&child_path).await {
                Ok(()) => reply.ok(),
                Err(err) => reply.error(errno(err.kind)),
            }
        });
    }
}
