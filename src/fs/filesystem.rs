//! FUSE filesystem implementation
//!
//! Translates kernel requests into [`EncryptedStore`] calls and store
//! errors into errno values. The adapter performs no writes; every
//! mutating operation is rejected with `EROFS`.

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::{c_int, EISDIR, ENOENT, ENOTDIR, EROFS};
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, error};

use super::handle::HandleTable;
use super::inode::InodeTable;
use crate::error::Error;
use crate::store::{EncryptedStore, EntryKind, EntryMetadata};

const TTL: Duration = Duration::from_secs(1);

/// Read-only decrypting filesystem over an [`EncryptedStore`]
pub struct SealFs {
    store: EncryptedStore,
    inodes: InodeTable,
    handles: HandleTable,
}

impl SealFs {
    pub fn new(store: EncryptedStore) -> Self {
        SealFs {
            store,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
        }
    }

    fn attr_for(&self, ino: u64, meta: &EntryMetadata) -> FileAttr {
        FileAttr {
            ino,
            size: meta.size,
            blocks: meta.size.div_ceil(512),
            atime: meta.atime,
            mtime: meta.mtime,
            ctime: meta.ctime,
            crtime: SystemTime::UNIX_EPOCH,
            kind: kind_to_fuse(meta.kind),
            perm: meta.perm,
            nlink: meta.nlink,
            uid: meta.uid,
            gid: meta.gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }
}

fn kind_to_fuse(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

/// Map store errors onto the kernel's status vocabulary
fn errno(err: &Error) -> c_int {
    match err {
        Error::NotFound(_) => ENOENT,
        Error::NotADirectory(_) => ENOTDIR,
        Error::IsADirectory(_) => EISDIR,
        // CorruptEntry, CryptoFailure, Io and the rest are all generic
        // I/O failures from the kernel's point of view
        _ => libc::EIO,
    }
}

impl Filesystem for SealFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);

        let parent_path = match self.inodes.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        let path = parent_path.join(name);
        match self.store.stat(&path) {
            Ok(meta) => {
                let ino = self.inodes.assign(&path);
                self.inodes.retain(ino);
                reply.entry(&TTL, &self.attr_for(ino, &meta), 0);
            }
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        debug!("forget(ino={}, nlookup={})", ino, nlookup);
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr(ino={})", ino);

        let path = match self.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        match self.store.stat(&path) {
            Ok(meta) => reply.attr(&TTL, &self.attr_for(ino, &meta)),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino={}, offset={})", ino, offset);

        let path = match self.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        let children = match self.store.list(&path) {
            Ok(c) => c,
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];

        for (name, meta) in children {
            let child_ino = self.inodes.assign(&path.join(&name));
            entries.push((child_ino, kind_to_fuse(meta.kind), name));
        }

        for (i, (child_ino, file_type, name)) in
            entries.into_iter().enumerate().skip(offset as usize)
        {
            let buffer_full = reply.add(child_ino, (i + 1) as i64, file_type, &name);
            if buffer_full {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={})", ino, flags);

        let path = match self.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        let accmode = flags & libc::O_ACCMODE;
        if accmode == libc::O_WRONLY || accmode == libc::O_RDWR {
            reply.error(EROFS);
            return;
        }

        let fh = self.handles.open(path);
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        let path = match self.handles.path_of(fh) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        // Every read decrypts the full blob; there is no plaintext cache
        match self.store.read_bytes(&path, offset.max(0) as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                reply.error(errno(&e));
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release(fh={})", fh);
        self.handles.close(fh);
        reply.ok();
    }

    // Fixed numbers to show with df; the store has no meaningful usage
    // statistics of its own
    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(1_000_000, 500_000, 990_000, 10_000, 9_900, 1024, 10_000, 1024);
    }

    fn setattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(EROFS);
    }

    fn mknod(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(EROFS);
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(EROFS);
    }

    fn unlink(&mut self, _req: &Request, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(EROFS);
    }

    fn rmdir(&mut self, _req: &Request, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(EROFS);
    }

    fn symlink(
        &mut self,
        _req: &Request,
        _parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(EROFS);
    }

    fn rename(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(EROFS);
    }

    fn link(
        &mut self,
        _req: &Request,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(EROFS);
    }

    fn create(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(EROFS);
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(EROFS);
    }
}
