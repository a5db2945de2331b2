//! Root of the FUSE filesystem implementation.
//!
//! [`RemoteFsState`] holds the in-memory namespace, cache, and inode maps
//! behind a single mutex with short critical sections. [`FsWrapper`] pairs it
//! with the remote-git surface, the worker pool, and the retrieval-in-flight
//! tracker, each reachable independently so a blocking retrieve or commit
//! never has to hold `state` locked for its duration. `impl Filesystem` is a
//! thin dispatcher into the sibling `attr`/`read`/`write`/`create`/`delete`/
//! `rename`/`xattr` modules, mirroring the split the reference FUSE client in
//! this codebase uses.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, ReplyXattr, Request,
};

use crate::cache::DiskLru;
use crate::config::Config;
use crate::remote::RemoteOps;
use crate::tree::Node;
use crate::workers::WorkerPool;

pub mod prelude;

mod attr;
mod create;
mod delete;
mod read;
mod rename;
mod write;
mod xattr;

/// Default Time-To-Live the kernel is told to cache attributes/entries for.
pub const TTL: Duration = Duration::from_secs(1);

/// Root inode. Fixed by FUSE convention.
pub const ROOT_INODE: u64 = 1;

/// What accumulated against an open file handle between `open`/`create` and
/// `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingAction {
    Read,
    Write,
}

/// An open file handle: the materialized path, the underlying descriptor,
/// the pending-action set `release` consults, and whether this handle was
/// opened as an editor-local file exempt from tree/LRU/remote bookkeeping.
pub struct OpenFile {
    pub path: String,
    pub file: File,
    pub pending: HashSet<PendingAction>,
    pub editor_local: bool,
}

/// The in-memory namespace, cache, and inode bookkeeping. Everything here is
/// cheap to touch; nothing in this struct ever blocks on the network.
pub struct RemoteFsState {
    pub tree: Node,
    pub lru: DiskLru,
    pub inode_to_path: HashMap<u64, String>,
    pub path_to_inode: HashMap<String, u64>,
    pub inode_to_type: HashMap<u64, FileType>,
    pub next_inode: u64,
    pub open_files: HashMap<u64, OpenFile>,
    pub next_fh: u64,
}

impl RemoteFsState {
    pub fn new(tree: Node, lru: DiskLru) -> Self {
        let mut inode_to_path = HashMap::new();
        let mut path_to_inode = HashMap::new();
        let mut inode_to_type = HashMap::new();
        inode_to_path.insert(ROOT_INODE, String::new());
        path_to_inode.insert(String::new(), ROOT_INODE);
        inode_to_type.insert(ROOT_INODE, FileType::Directory);
        RemoteFsState {
            tree,
            lru,
            inode_to_path,
            path_to_inode,
            inode_to_type,
            next_inode: ROOT_INODE + 1,
            open_files: HashMap::new(),
            next_fh: 1,
        }
    }

    /// Looks up or allocates an inode for `path`, recording its kind.
    pub fn inode_for_path(&mut self, path: &str, kind: FileType) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            self.inode_to_type.insert(ino, kind);
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path.to_string(), ino);
        self.inode_to_path.insert(ino, path.to_string());
        self.inode_to_type.insert(ino, kind);
        ino
    }

    pub fn path_for(&self, ino: u64) -> Option<&str> {
        self.inode_to_path.get(&ino).map(String::as_str)
    }

    /// Forgets every mapping naming `path`, used after unlink/rmdir/rename.
    pub fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.path_to_inode.remove(path) {
            self.inode_to_path.remove(&ino);
            self.inode_to_type.remove(&ino);
        }
    }

    pub fn rebind_path(&mut self, old_path: &str, new_path: &str) {
        if let Some(ino) = self.path_to_inode.remove(old_path) {
            self.path_to_inode.insert(new_path.to_string(), ino);
            self.inode_to_path.insert(ino, new_path.to_string());
        }
    }
}

/// Coalesces concurrent `open`s of the same path onto a single retrieval.
/// One caller wins `begin_or_wait` and performs the fetch; everyone else
/// blocks on the condition variable until that caller calls `finish`.
pub struct RetrievalTracker {
    in_progress: Mutex<HashSet<String>>,
    cvar: Condvar,
}

impl RetrievalTracker {
    pub fn new() -> Self {
        RetrievalTracker {
            in_progress: Mutex::new(HashSet::new()),
            cvar: Condvar::new(),
        }
    }

    /// Returns `true` if the caller is now responsible for retrieving
    /// `path` and must call [`finish`](Self::finish) when done. Returns
    /// `false` if another thread owned the retrieval and it has already
    /// completed by the time this call returns.
    pub fn begin_or_wait(&self, path: &str) -> bool {
        let mut guard = self.in_progress.lock().expect("retrieval tracker poisoned");
        let mut waited = false;
        loop {
            if !guard.contains(path) {
                if waited {
                    return false;
                }
                guard.insert(path.to_string());
                return true;
            }
            guard = self.cvar.wait(guard).expect("retrieval tracker poisoned");
            waited = true;
        }
    }

    pub fn finish(&self, path: &str) {
        let mut guard = self.in_progress.lock().expect("retrieval tracker poisoned");
        guard.remove(path);
        self.cvar.notify_all();
    }
}

impl Default for RetrievalTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The aggregate handed to `fuser::mount2`. Cloning is cheap: every field is
/// an `Arc` (or, for `config`, small and read-only), so each FUSE callback
/// can clone its own handle without contending on a single coarse lock.
#[derive(Clone)]
pub struct FsWrapper {
    pub state: Arc<Mutex<RemoteFsState>>,
    pub remote: Arc<RemoteOps>,
    pub workers: Arc<WorkerPool>,
    pub retrieval: Arc<RetrievalTracker>,
    pub config: Arc<Config>,
}

impl FsWrapper {
    pub fn new(
        state: Arc<Mutex<RemoteFsState>>,
        remote: Arc<RemoteOps>,
        workers: Arc<WorkerPool>,
        retrieval: Arc<RetrievalTracker>,
        config: Arc<Config>,
    ) -> Self {
        FsWrapper {
            state,
            remote,
            workers,
            retrieval,
            config,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.datadir()
    }
}

impl Filesystem for FsWrapper {
    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        attr::getattr(self, req, ino, reply);
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        attr::setattr(
            self, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        read::lookup(self, req, parent, name, reply);
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        read::readdir(self, req, ino, fh, offset, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::open(self, req, ino, flags, reply);
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        read::read(self, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        write::write(
            self,
            req,
            ino,
            fh,
            offset,
            data,
            write_flags,
            flags,
            lock_owner,
            reply,
        );
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        write::release(self, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        write::flush(self, req, ino, fh, lock_owner, reply);
    }

    fn fsync(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        write::fsync(self, req, ino, fh, datasync, reply);
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        create::create(self, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        create::mkdir(self, req, parent, name, mode, umask, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::unlink(self, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::rmdir(self, req, parent, name, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        rename::rename(self, req, parent, name, newparent, newname, flags, reply);
    }

    fn getxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        xattr::getxattr(self, req, ino, name, size, reply);
    }

    fn setxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        position: u32,
        reply: ReplyEmpty,
    ) {
        xattr::setxattr(self, req, ino, name, value, flags, position, reply);
    }

    fn listxattr(&mut self, req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        xattr::listxattr(self, req, ino, size, reply);
    }

    fn removexattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        xattr::removexattr(self, req, ino, name, reply);
    }
}
