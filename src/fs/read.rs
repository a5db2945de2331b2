use std::io::{Read as _, Seek, SeekFrom};
use std::sync::Arc;

use super::attr;
use super::prelude::*;
use crate::fs::OpenFile;

fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}/{name}")
    }
}

pub fn lookup(fsw: &mut FsWrapper, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let Some(name) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let parent_path = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        match state.path_for(parent) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        }
    };
    let full_path = child_path(&parent_path, name);
    let (_, components) = path_utils::split(&full_path);

    let kind = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        match state.tree.get(&components) {
            Some(Node::Directory(_)) => FileType::Directory,
            Some(Node::File(_)) => FileType::RegularFile,
            None => {
                reply.error(ENOENT);
                return;
            }
        }
    };

    let ino = {
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        state.inode_for_path(&full_path, kind)
    };

    match attr::resolve(fsw, ino) {
        Some(fattr) => reply.entry(&TTL, &fattr, 0),
        None => reply.error(ENOENT),
    }
}

pub fn readdir(
    fsw: &mut FsWrapper,
    _req: &Request,
    ino: u64,
    _fh: u64,
    offset: i64,
    mut reply: ReplyDirectory,
) {
    let dir_path = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        match state.path_for(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        }
    };
    let (_, components) = path_utils::split(&dir_path);

    let mut entries: Vec<(u64, FileType, String)> = Vec::new();
    entries.push((ino, FileType::Directory, ".".to_string()));
    let parent_ino = if ino == super::ROOT_INODE {
        super::ROOT_INODE
    } else {
        let parent_path = dir_path.rsplit_once('/').map_or("", |(p, _)| p);
        fsw.state
            .lock()
            .expect("filesystem state poisoned")
            .path_to_inode
            .get(parent_path)
            .copied()
            .unwrap_or(super::ROOT_INODE)
    };
    entries.push((parent_ino, FileType::Directory, "..".to_string()));

    let children = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        match state.tree.get(&components) {
            Some(Node::Directory(map)) => map.clone(),
            Some(Node::File(_)) => {
                reply.error(ENOENT);
                return;
            }
            None => {
                reply.error(ENOENT);
                return;
            }
        }
    };

    for (name, node) in &children {
        let kind = if node.is_directory() {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        let child_full = child_path(&dir_path, name);
        let child_ino = fsw
            .state
            .lock()
            .expect("filesystem state poisoned")
            .inode_for_path(&child_full, kind);
        entries.push((child_ino, kind, name.clone()));
    }

    for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
        if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

/// Waits out any in-flight retrieval of `path`, or performs it if nobody
/// else is. A path is retrieved at most once even when many `open`s race.
fn ensure_materialized(fsw: &FsWrapper, path: &str) {
    let (_, components) = path_utils::split(path);
    let needs_retrieve = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        !state.lru.contains(path) && matches!(state.tree.get(&components), Some(Node::File(_)))
    };
    if !needs_retrieve {
        return;
    }
    if !fsw.retrieval.begin_or_wait(path) {
        return;
    }

    let size = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        state.tree.get(&components).and_then(Node::as_file_size)
    };
    if let Some(size) = size {
        let branch = path_utils::branch_of(path);
        let basename = components.last().cloned().unwrap_or_default();
        let destination = fsw.data_dir().join(path);
        let remote = Arc::clone(&fsw.remote);
        let path_for_log = path.to_string();
        fsw.workers.dispatch_sync(move |scratch| {
            if let Err(err) = remote.retrieve(scratch, &branch, &basename, &destination) {
                tracing::warn!(path = %path_for_log, %err, "retrieval failed");
            }
        });
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        if fsw.data_dir().join(path).exists() {
            state.lru.put(path, size);
        }
    }
    fsw.retrieval.finish(path);
}

pub fn open(fsw: &mut FsWrapper, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
    let path = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        match state.path_for(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(ENOENT);
                return;
            }
        }
    };

    ensure_materialized(fsw, &path);

    let full_path = fsw.data_dir().join(&path);
    match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&full_path)
    {
        Ok(file) => {
            let mut state = fsw.state.lock().expect("filesystem state poisoned");
            let fh = state.next_fh;
            state.next_fh += 1;
            state.open_files.insert(
                fh,
                OpenFile {
                    path,
                    file,
                    pending: Default::default(),
                    editor_local: false,
                },
            );
            reply.opened(fh, 0);
        }
        Err(err) => {
            tracing::warn!(path = %full_path.display(), %err, "open failed");
            reply.error(ENOENT);
        }
    }
}

pub fn read(
    fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    size: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyData,
) {
    let mut state = fsw.state.lock().expect("filesystem state poisoned");
    let Some(open_file) = state.open_files.get_mut(&fh) else {
        reply.error(EBADF);
        return;
    };
    open_file.pending.insert(PendingAction::Read);

    if open_file.file.seek(SeekFrom::Start(offset as u64)).is_err() {
        reply.error(EIO);
        return;
    }
    let mut buf = vec![0u8; size as usize];
    match open_file.file.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            reply.data(&buf);
        }
        Err(err) => {
            tracing::warn!(%err, "read failed");
            reply.error(EIO);
        }
    }
}
