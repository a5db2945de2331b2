use std::io::{Seek, SeekFrom, Write as _};
use std::sync::Arc;

use super::prelude::*;

pub fn write(
    fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    let mut state = fsw.state.lock().expect("filesystem state poisoned");
    let Some(open_file) = state.open_files.get_mut(&fh) else {
        reply.error(EBADF);
        return;
    };
    open_file.pending.insert(PendingAction::Write);

    if open_file.file.seek(SeekFrom::Start(offset as u64)).is_err() {
        reply.error(EIO);
        return;
    }
    match open_file.file.write(data) {
        Ok(n) => reply.written(n as u32),
        Err(err) => {
            tracing::warn!(%err, "write failed");
            reply.error(EIO);
        }
    }
}

/// Closes the handle. If any bytes were written and this wasn't an
/// editor-local file, refreshes the tree/LRU sizes from the file's current
/// length and dispatches an asynchronous commit of the new content.
pub fn release(
    fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    let open_file = {
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        state.open_files.remove(&fh)
    };
    let Some(open_file) = open_file else {
        reply.ok();
        return;
    };

    if open_file.editor_local || !open_file.pending.contains(&PendingAction::Write) {
        reply.ok();
        return;
    }

    let path = open_file.path;
    let full_path = fsw.data_dir().join(&path);
    let size = match std::fs::metadata(&full_path) {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            tracing::warn!(path = %path, %err, "stat after write failed");
            reply.ok();
            return;
        }
    };

    {
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        let (_, components) = path_utils::split(&path);
        state.tree.set(&components, Node::File(size));
        state.lru.put(&path, size);
    }

    let branch = path_utils::branch_of(&path);
    let (_, components) = path_utils::split(&path);
    let basename = components.last().cloned().unwrap_or_default();
    let virtual_path = path.clone();
    let remote = Arc::clone(&fsw.remote);
    fsw.workers.dispatch(move |scratch| {
        if let Err(err) = remote.commit(scratch, &branch, &full_path, &basename, &virtual_path, size)
        {
            tracing::warn!(path = %virtual_path, %err, "commit failed");
        }
    });

    reply.ok();
}

pub fn flush(
    fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _lock_owner: u64,
    reply: ReplyEmpty,
) {
    let state = fsw.state.lock().expect("filesystem state poisoned");
    if let Some(open_file) = state.open_files.get(&fh) {
        let _ = open_file.file.sync_all();
    }
    reply.ok();
}

pub fn fsync(
    fsw: &mut FsWrapper,
    req: &Request<'_>,
    ino: u64,
    fh: u64,
    _datasync: bool,
    reply: ReplyEmpty,
) {
    flush(fsw, req, ino, fh, 0, reply);
}
