use super::prelude::*;
use std::fs;

/// Far-future timestamp (year 2199) flagging a synthetic, not-yet-fetched
/// attribute record.
fn synthetic_time() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(7_226_582_400)
}

fn synthetic_dir_attr(ino: u64) -> FileAttr {
    let ts = synthetic_time();
    FileAttr {
        ino,
        size: 4096,
        blocks: 8,
        atime: ts,
        mtime: ts,
        ctime: ts,
        crtime: ts,
        kind: FileType::Directory,
        perm: 0o775,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}

fn synthetic_file_attr(ino: u64) -> FileAttr {
    let ts = synthetic_time();
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: ts,
        mtime: ts,
        ctime: ts,
        crtime: ts,
        kind: FileType::RegularFile,
        perm: 0o664,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}

fn attr_from_metadata(ino: u64, metadata: &fs::Metadata) -> FileAttr {
    use std::os::unix::fs::MetadataExt;
    let len = metadata.len();
    FileAttr {
        ino,
        size: len,
        blocks: len.div_ceil(512),
        atime: metadata.accessed().unwrap_or(UNIX_EPOCH),
        mtime: metadata.modified().unwrap_or(UNIX_EPOCH),
        ctime: metadata.modified().unwrap_or(UNIX_EPOCH),
        crtime: UNIX_EPOCH,
        kind: FileType::RegularFile,
        perm: 0o664,
        nlink: 1,
        uid: metadata.uid(),
        gid: metadata.gid(),
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}

/// Resolves `ino` to an attribute record, preferring a real stat of the
/// materialized file and falling back to a synthetic record for entries
/// that exist only in the manifest-derived tree.
pub fn resolve(fsw: &FsWrapper, ino: u64) -> Option<FileAttr> {
    let state = fsw.state.lock().expect("filesystem state poisoned");
    let path = state.path_for(ino)?.to_string();
    let (_, components) = path_utils::split(&path);

    if state.lru.contains(&path) {
        let full_path = fsw.data_dir().join(&path);
        if let Ok(metadata) = fs::metadata(&full_path) {
            return Some(attr_from_metadata(ino, &metadata));
        }
    }

    match state.tree.get(&components) {
        Some(Node::Directory(_)) => Some(synthetic_dir_attr(ino)),
        Some(Node::File(_)) => {
            let full_path = fsw.data_dir().join(&path);
            if let Ok(metadata) = fs::metadata(&full_path) {
                Some(attr_from_metadata(ino, &metadata))
            } else {
                Some(synthetic_file_attr(ino))
            }
        }
        None => None,
    }
}

pub fn getattr(fsw: &mut FsWrapper, _req: &Request, ino: u64, reply: ReplyAttr) {
    match resolve(fsw, ino) {
        Some(attr) => reply.attr(&TTL, &attr),
        None => reply.error(ENOENT),
    }
}

/// Only `truncate` (via `size`) is meaningful against a git-branch-backed
/// file; `chmod`/`chown`/timestamp changes are accepted and ignored, since
/// ownership and extended permissions are out of scope for this filesystem.
pub fn setattr(
    fsw: &mut FsWrapper,
    _req: &Request<'_>,
    ino: u64,
    _mode: Option<u32>,
    _uid: Option<u32>,
    _gid: Option<u32>,
    size: Option<u64>,
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
    if let Some(new_size) = size {
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
        let full_path = fsw.data_dir().join(&path);
        if let Err(err) = truncate_file(&full_path, new_size) {
            tracing::warn!(path = %path, %err, "truncate failed");
            reply.error(EIO);
            return;
        }
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        let (_, components) = path_utils::split(&path);
        state.tree.set(&components, Node::File(new_size));
        if state.lru.contains(&path) {
            state.lru.put(&path, new_size);
        }
    }

    match resolve(fsw, ino) {
        Some(attr) => reply.attr(&TTL, &attr),
        None => reply.error(ENOENT),
    }
}

fn truncate_file(path: &std::path::Path, size: u64) -> std::io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(size)
}
