use super::prelude::*;
use crate::fs::OpenFile;

fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}/{name}")
    }
}

/// An editor swap/backup file (e.g. vim's `.file.txt~` or a mode-0600
/// lockfile) never touches the tree, LRU, or remote: it's local-only scratch
/// that the editor manages itself.
fn is_editor_local(mode: u32, name: &str) -> bool {
    mode == 0o100600 || name.ends_with('~')
}

pub fn create(
    fsw: &mut FsWrapper,
    req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    mode: u32,
    _umask: u32,
    _flags: i32,
    reply: ReplyCreate,
) {
    let Some(name_str) = name.to_str() else {
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
    let full_path = child_path(&parent_path, name_str);
    let local_path = fsw.data_dir().join(&full_path);

    if let Some(dir) = local_path.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            tracing::warn!(%err, "create: failed to prepare parent directory");
            reply.error(EIO);
            return;
        }
    }

    let file = match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&local_path)
    {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(%err, "create: failed to open cache file");
            reply.error(EIO);
            return;
        }
    };

    let editor_local = is_editor_local(mode, name_str);

    let mut state = fsw.state.lock().expect("filesystem state poisoned");
    let ino = state.inode_for_path(&full_path, FileType::RegularFile);
    let fh = state.next_fh;
    state.next_fh += 1;

    if !editor_local {
        let (_, components) = path_utils::split(&full_path);
        state.tree.set(&components, Node::File(0));
        state.lru.put(&full_path, 0);
    }

    state.open_files.insert(
        fh,
        OpenFile {
            path: full_path,
            file,
            pending: {
                let mut set = std::collections::HashSet::new();
                if !editor_local {
                    set.insert(PendingAction::Write);
                }
                set
            },
            editor_local,
        },
    );
    drop(state);

    let ts = SystemTime::now();
    let attr = FileAttr {
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
        uid: req.uid(),
        gid: req.gid(),
        rdev: 0,
        flags: 0,
        blksize: 512,
    };
    reply.created(&TTL, &attr, 0, fh, 0);
}

pub fn mkdir(
    fsw: &mut FsWrapper,
    req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    reply: ReplyEntry,
) {
    let Some(name_str) = name.to_str() else {
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
    let full_path = child_path(&parent_path, name_str);
    let local_path = fsw.data_dir().join(&full_path);

    if let Err(err) = std::fs::create_dir_all(&local_path) {
        tracing::warn!(%err, "mkdir: failed to create cache directory");
        reply.error(EIO);
        return;
    }

    let mut state = fsw.state.lock().expect("filesystem state poisoned");
    let (_, components) = path_utils::split(&full_path);
    state.tree.set(&components, Node::new_root());
    let ino = state.inode_for_path(&full_path, FileType::Directory);
    drop(state);

    let ts = SystemTime::now();
    let attr = FileAttr {
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
        uid: req.uid(),
        gid: req.gid(),
        rdev: 0,
        flags: 0,
        blksize: 512,
    };
    reply.entry(&TTL, &attr, 0);
}
