use std::sync::Arc;

use super::prelude::*;

fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}/{name}")
    }
}

/// Three cases, per the materialization state of `path`:
/// - cached (in the LRU): drop from LRU, tree, and the cache filesystem,
///   then dispatch an asynchronous remote branch deletion.
/// - remote-only (in the tree but not the LRU): drop from the tree and
///   dispatch the remote deletion, but leave the cache filesystem alone.
/// - neither: this is an editor artifact we never admitted to the tree;
///   fall back to a plain filesystem unlink.
pub fn unlink(fsw: &mut FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
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
    let (_, components) = path_utils::split(&full_path);

    let (in_lru, in_tree) = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        (
            state.lru.contains(&full_path),
            matches!(state.tree.get(&components), Some(Node::File(_))),
        )
    };

    if in_lru || in_tree {
        {
            let mut state = fsw.state.lock().expect("filesystem state poisoned");
            state.lru.remove(&full_path);
            state.tree.delete(&components, false);
            state.forget_path(&full_path);
        }
        if in_lru {
            if let Err(err) = std::fs::remove_file(&local_path) {
                tracing::warn!(path = %full_path, %err, "unlink: failed to remove cached file");
            }
        }
        let branch = path_utils::branch_of(&full_path);
        let remote = Arc::clone(&fsw.remote);
        let path_for_log = full_path.clone();
        fsw.workers.dispatch(move |scratch| {
            if let Err(err) = remote.delete(scratch, &branch) {
                tracing::warn!(path = %path_for_log, %err, "remote delete failed");
            }
        });
        reply.ok();
        return;
    }

    match std::fs::remove_file(&local_path) {
        Ok(()) => reply.ok(),
        Err(_) => reply.error(ENOENT),
    }
}

/// Only invoked by the kernel for empty directories, but checked again here
/// since the tree is the source of truth for what's "in" this filesystem.
pub fn rmdir(fsw: &mut FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
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
    let (_, components) = path_utils::split(&full_path);

    {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        match state.tree.get(&components) {
            Some(Node::Directory(map)) => {
                if !map.is_empty() {
                    reply.error(ENOTEMPTY);
                    return;
                }
            }
            _ => {
                reply.error(ENOENT);
                return;
            }
        }
    }

    {
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        state.tree.delete(&components, false);
        state.forget_path(&full_path);
    }
    let _ = std::fs::remove_dir(&local_path);
    reply.ok();
}
