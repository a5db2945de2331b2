use std::sync::Arc;

use super::prelude::*;

fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}/{name}")
    }
}

/// Flattens a directory subtree into `(relative_path, size)` pairs, walking
/// the in-memory tree rather than the cache filesystem so remote-only
/// (not-yet-materialized) children are included too.
fn collect_files(node: &Node, prefix: &str, out: &mut Vec<(String, u64)>) {
    if let Node::Directory(map) = node {
        for (name, child) in map {
            let rel = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match child {
                Node::File(size) => out.push((rel, *size)),
                Node::Directory(_) => collect_files(child, &rel, out),
            }
        }
    }
}

pub fn rename(
    fsw: &mut FsWrapper,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let (Some(name_str), Some(newname_str)) = (name.to_str(), newname.to_str()) else {
        reply.error(ENOENT);
        return;
    };

    let (old_parent_path, new_parent_path) = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        let old = state.path_for(parent).map(str::to_string);
        let new = state.path_for(newparent).map(str::to_string);
        match (old, new) {
            (Some(o), Some(n)) => (o, n),
            _ => {
                reply.error(ENOENT);
                return;
            }
        }
    };

    let old_full = child_path(&old_parent_path, name_str);
    let new_full = child_path(&new_parent_path, newname_str);
    let (_, old_components) = path_utils::split(&old_full);
    let (_, new_components) = path_utils::split(&new_full);

    let old_local = fsw.data_dir().join(&old_full);
    let new_local = fsw.data_dir().join(&new_full);
    if let Some(parent_dir) = new_local.parent() {
        let _ = std::fs::create_dir_all(parent_dir);
    }
    let _ = std::fs::rename(&old_local, &new_local);

    let (old_node, destination_exists) = {
        let state = fsw.state.lock().expect("filesystem state poisoned");
        (
            state.tree.get(&old_components).cloned(),
            state.tree.get(&new_components).is_some(),
        )
    };
    let Some(old_node) = old_node else {
        reply.error(ENOENT);
        return;
    };

    match old_node {
        Node::File(_) => {
            rename_file(
                fsw,
                &old_full,
                &new_full,
                &old_components,
                &new_components,
                old_node,
                destination_exists,
            );
        }
        Node::Directory(_) => {
            let mut files = Vec::new();
            collect_files(&old_node, "", &mut files);

            {
                let mut state = fsw.state.lock().expect("filesystem state poisoned");
                state.tree.delete(&old_components, true);
                state.tree.set(&new_components, old_node);
            }

            for (rel, _size) in files {
                let old_child = if rel.is_empty() {
                    old_full.clone()
                } else {
                    format!("{old_full}/{rel}")
                };
                let new_child = if rel.is_empty() {
                    new_full.clone()
                } else {
                    format!("{new_full}/{rel}")
                };
                move_cache_entry(fsw, &old_child, &new_child);
                dispatch_rename(fsw, &old_child, &new_child, false);
            }
        }
    }

    reply.ok();
}

fn rename_file(
    fsw: &mut FsWrapper,
    old_full: &str,
    new_full: &str,
    old_components: &[String],
    new_components: &[String],
    old_node: Node,
    destination_exists: bool,
) {
    {
        let mut state = fsw.state.lock().expect("filesystem state poisoned");
        state.tree.delete(old_components, false);
        state.tree.set(new_components, old_node);
    }
    move_cache_entry(fsw, old_full, new_full);
    dispatch_rename(fsw, old_full, new_full, destination_exists);
}

fn move_cache_entry(fsw: &FsWrapper, old_full: &str, new_full: &str) {
    let mut state = fsw.state.lock().expect("filesystem state poisoned");
    if let Some(size) = state.lru.remove(old_full) {
        state.lru.put(new_full, size);
    }
    state.rebind_path(old_full, new_full);
}

/// Dispatches the rename synchronously: a subsequent operation on either
/// path must observe the rename (and any destination pre-delete) as
/// already completed.
fn dispatch_rename(fsw: &FsWrapper, old_full: &str, new_full: &str, destination_exists: bool) {
    let old_branch = path_utils::branch_of(old_full);
    let new_branch = path_utils::branch_of(new_full);
    let new_virtual = new_full.to_string();
    let old_for_log = old_full.to_string();
    let remote = Arc::clone(&fsw.remote);
    fsw.workers.dispatch_sync(move |scratch| {
        let result = remote.rename(
            scratch,
            &old_branch,
            &new_branch,
            &new_virtual,
            destination_exists,
            || {
                if let Err(err) = remote.delete(scratch, &new_branch) {
                    tracing::warn!(branch = %new_branch, %err, "pre-delete before rename failed");
                }
            },
        );
        if let Err(err) = result {
            tracing::warn!(path = %old_for_log, %err, "rename failed");
        }
    });
}
