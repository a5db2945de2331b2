//! Startup reconciliation between local cache and manifest, and the
//! periodic manifest sync loop.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use walkdir::WalkDir;

use crate::config::Config;
use crate::error::GitFsError;
use crate::fs::RemoteFsState;
use crate::manifest;
use crate::path_utils;
use crate::remote::{RemoteOps, DEFAULT_BRANCH, MANIFEST_FILE};
use crate::tree::Node;

/// Ensures the on-disk layout exists, clones or pulls the canonical
/// repository, clears leftover scratch directories from prior runs, loads
/// the manifest into the directory tree, and seeds the LRU from whatever is
/// already materialized under the cache data directory.
pub fn bootstrap(config: &Config) -> Result<RemoteFsState, GitFsError> {
    let base = &config.base_directory;
    let data_dir = config.datadir();
    let pure_dir = config.pure_dir();

    if !base.exists() {
        fs::create_dir_all(&data_dir).map_err(|e| crate::error::io_err(data_dir.clone(), e))?;
        fs::create_dir_all(&pure_dir).map_err(|e| crate::error::io_err(pure_dir.clone(), e))?;
        fs::write(pure_dir.join(MANIFEST_FILE), "")
            .map_err(|e| crate::error::io_err(pure_dir.clone(), e))?;
    }

    clone_or_pull(config, &pure_dir)?;
    clear_leftover_scratch_dirs(base);

    let mut tree = Node::new_root();
    let mut remote_file_size: u64 = 0;
    let manifest_content = fs::read_to_string(pure_dir.join(MANIFEST_FILE)).unwrap_or_default();
    let (entries, parse_errors) = manifest::parse_all(&manifest_content);
    for err in &parse_errors {
        tracing::warn!(%err, "skipping malformed manifest line at bootstrap");
    }
    for entry in &entries {
        let (_, components) = path_utils::split(&entry.virtual_path);
        tree.set(&components, Node::File(entry.size));
        remote_file_size += entry.size;
    }
    tracing::debug!(remote_file_size, entries = entries.len(), "manifest loaded");

    let lru = crate::cache::DiskLru::new(config.cache_size_bytes, data_dir.clone());
    let mut state = RemoteFsState::new(tree, lru);
    seed_lru_from_disk(&mut state, &data_dir);
    Ok(state)
}

fn clone_or_pull(config: &Config, pure_dir: &Path) -> Result<(), GitFsError> {
    use std::process::Command;

    if !pure_dir.join(".git").exists() {
        let output = Command::new("git")
            .args(["clone", &config.authenticated_url(), "."])
            .current_dir(pure_dir)
            .output()
            .map_err(|e| GitFsError::Remote {
                op: "clone",
                detail: e.to_string(),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if (stdout.contains("fatal: repository") || stderr.contains("fatal: repository"))
            && (stdout.contains("not found") || stderr.contains("not found"))
        {
            return Err(GitFsError::RepoNotFound {
                url: config.gitrepo.clone(),
            });
        }
        return Ok(());
    }

    let _ = Command::new("git")
        .args(["remote", "set-url", "origin", &config.authenticated_url()])
        .current_dir(pure_dir)
        .output();
    let pull = Command::new("git")
        .args(["pull", &config.authenticated_url(), DEFAULT_BRANCH])
        .current_dir(pure_dir)
        .output();
    if let Ok(output) = &pull {
        if !output.status.success() {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "bootstrap pull of canonical repository failed"
            );
        }
    }
    Ok(())
}

fn clear_leftover_scratch_dirs(base: &Path) {
    let Ok(read_dir) = fs::read_dir(base) else {
        return;
    };
    for entry in read_dir.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("scratch_") {
            if let Err(err) = fs::remove_dir_all(entry.path()) {
                tracing::warn!(%err, dir = %name, "failed to remove leftover scratch directory");
            }
        }
    }
}

fn seed_lru_from_disk(state: &mut RemoteFsState, data_dir: &Path) {
    for entry in WalkDir::new(data_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let relative = entry
            .path()
            .strip_prefix(data_dir)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        let (_, components) = path_utils::split(&relative);
        let size = state.tree.get(&components).and_then(Node::as_file_size);
        match size {
            Some(size) => {
                state.lru.put(&relative, size);
            }
            None => {
                tracing::error!(path = %relative, "orphan file (in local cache but not remote manifest)");
            }
        }
    }
}

/// Spawns the background thread that periodically commits, pulls, and
/// merges the manifest at `interval`, reloading the directory tree when the
/// merge changed it.
pub fn spawn_sync_loop(
    state: Arc<Mutex<RemoteFsState>>,
    remote: Arc<RemoteOps>,
    interval: std::time::Duration,
) {
    std::thread::Builder::new()
        .name("manifest-sync".to_string())
        .spawn(move || loop {
            std::thread::sleep(interval);
            tracing::debug!("syncing filelist.txt");
            match remote.sync_manifest() {
                Ok(changed) => {
                    tracing::debug!(changed, "manifest sync completed");
                    if changed {
                        reload_tree_from_manifest(&state, &remote);
                    }
                }
                Err(err) => tracing::warn!(%err, "manifest sync failed, will retry next interval"),
            }
        })
        .expect("failed to spawn manifest sync thread");
}

/// Merges manifest entries onto the existing tree rather than rebuilding it,
/// so directories created locally (never written to the manifest) and files
/// not yet committed survive a sync that only changed unrelated entries.
fn reload_tree_from_manifest(state: &Arc<Mutex<RemoteFsState>>, remote: &RemoteOps) {
    let content = fs::read_to_string(remote.manifest_path()).unwrap_or_default();
    let (entries, errors) = manifest::parse_all(&content);
    for err in &errors {
        tracing::warn!(%err, "skipping malformed manifest line during sync reload");
    }
    let mut state = state.lock().expect("filesystem state poisoned");
    for entry in &entries {
        let (_, components) = path_utils::split(&entry.virtual_path);
        state.tree.set(&components, Node::File(entry.size));
    }
}
