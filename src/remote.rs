//! Remote git operations: commit, retrieve, delete, and rename of per-file
//! branches, and manifest synchronization for the default branch.
//!
//! Every operation here shells out to the `git` binary on `PATH`. Failures
//! are logged and treated as best-effort: the manifest is the source of
//! truth and a later sync reconciles state, per the error-handling design.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{io_err, GitFsError};
use crate::manifest::{self, ManifestEntry};

/// The branch every scratch clone and the canonical repository return to
/// once a per-file branch operation has finished.
pub const DEFAULT_BRANCH: &str = "master";

pub const MANIFEST_FILE: &str = "filelist.txt";

pub struct RemoteOps {
    /// The canonical repository clone (`pure/`), always on `DEFAULT_BRANCH`.
    pub pure_dir: PathBuf,
}

impl RemoteOps {
    pub fn new(pure_dir: PathBuf) -> Self {
        RemoteOps { pure_dir }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.pure_dir.join(MANIFEST_FILE)
    }

    /// Pulls `branch` (ignoring failure, it may not exist yet), creates or
    /// switches to it, copies `source_path` in as `basename`, stages,
    /// commits, and pushes with upstream tracking. Appends a manifest
    /// record and returns the scratch to the default branch.
    pub fn commit(
        &self,
        scratch: &Path,
        branch: &str,
        source_path: &Path,
        basename: &str,
        virtual_path: &str,
        size: u64,
    ) -> Result<(), GitFsError> {
        let _ = run_git(scratch, &["pull", "origin", branch]);
        if run_git(scratch, &["checkout", "-b", branch])
            .map(|o| !o.status.success())
            .unwrap_or(true)
        {
            let _ = run_git(scratch, &["checkout", branch]);
        }

        let dest = scratch.join(basename);
        fs::copy(source_path, &dest).map_err(|e| io_err(dest.clone(), e))?;

        let _ = run_git(scratch, &["add", basename]);
        let _ = run_git(scratch, &["commit", "-m", "update"]);
        let push = run_git(scratch, &["push", "-u", "origin", branch]);
        warn_on_failure("commit push", &push);

        self.append_manifest_record(&ManifestEntry {
            virtual_path: virtual_path.to_string(),
            branch: branch.to_string(),
            size,
        })?;

        let _ = run_git(scratch, &["checkout", DEFAULT_BRANCH]);
        Ok(())
    }

    /// Fetches `branch`, checks out `basename` from it into the scratch
    /// root, then moves it into place under `destination`. All ancestor
    /// directories of `destination` are created first.
    pub fn retrieve(
        &self,
        scratch: &Path,
        branch: &str,
        basename: &str,
        destination: &Path,
    ) -> Result<(), GitFsError> {
        let fetch = run_git(scratch, &["fetch", "origin", &format!("{branch}:{branch}")]);
        warn_on_failure("retrieve fetch", &fetch);

        let checkout = run_git(scratch, &["checkout", branch, "--", basename]);
        warn_on_failure("retrieve checkout", &checkout);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent.to_path_buf(), e))?;
        }
        fs::rename(scratch.join(basename), destination)
            .map_err(|e| io_err(destination.to_path_buf(), e))?;
        Ok(())
    }

    /// Pushes a deletion of `branch` and drops any manifest record naming
    /// it.
    pub fn delete(&self, scratch: &Path, branch: &str) -> Result<(), GitFsError> {
        let push = run_git(scratch, &["push", "origin", "--delete", branch]);
        warn_on_failure("delete push", &push);
        self.remove_manifest_records_for_branch(branch)
    }

    /// Renames `old_branch` to `new_branch` on the remote, optionally
    /// pre-deleting `new_branch` first via `delete_fn` when the
    /// destination already exists. Updates the manifest accordingly.
    pub fn rename(
        &self,
        scratch: &Path,
        old_branch: &str,
        new_branch: &str,
        new_virtual_path: &str,
        destination_exists: bool,
        delete_fn: impl FnOnce(),
    ) -> Result<(), GitFsError> {
        if destination_exists {
            delete_fn();
        }

        let fetch = run_git(scratch, &["fetch", "origin", old_branch]);
        warn_on_failure("rename fetch", &fetch);

        let refspec = format!("origin/{old_branch}:refs/heads/{new_branch}");
        let delete_old = format!(":{old_branch}");
        let push = run_git(scratch, &["push", "origin", &refspec, &delete_old]);
        warn_on_failure("rename push", &push);

        let size = self.remove_manifest_record_by_branch(old_branch)?;
        if let Some(size) = size {
            self.append_manifest_record(&ManifestEntry {
                virtual_path: new_virtual_path.to_string(),
                branch: new_branch.to_string(),
                size,
            })?;
        }
        Ok(())
    }

    /// Commits any pending local manifest edits, pulls the default branch,
    /// resolves merge conflicts additively, and pushes. Returns `true` if
    /// the manifest content changed as a result (callers should reload
    /// their directory tree from it).
    pub fn sync_manifest(&self) -> Result<bool, GitFsError> {
        let _ = run_git(&self.pure_dir, &["commit", "-a", "-m", "update filelist"]);
        let _ = run_git(&self.pure_dir, &["pull", "origin", DEFAULT_BRANCH]);

        let path = self.manifest_path();
        let content = fs::read_to_string(&path).unwrap_or_default();
        let mut changed = false;
        if content.contains("<<<<<<<") {
            let resolved = manifest::resolve_additive_conflict(&content);
            fs::write(&path, &resolved).map_err(|e| io_err(path.clone(), e))?;
            let _ = run_git(&self.pure_dir, &["commit", "-a", "-m", "merge conflict"]);
            changed = true;
        }

        let push = run_git(&self.pure_dir, &["push", "origin", DEFAULT_BRANCH]);
        warn_on_failure("manifest push", &push);
        Ok(changed)
    }

    fn append_manifest_record(&self, entry: &ManifestEntry) -> Result<(), GitFsError> {
        use std::io::Write;
        let path = self.manifest_path();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| io_err(path.clone(), e))?;
        writeln!(file, "{}", manifest::format_record(entry)).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    fn remove_manifest_records_for_branch(&self, branch: &str) -> Result<(), GitFsError> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).unwrap_or_default();
        let (entries, _) = manifest::parse_all(&content);
        let kept: Vec<String> = entries
            .iter()
            .filter(|entry| entry.branch != branch)
            .map(manifest::format_record)
            .collect();
        fs::write(&path, format!("{}\n", kept.join("\n")).trim_start_matches('\n'))
            .map_err(|e| io_err(path, e))
    }

    /// Removes the manifest record for `branch`, returning its size if one
    /// was present.
    fn remove_manifest_record_by_branch(&self, branch: &str) -> Result<Option<u64>, GitFsError> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).unwrap_or_default();
        let (entries, _) = manifest::parse_all(&content);
        let removed_size = entries
            .iter()
            .find(|entry| entry.branch == branch)
            .map(|entry| entry.size);
        let kept: Vec<String> = entries
            .iter()
            .filter(|entry| entry.branch != branch)
            .map(manifest::format_record)
            .collect();
        let body = kept.join("\n");
        let rendered = if body.is_empty() {
            String::new()
        } else {
            format!("{body}\n")
        };
        fs::write(&path, rendered).map_err(|e| io_err(path, e))?;
        Ok(removed_size)
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<Output, GitFsError> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|source| GitFsError::Remote {
            op: "git",
            detail: source.to_string(),
        })
}

fn warn_on_failure(op: &'static str, result: &Result<Output, GitFsError>) {
    match result {
        Ok(output) if !output.status.success() => {
            tracing::warn!(
                op,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "git operation exited non-zero"
            );
        }
        Err(err) => tracing::warn!(op, %err, "git operation failed to start"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_manifest_records_for_branch_drops_only_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        let pure = dir.path().join("pure");
        fs::create_dir_all(&pure).unwrap();
        fs::write(
            pure.join(MANIFEST_FILE),
            "a/b branch1 5\nc/d branch2 9\n",
        )
        .unwrap();
        let ops = RemoteOps::new(pure.clone());
        ops.remove_manifest_records_for_branch("branch1").unwrap();
        let content = fs::read_to_string(pure.join(MANIFEST_FILE)).unwrap();
        assert!(!content.contains("branch1"));
        assert!(content.contains("branch2"));
    }

    #[test]
    fn remove_manifest_record_by_branch_returns_forwarded_size() {
        let dir = tempfile::tempdir().unwrap();
        let pure = dir.path().join("pure");
        fs::create_dir_all(&pure).unwrap();
        fs::write(pure.join(MANIFEST_FILE), "a/b branch1 42\n").unwrap();
        let ops = RemoteOps::new(pure.clone());
        let size = ops.remove_manifest_record_by_branch("branch1").unwrap();
        assert_eq!(size, Some(42));
        let content = fs::read_to_string(pure.join(MANIFEST_FILE)).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn append_manifest_record_appends_a_line() {
        let dir = tempfile::tempdir().unwrap();
        let pure = dir.path().join("pure");
        fs::create_dir_all(&pure).unwrap();
        fs::write(pure.join(MANIFEST_FILE), "").unwrap();
        let ops = RemoteOps::new(pure.clone());
        ops.append_manifest_record(&ManifestEntry {
            virtual_path: "a/b".to_string(),
            branch: "branch1".to_string(),
            size: 5,
        })
        .unwrap();
        let content = fs::read_to_string(pure.join(MANIFEST_FILE)).unwrap();
        assert_eq!(content, "a/b branch1 5\n");
    }
}
