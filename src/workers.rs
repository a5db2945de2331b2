//! Bounded worker pool with per-worker scratch working copies.
//!
//! Mirrors a standard channel-backed thread pool (a shared job queue behind
//! a `Mutex<Receiver<_>>`, one thread per worker), but each worker also owns
//! a stable name used to key its own scratch clone of the canonical
//! repository, created lazily on first use and periodically recycled once
//! its `.git/objects` footprint grows past the configured cache capacity.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use walkdir::WalkDir;

type Job = Box<dyn FnOnce(&Path) + Send + 'static>;

enum Message {
    NewJob(Job),
    Terminate,
}

struct Worker {
    handle: Option<JoinHandle<()>>,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Message>>,
    pending: Arc<AtomicUsize>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        canonical_repo: PathBuf,
        base_dir: PathBuf,
        capacity_bytes: u64,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let worker_name = format!("fsworker{id}");
            let receiver = Arc::clone(&receiver);
            let pending = Arc::clone(&pending);
            let canonical_repo = canonical_repo.clone();
            let base_dir = base_dir.clone();

            let handle = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || loop {
                    let message = { receiver.lock().expect("worker queue poisoned").recv() };
                    match message {
                        Ok(Message::NewJob(job)) => {
                            pending.fetch_sub(1, Ordering::SeqCst);
                            let scratch = prepare(&base_dir, &worker_name, &canonical_repo);
                            job(&scratch);
                            finalize(
                                &scratch,
                                &canonical_repo,
                                capacity_bytes,
                                &pending,
                                worker_count,
                            );
                        }
                        Ok(Message::Terminate) | Err(_) => break,
                    }
                })
                .expect("failed to spawn worker thread");

            workers.push(Worker {
                handle: Some(handle),
            });
        }

        WorkerPool {
            workers,
            sender: Some(sender),
            pending,
            worker_count,
        }
    }

    /// The number of jobs queued but not yet picked up by a worker.
    pub fn pending_len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Dispatches `job` to run on whichever worker becomes free next,
    /// without waiting for completion.
    pub fn dispatch(&self, job: impl FnOnce(&Path) + Send + 'static) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.sender
            .as_ref()
            .expect("pool not shut down")
            .send(Message::NewJob(Box::new(job)))
            .expect("worker pool channel closed");
    }

    /// Dispatches `job` and blocks the caller until it has completed. Used
    /// where a subsequent operation depends on `job` having already run
    /// (the destination pre-delete ahead of a rename).
    pub fn dispatch_sync(&self, job: impl FnOnce(&Path) + Send + 'static) {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        self.dispatch(move |scratch| {
            job(scratch);
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            for _ in &self.workers {
                let _ = sender.send(Message::Terminate);
            }
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Returns this worker's scratch directory, creating it by recursively
/// copying the canonical repository if it doesn't yet exist.
fn prepare(base_dir: &Path, worker_name: &str, canonical_repo: &Path) -> PathBuf {
    let scratch = base_dir.join(format!("scratch_{worker_name}"));
    if !scratch.exists() {
        if let Err(err) = copy_tree(canonical_repo, &scratch) {
            tracing::warn!(%err, worker = worker_name, "failed to materialize scratch directory");
        }
    }
    scratch
}

/// If the pending queue isn't saturated, checks this worker's scratch
/// `.git/objects` footprint and recycles the scratch if it has grown past
/// capacity. Bounds clone growth without paying the cost on every job.
fn finalize(
    scratch: &Path,
    canonical_repo: &Path,
    capacity_bytes: u64,
    pending: &AtomicUsize,
    worker_count: usize,
) {
    if pending.load(Ordering::SeqCst) >= worker_count {
        return;
    }
    let objects_dir = scratch.join(".git").join("objects");
    let size: u64 = WalkDir::new(&objects_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum();
    if size > capacity_bytes {
        tracing::debug!(path = %scratch.display(), size, "recycling oversized scratch directory");
        if std::fs::remove_dir_all(scratch).is_ok() {
            if let Err(err) = copy_tree(canonical_repo, scratch) {
                tracing::warn!(%err, "failed to recopy scratch directory after recycling");
            }
        }
    }
}

/// Recursively copies `src` into `dst`, which must not already exist.
/// Mirrors `shutil.copytree`: the destination ends up with the same
/// relative structure as the source, not nested one level deeper.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry.path().strip_prefix(src).unwrap();
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn copy_tree_mirrors_source_structure() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::remove_dir(dst.path()).unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::write(src.path().join("a/b/file.txt"), b"hi").unwrap();

        copy_tree(src.path(), dst.path()).unwrap();

        assert_eq!(
            std::fs::read(dst.path().join("a/b/file.txt")).unwrap(),
            b"hi"
        );
    }

    #[test]
    fn dispatch_runs_job_with_a_scratch_directory() {
        let base = tempfile::tempdir().unwrap();
        let canonical = base.path().join("pure");
        std::fs::create_dir_all(&canonical).unwrap();
        std::fs::write(canonical.join("filelist.txt"), "").unwrap();

        let pool = WorkerPool::new(2, canonical, base.path().to_path_buf(), 10_000_000);
        let (tx, rx) = channel();
        pool.dispatch(move |scratch| {
            let exists = scratch.join("filelist.txt").exists();
            tx.send(exists).unwrap();
        });
        let saw_manifest = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(saw_manifest);
    }

    #[test]
    fn dispatch_sync_blocks_until_job_completes() {
        let base = tempfile::tempdir().unwrap();
        let canonical = base.path().join("pure");
        std::fs::create_dir_all(&canonical).unwrap();

        let pool = WorkerPool::new(1, canonical, base.path().to_path_buf(), 10_000_000);
        let marker = Arc::new(Mutex::new(false));
        let marker_clone = Arc::clone(&marker);
        pool.dispatch_sync(move |_scratch| {
            *marker_clone.lock().unwrap() = true;
        });
        assert!(*marker.lock().unwrap());
    }
}
