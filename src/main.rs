mod bootstrap;
mod cache;
mod config;
mod error;
mod fs;
mod manifest;
mod path_utils;
mod remote;
mod tree;
mod workers;

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Cli, Config};
use error::GitFsError;
use fs::{FsWrapper, RetrievalTracker};
use remote::RemoteOps;
use workers::WorkerPool;

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logging();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(GitFsError::RepoNotFound { url }) = err.downcast_ref::<GitFsError>() {
                tracing::error!(url, "remote repository not found");
            } else {
                tracing::error!(%err, "gitfs exited with an error");
            }
            ExitCode::FAILURE
        }
    }
}

/// The binary entry point only needs to log-and-exit on failure, so it
/// composes the typed subsystem errors into `anyhow` rather than matching
/// on them (`main` special-cases `GitFsError::RepoNotFound` afterward for
/// the one case that needs a distinct message).
fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_cli(cli);

    let state = bootstrap::bootstrap(&config).context("bootstrap failed")?;
    let state = Arc::new(Mutex::new(state));

    let remote = Arc::new(RemoteOps::new(config.pure_dir()));
    let workers = Arc::new(WorkerPool::new(
        config.workers,
        config.pure_dir(),
        config.base_directory.clone(),
        config.cache_size_bytes,
    ));
    let retrieval = Arc::new(RetrievalTracker::new());
    let config = Arc::new(config);

    bootstrap::spawn_sync_loop(Arc::clone(&state), Arc::clone(&remote), config.sync_interval);

    let filesystem = FsWrapper::new(state, remote, workers, retrieval, Arc::clone(&config));

    let mount_options = vec![fuser::MountOption::FSName("gitfs".to_string())];
    tracing::info!(mountpoint = %config.mountpoint.display(), "mounting");
    fuser::mount2(filesystem, &config.mountpoint, &mount_options).context("mount failed")?;

    Ok(())
}

fn install_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gitfs=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
