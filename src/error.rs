//! Typed errors for the subsystems below the FUSE callback boundary.
//!
//! These surface through `bootstrap` and the background sync loop, which
//! compose them into `anyhow::Result` at the binary entry point. The FUSE
//! callbacks themselves never see a `GitFsError` at all: remote and cache
//! operations dispatched through the worker pool are logged and treated as
//! best-effort there, and a callback that needs to reply with an error
//! replies with a raw `libc` errno directly.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GitFsError {
    #[error("remote operation `{op}` failed: {detail}")]
    Remote { op: &'static str, detail: String },

    #[error("malformed manifest line {line_no}: {raw:?}")]
    ManifestParse { line_no: usize, raw: String },

    #[error("repository not found at {url}")]
    RepoNotFound { url: String },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> GitFsError {
    GitFsError::Io {
        path: path.into(),
        source,
    }
}
