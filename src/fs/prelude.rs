//! Shared imports for the `fs` submodules, so `attr.rs`/`read.rs`/etc. don't
//! each repeat the same block of `fuser`/`libc`/stdlib re-exports.

pub use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};

pub use libc::{EBADF, EIO, ENOENT, ENOTEMPTY};
#[cfg(not(target_os = "macos"))]
pub use libc::ENODATA;
#[cfg(target_os = "macos")]
pub use libc::ENOATTR;

pub use std::ffi::OsStr;
pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use super::{FsWrapper, OpenFile, PendingAction, RemoteFsState, TTL};
pub use crate::path_utils;
pub use crate::tree::Node;
