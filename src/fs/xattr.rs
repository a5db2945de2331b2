//! Extended attributes are explicitly out of scope as a feature, but the
//! kernel still expects every entry in its dispatch table to reply, so
//! these report "nothing here" rather than leaving the call unanswered.

use super::prelude::*;

#[cfg(not(target_os = "macos"))]
use libc::ENODATA as NO_ATTRIBUTE;
#[cfg(target_os = "macos")]
use libc::ENOATTR as NO_ATTRIBUTE;

pub fn getxattr(
    _fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    _name: &OsStr,
    _size: u32,
    reply: ReplyXattr,
) {
    reply.error(NO_ATTRIBUTE);
}

pub fn setxattr(
    _fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    _name: &OsStr,
    _value: &[u8],
    _flags: i32,
    _position: u32,
    reply: ReplyEmpty,
) {
    reply.ok();
}

pub fn listxattr(_fsw: &mut FsWrapper, _req: &Request<'_>, _ino: u64, _size: u32, reply: ReplyXattr) {
    reply.size(0);
}

pub fn removexattr(
    _fsw: &mut FsWrapper,
    _req: &Request<'_>,
    _ino: u64,
    _name: &OsStr,
    reply: ReplyEmpty,
) {
    reply.ok();
}
