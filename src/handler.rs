//! The seam between the core server and application logic.
//!
//! A `Handler` only ever sees a parsed `Request` and a `ConnIo` that can
//! write and zero-copy-send a file — never the raw socket, never a
//! blocking read. Every I/O call it makes runs through C7's async
//! primitives, so a slow client never stalls the worker thread.

use std::os::unix::io::RawFd;

use crate::async_io;
use crate::error::Result;
use crate::http::Request;

pub trait Handler: Send + Sync {
    fn handle(&self, req: &Request, io: &mut ConnIo) -> Result<()>;
}

/// The only I/O surface a `Handler` gets. Constructed fresh per connection
/// by `connection::run`.
pub struct ConnIo {
    fd: RawFd,
}

impl ConnIo {
    pub(crate) fn new(fd: RawFd) -> ConnIo {
        ConnIo { fd }
    }

    pub fn send(&mut self, buf: &[u8]) -> Result<()> {
        async_io::send_async(self.fd, buf)
    }

    /// Zero-copy send of `count` bytes from `file_fd` starting at `offset`,
    /// advancing `offset` past what was sent.
    pub fn sendfile(&mut self, file_fd: RawFd, offset: &mut i64, count: usize) -> Result<()> {
        async_io::sendfile_async(self.fd, file_fd, offset, count)
    }
}
