//! C7 — async I/O primitives (spec §3, §4.7).
//!
//! Grounded in `connection_manager/async.c`'s `recv_async`/`send_async`:
//! call the syscall, and on `EAGAIN`/`EWOULDBLOCK` park the coroutine and
//! retry once woken, transparently to the caller. `sendfile_async` adds the
//! same retry loop around `libc::sendfile` for zero-copy file responses
//! (`http_utils.c`'s `serve_file`).

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use crate::coroutine::{yield_now, WaitKind};
use crate::error::{Error, Result};

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn would_block(errno: i32) -> bool {
    errno == libc::EAGAIN || errno == libc::EWOULDBLOCK
}

fn deadline_from(timeout_ms: Option<u64>) -> Option<Instant> {
    timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms))
}

/// Read into `buf`, yielding and retrying on `EWOULDBLOCK` until data
/// arrives, the peer closes, an unrecoverable error occurs, or
/// `timeout_ms` elapses.
pub fn recv_async(fd: RawFd, buf: &mut [u8], timeout_ms: Option<u64>) -> Result<usize> {
    let deadline = deadline_from(timeout_ms);
    loop {
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if n > 0 {
            return Ok(n as usize);
        }
        if n == 0 {
            return Err(Error::PeerClosed);
        }
        let errno = last_errno();
        if !would_block(errno) {
            return Err(Error::Io(std::io::Error::from_raw_os_error(errno)));
        }
        if yield_now(fd, WaitKind::Read, deadline) {
            return Err(Error::TimedOut);
        }
    }
}

/// Write all of `buf`, yielding and retrying on `EWOULDBLOCK` until every
/// byte has been accepted by the kernel or an unrecoverable error occurs.
pub fn send_async(fd: RawFd, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if n > 0 {
            buf = &buf[n as usize..];
            continue;
        }
        let errno = last_errno();
        if !would_block(errno) {
            return Err(Error::Io(std::io::Error::from_raw_os_error(errno)));
        }
        if yield_now(fd, WaitKind::Write, None) {
            return Err(Error::TimedOut);
        }
    }
    Ok(())
}

/// Zero-copy transfer of `count` bytes from `file_fd` at `offset` to the
/// socket `fd`, yielding on `EWOULDBLOCK` the same way `send_async` does.
/// Advances and returns the final offset, mirroring `libc::sendfile`'s own
/// offset semantics.
pub fn sendfile_async(fd: RawFd, file_fd: RawFd, offset: &mut i64, mut count: usize) -> Result<()> {
    while count > 0 {
        let n = unsafe { libc::sendfile(fd, file_fd, offset as *mut i64, count) };
        if n > 0 {
            count -= n as usize;
            continue;
        }
        if n == 0 {
            return Ok(());
        }
        let errno = last_errno();
        if errno == libc::EINTR {
            continue;
        }
        if !would_block(errno) {
            return Err(Error::Io(std::io::Error::from_raw_os_error(errno)));
        }
        if yield_now(fd, WaitKind::Write, None) {
            return Err(Error::TimedOut);
        }
    }
    Ok(())
}
