//! C9 — the connection entry coroutine (spec §3, §4.9, §4.10).
//!
//! Grounded in `request-handler/entry.c`'s `entry()`: recv, parse, dispatch,
//! repeat while keep-alive holds, then close. This is the closure every
//! `Worker::spawn_connection` hands to `CoroutineArena::spawn` — it runs on
//! the coroutine's own stack and only ever suspends through `async_io`.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::async_io::recv_async;
use crate::error::Error;
use crate::handler::{ConnIo, Handler};
use crate::http::{ParseOutcome, RequestParser};
use crate::worker::Worker;

const RECV_BUF_SIZE: usize = 8 * 1024;

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\
Content-Length: 0\r\n\
Connection: close\r\n\
\r\n";

/// The coroutine body for one accepted connection. Runs until the peer
/// closes, the connection times out, a request fails to parse, or the
/// handler asks to close (by way of `Connection: close` / HTTP/1.0).
pub fn run(worker_ptr: *mut Worker, fd: RawFd, handler: Arc<dyn Handler>, recv_timeout_ms: u64) {
    let mut parser = RequestParser::new();
    let mut io = ConnIo::new(fd);
    let mut buf = [0u8; RECV_BUF_SIZE];

    'connection: loop {
        let n = match recv_async(fd, &mut buf, Some(recv_timeout_ms)) {
            Ok(n) => n,
            Err(Error::TimedOut) | Err(Error::PeerClosed) => break,
            Err(e) => {
                log::debug!("fd {}: recv failed: {}", fd, e);
                break;
            }
        };

        let mut offset = 0;
        loop {
            match parser.feed(&buf[offset..n]) {
                ParseOutcome::Pending => break,
                ParseOutcome::Complete(req) => {
                    let keep_alive = req.keep_alive();
                    if let Err(e) = handler.handle(&req, &mut io) {
                        log::warn!("fd {}: handler error: {}", fd, e);
                        break 'connection;
                    }
                    if !keep_alive {
                        break 'connection;
                    }
                    parser.reset();
                    // Pipelined bytes already consumed by `feed` stay in
                    // the parser's own buffer, so feed an empty slice to
                    // drain any further complete requests already in hand.
                    offset = n;
                }
                ParseOutcome::Error => {
                    log::debug!("fd {}: {}", fd, Error::Protocol);
                    let _ = io.send(BAD_REQUEST);
                    break 'connection;
                }
            }
        }
    }

    close_connection(worker_ptr, fd);
}

/// Mirrors `connection_manager.c`'s `close_connection`: drop any fd-table
/// waiter, deregister from the poller, then shut down and close. The
/// fd-table entry must go first — once `close` returns, the kernel is free
/// to hand this fd number to a brand new connection, and a stale waiter
/// would be mistaken for belonging to it (spec §4.10).
fn close_connection(worker_ptr: *mut Worker, fd: RawFd) {
    let worker = unsafe { &mut *worker_ptr };
    worker.fd_table.clear(fd);
    let _ = worker.deregister(fd);
    let _ = nix::sys::socket::shutdown(fd, nix::sys::socket::Shutdown::Write);
    let _ = nix::unistd::close(fd);
}
