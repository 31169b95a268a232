//! C6 — handoff from the acceptor to a worker (spec §3, §4.6).
//!
//! Grounded in `server_init`'s `current_worker++ % NUM_WORKERS` and its
//! single `write(workers[target].notify_fds[1], &new_fd, sizeof(int))` per
//! accepted connection. One write per handoff keeps the notify pipe
//! message-aligned so a worker never has to guess where one fd's bytes end
//! and the next begin.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robins accepted connections across a fixed set of worker notify
/// pipes. Lives on the acceptor thread; the `RawFd`s it holds are the
/// write ends, one per worker.
pub struct Dispatcher {
    notify_write_fds: Vec<RawFd>,
    next: AtomicUsize,
}

impl Dispatcher {
    pub fn new(notify_write_fds: Vec<RawFd>) -> Dispatcher {
        Dispatcher { notify_write_fds, next: AtomicUsize::new(0) }
    }

    pub fn worker_count(&self) -> usize {
        self.notify_write_fds.len()
    }

    /// Hand `fd` to the next worker in round-robin order.
    pub fn dispatch(&self, fd: RawFd) -> io::Result<()> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.notify_write_fds.len();
        let target = self.notify_write_fds[idx];
        write_all(target, &fd.to_ne_bytes())
    }
}

fn write_all(fd: RawFd, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        bytes = &bytes[n as usize..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robins_across_workers() {
        // Two anonymous pipes stand in for two workers' notify pipes.
        let (r0, w0) = pipe();
        let (r1, w1) = pipe();
        let dispatcher = Dispatcher::new(vec![w0, w1]);

        dispatcher.dispatch(10).unwrap();
        dispatcher.dispatch(11).unwrap();
        dispatcher.dispatch(12).unwrap();

        assert_eq!(read_one(r0), 10);
        assert_eq!(read_one(r1), 11);
        assert_eq!(read_one(r0), 12);

        unsafe {
            libc::close(r0);
            libc::close(r1);
            libc::close(w0);
            libc::close(w1);
        }
    }

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], fds[1])
    }

    fn read_one(fd: RawFd) -> RawFd {
        let mut buf = [0u8; std::mem::size_of::<RawFd>()];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        assert_eq!(n as usize, buf.len());
        RawFd::from_ne_bytes(buf)
    }
}
