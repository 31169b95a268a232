//! The worker: one OS thread, one `mio::Poll`, one coroutine arena (spec
//! §3, §4.5-ish — spec.md leaves the event-loop glue to "external
//! collaborators"; this ties C1-C4 and C7 together the way
//! `connection_manager/coroutine.c`'s `worker_loop` does upstream).

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::config::Config;
use crate::coroutine::{CoroutineArena, CoroutineId, WaitKind};
use crate::error::Fatal;
use crate::fd_table::FdTable;
use crate::handler::Handler;
use crate::ready_queue::ReadyQueue;
use crate::stack::StackPool;

/// A coroutine blocks on at most these two interests (spec §3).
pub fn interest_for(kind: WaitKind) -> Interest {
    match kind {
        WaitKind::Read => Interest::READABLE,
        WaitKind::Write => Interest::WRITABLE,
    }
}

pub struct Worker {
    pub id: usize,
    pub config: Arc<Config>,
    pub handler: Arc<dyn Handler>,
    poll: Poll,
    events: Events,
    notify_read_fd: RawFd,
    pub arena: CoroutineArena,
    pub ready: ReadyQueue,
    pub fd_table: FdTable,
    pub stack_pool: StackPool,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        handler: Arc<dyn Handler>,
        notify_read_fd: RawFd,
    ) -> Result<Worker, Fatal> {
        let poll = Poll::new().map_err(|e| Fatal(format!("worker {id}: Poll::new: {e}")))?;
        poll.registry()
            .register(&mut SourceFd(&notify_read_fd), Token(notify_read_fd as usize), Interest::READABLE)
            .map_err(|e| Fatal(format!("worker {id}: registering notify pipe: {e}")))?;

        let policy = config.policy;
        Ok(Worker {
            id,
            config,
            handler,
            poll,
            events: Events::with_capacity(256),
            notify_read_fd,
            arena: CoroutineArena::new(),
            ready: ReadyQueue::new(policy),
            fd_table: FdTable::new(),
            stack_pool: StackPool::new(),
        })
    }

    pub fn register(&mut self, fd: RawFd, kind: WaitKind) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(fd as usize), interest_for(kind))
    }

    pub fn reregister(&mut self, fd: RawFd, kind: WaitKind) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(&mut SourceFd(&fd), Token(fd as usize), interest_for(kind))
    }

    pub fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    /// Register interest in `fd` if this is the first time we've waited on
    /// it, otherwise just flip the interest mask. Connections commonly
    /// alternate between waiting to read and waiting to write on the same
    /// fd over their lifetime.
    pub fn ensure_registered(&mut self, fd: RawFd, kind: WaitKind) -> io::Result<()> {
        match self.register(fd, kind) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.reregister(fd, kind),
            Err(e) => Err(e),
        }
    }

    /// Spawn a new connection-handling coroutine for `fd` and push it onto
    /// the ready queue for its first turn (spec §4.1, §4.2).
    pub fn spawn_connection(&mut self, fd: RawFd) {
        let worker_ptr: *mut Worker = self;
        let handler = self.handler.clone();
        let stack_size = self.config.stack_size;
        let recv_timeout_ms = self.config.recv_timeout_ms;

        let entry = move || {
            crate::connection::run(worker_ptr, fd, handler, recv_timeout_ms);
        };

        match self.arena.spawn(entry, stack_size, &mut self.stack_pool) {
            Ok(id) => self.ready.push(id),
            Err(e) => {
                log::warn!("worker {}: failed to spawn connection for fd {}: {}", self.id, fd, e);
                let _ = nix::unistd::close(fd);
            }
        }
    }

    /// The worker's main loop: drain ready coroutines, then block on epoll
    /// until something becomes runnable again. Never returns under normal
    /// operation.
    pub fn run(&mut self) {
        loop {
            crate::scheduler::run_ready(self);

            let timeout = Some(Duration::from_millis(self.config.recv_timeout_ms.max(50)));
            if let Err(e) = self.poll.poll(&mut self.events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("worker {}: poll failed: {}", self.id, e);
                continue;
            }

            let notify_fd = self.notify_read_fd;
            let mut woken: Vec<CoroutineId> = Vec::new();
            let mut new_fds: Vec<RawFd> = Vec::new();

            for event in self.events.iter() {
                let fd = event.token().0 as RawFd;
                if fd == notify_fd {
                    new_fds.extend(drain_notify_pipe(notify_fd));
                    continue;
                }

                let closed = event.is_read_closed() || event.is_write_closed() || event.is_error();
                if event.is_readable() || event.is_writable() || closed {
                    if let Some(id) = self.fd_table.wake(fd) {
                        // Clear the arena's wait/deadline right away, before
                        // the expired-deadline sweep below runs, so a
                        // coroutine woken by readiness is never also caught
                        // by the timeout sweep and pushed onto the ready
                        // queue twice in the same iteration.
                        self.arena.clear_wait(id);
                        woken.push(id);
                    }
                }
            }

            for id in self.arena.expired(std::time::Instant::now()) {
                if let Some(fd) = self.arena.wait_fd(id) {
                    self.fd_table.clear(fd);
                }
                self.arena.mark_timed_out(id);
                self.ready.push(id);
            }

            for fd in new_fds {
                self.spawn_connection(fd);
            }
            for id in woken {
                self.ready.push(id);
            }
        }
    }
}

/// Drain every pending fd handed off by the acceptor (spec-adjacent: the
/// notify pipe is the dispatcher's only channel into a worker). Stops at
/// the first short/absent read, matching an edge-triggered, nonblocking
/// pipe.
fn drain_notify_pipe(fd: RawFd) -> Vec<RawFd> {
    let mut out = Vec::new();
    let mut buf = [0u8; std::mem::size_of::<RawFd>()];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n == buf.len() as isize {
            out.push(RawFd::from_ne_bytes(buf));
            continue;
        }
        if n == 0 {
            break; // write end closed, nothing more will ever arrive
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock && err.kind() != io::ErrorKind::Interrupted {
                log::warn!("notify pipe read error: {}", err);
            }
            break;
        }
        log::warn!("notify pipe short read of {} bytes, dropping", n);
        break;
    }
    out
}
