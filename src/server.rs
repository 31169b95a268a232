//! Top-level wiring: bind the listener, start the worker pool, and round-
//! robin accepted connections to it. Grounded in `server.c`'s
//! `server_init`/`start_workers`, with the blocking `accept()` loop left on
//! its own OS thread exactly as upstream does — only connections, never the
//! listener itself, go through the coroutine scheduler.

use std::net::TcpListener;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Fatal;
use crate::handler::Handler;
use crate::worker::Worker;

pub struct Server {
    config: Arc<Config>,
    handler: Arc<dyn Handler>,
}

impl Server {
    pub fn new(config: Config, handler: impl Handler + 'static) -> Server {
        Server { config: Arc::new(config), handler: Arc::new(handler) }
    }

    /// Start the worker pool and accept connections until the process is
    /// killed. Only returns on a startup failure (spec §7 `Fatal`).
    pub fn run(self) -> Result<(), Fatal> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port))
            .map_err(|e| Fatal(format!("binding port {}: {}", self.config.port, e)))?;

        let mut notify_write_fds = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let (read_fd, write_fd) = make_notify_pipe()
                .map_err(|e| Fatal(format!("creating notify pipe for worker {id}: {e}")))?;
            notify_write_fds.push(write_fd);

            let config = self.config.clone();
            let handler = self.handler.clone();
            thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || match Worker::new(id, config, handler, read_fd) {
                    Ok(mut worker) => worker.run(),
                    Err(e) => log::error!("{}", e),
                })
                .map_err(|e| Fatal(format!("spawning worker {id}: {e}")))?;
        }

        let dispatcher = Dispatcher::new(notify_write_fds);
        log::info!(
            "listening on port {} with {} worker(s)",
            self.config.port,
            dispatcher.worker_count()
        );

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nonblocking(true) {
                log::warn!("failed to set client socket nonblocking: {}", e);
                continue;
            }
            let fd = stream.into_raw_fd();
            if let Err(e) = dispatcher.dispatch(fd) {
                log::error!("failed to dispatch fd {} to a worker: {}", fd, e);
                let _ = nix::unistd::close(fd);
            }
        }

        Ok(())
    }
}

/// A `pipe2(2)` with the read end nonblocking and both ends close-on-exec,
/// matching `start_workers`'s `pipe(workers[i].notify_fds)` plus the
/// nonblocking flag every coroutine-parked fd needs.
fn make_notify_pipe() -> std::io::Result<(RawFd, RawFd)> {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let flags = unsafe { libc::fcntl(read_fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(read_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        let err = std::io::Error::last_os_error();
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
        return Err(err);
    }

    Ok((read_fd, write_fd))
}
