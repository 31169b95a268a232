//! C4 — scheduling (spec §3, §4.4).
//!
//! `run_ready` is the pop/resume/reap loop, grounded in upstream's
//! `schedule()`: pop the head of the ready queue, swap into it, and if it
//! came back finished, destroy it on the spot rather than leaving cleanup
//! for later. Runs until the ready queue is empty, then returns control to
//! `Worker::run` so it can block on `poll` again.

use crate::worker::Worker;

pub fn run_ready(worker: &mut Worker) {
    loop {
        let id = match worker.ready.pop() {
            Some(id) => id,
            None => return,
        };

        let worker_ptr: *mut Worker = worker;
        let finished = worker.arena.resume(worker_ptr, id);

        if finished {
            worker.arena.destroy(id, &mut worker.stack_pool);
        }
    }
}
