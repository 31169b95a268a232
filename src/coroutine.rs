//! C1 — the stackful coroutine abstraction (spec §3, §4.1).
//!
//! A coroutine is a fixed-size stack plus a saved register context, switched
//! symmetrically via the `context` crate (the same crate
//! `cheme-coroutine-rs` depends on and `rustcc-coroutine-rs/src/coroutine/
//! raw.rs` wraps internally). Coroutines live in a `slab::Slab` arena per
//! `Worker` rather than behind intrusive heap pointers (spec §9 DESIGN
//! NOTES: "an arena-with-indices design is equally valid and preferable in
//! a language with strict aliasing/borrow rules").
//!
//! Exactly one coroutine runs per worker OS thread at a time, which is what
//! makes the thread-local bookkeeping below sound: `CURRENT` and
//! `RETURN_CTX` are never touched by two coroutines concurrently, and a
//! coroutine's `*mut Worker` is only ever dereferenced from the thread that
//! owns it (spec §5: "no migration between workers").

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::time::Instant;

use context::stack::ProtectedFixedSizeStack;
use context::{Context, Transfer};

use crate::error::Error;
use crate::worker::Worker;

/// Read or write readiness a coroutine is parked on (spec §3, GLOSSARY).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitKind {
    Read,
    Write,
}

/// Index into a worker's coroutine arena. Cheap to copy, stored in the
/// `ReadyQueue` and `FdTable` in place of spec.md's intrusive pointers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CoroutineId(pub usize);

/// One entry in a worker's coroutine arena.
///
/// `context` is `None` exactly while the coroutine is the one currently
/// running (swapped out into the CPU, not into this struct) or after it has
/// finished and its stack has been reclaimed.
struct CoroutineSlot {
    context: Option<Context>,
    stack: Option<ProtectedFixedSizeStack>,
    /// `false` until the first resume; governs whether that resume carries
    /// the boxed entry closure pointer or a plain wake value.
    started: bool,
    init_data: usize,
    finished: bool,
    wait_fd: Option<RawFd>,
    wait_kind: Option<WaitKind>,
    deadline: Option<Instant>,
    timed_out: bool,
}

/// Per-worker arena of live coroutines.
#[derive(Default)]
pub struct CoroutineArena {
    slots: slab::Slab<CoroutineSlot>,
}

const WAKE: usize = 0;
const FINISHED: usize = 1;

thread_local! {
    static CURRENT: RefCell<Option<(*mut Worker, CoroutineId)>> = RefCell::new(None);
    static RETURN_CTX: RefCell<Option<Context>> = RefCell::new(None);
}

extern "C" fn trampoline(t: Transfer) -> ! {
    RETURN_CTX.with(|c| *c.borrow_mut() = Some(t.context));

    let entry: Box<Box<dyn FnOnce()>> = unsafe { Box::from_raw(t.data as *mut Box<dyn FnOnce()>) };
    entry();

    let ret = RETURN_CTX
        .with(|c| c.borrow_mut().take())
        .expect("return context missing at coroutine exit");
    unsafe {
        ret.resume(FINISHED);
    }
    unreachable!("a finished coroutine must never be resumed again");
}

impl CoroutineArena {
    pub fn new() -> CoroutineArena {
        CoroutineArena { slots: slab::Slab::new() }
    }

    /// Allocate a stack and a not-yet-started context for `entry`. Does not
    /// run any of `entry` yet — the caller pushes the returned id onto a
    /// `ReadyQueue` so the scheduler gives it its first resume like any
    /// other ready coroutine (spec §4.1 `create` is distinct from §4.4
    /// `schedule`). Fails with `Error::ResourceExhausted` on stack
    /// allocation failure.
    pub fn spawn<F>(
        &mut self,
        entry: F,
        stack_size: usize,
        pool: &mut crate::stack::StackPool,
    ) -> Result<CoroutineId, Error>
    where
        F: FnOnce() + 'static,
    {
        let stack = pool.take(stack_size)?;
        let context = Context::new(&stack, trampoline);

        // Boxed twice: the outer Box is what we hand across the FFI-ish
        // boundary as a raw pointer; the inner is the trait object itself.
        let boxed: Box<Box<dyn FnOnce()>> = Box::new(Box::new(entry));
        let init_data = Box::into_raw(boxed) as usize;

        let slot = CoroutineSlot {
            context: Some(context),
            stack: Some(stack),
            started: false,
            init_data,
            finished: false,
            wait_fd: None,
            wait_kind: None,
            deadline: None,
            timed_out: false,
        };
        let key = self.slots.insert(slot);
        Ok(CoroutineId(key))
    }

    /// Resume `id`. Returns `true` if the coroutine ran to completion
    /// during this resume (spec §4.4 `schedule`).
    pub fn resume(&mut self, worker: *mut Worker, id: CoroutineId) -> bool {
        CURRENT.with(|c| *c.borrow_mut() = Some((worker, id)));

        let slot = &mut self.slots[id.0];
        let data = if slot.started { WAKE } else { slot.init_data };
        slot.started = true;
        let ctx = slot.context.take().expect("coroutine has no context to resume");

        let Transfer { context, data } = unsafe { ctx.resume(data) };

        CURRENT.with(|c| *c.borrow_mut() = None);

        let slot = &mut self.slots[id.0];
        if data == FINISHED {
            slot.finished = true;
            true
        } else {
            slot.context = Some(context);
            false
        }
    }

    pub fn is_finished(&self, id: CoroutineId) -> bool {
        self.slots[id.0].finished
    }

    pub fn set_wait(&mut self, id: CoroutineId, fd: RawFd, kind: WaitKind, deadline: Option<Instant>) {
        let slot = &mut self.slots[id.0];
        slot.wait_fd = Some(fd);
        slot.wait_kind = Some(kind);
        slot.deadline = deadline;
        slot.timed_out = false;
    }

    pub fn clear_wait(&mut self, id: CoroutineId) {
        let slot = &mut self.slots[id.0];
        slot.wait_fd = None;
        slot.wait_kind = None;
        slot.deadline = None;
    }

    pub fn wait_kind(&self, id: CoroutineId) -> Option<WaitKind> {
        self.slots[id.0].wait_kind
    }

    pub fn wait_fd(&self, id: CoroutineId) -> Option<RawFd> {
        self.slots[id.0].wait_fd
    }

    /// Return ids of every coroutine still parked on an expired deadline,
    /// without mutating anything. The caller is responsible for clearing
    /// their `FdTable` entry (which this arena does not own) before
    /// reaping them via `mark_timed_out`.
    pub fn expired(&self, now: Instant) -> Vec<CoroutineId> {
        self.slots
            .iter()
            .filter_map(|(key, slot)| match slot.deadline {
                Some(d) if now >= d => Some(CoroutineId(key)),
                _ => None,
            })
            .collect()
    }

    pub fn mark_timed_out(&mut self, id: CoroutineId) {
        let slot = &mut self.slots[id.0];
        slot.timed_out = true;
        slot.wait_fd = None;
        slot.wait_kind = None;
        slot.deadline = None;
    }

    /// Consume the timed-out flag set by `mark_timed_out`. Called once by
    /// the async I/O retry loop right after it is resumed.
    pub fn take_timed_out(&mut self, id: CoroutineId) -> bool {
        let slot = &mut self.slots[id.0];
        std::mem::replace(&mut slot.timed_out, false)
    }

    /// Idempotently release a coroutine's stack and arena slot.
    /// MUST NOT be called while `id` is the currently running coroutine —
    /// only after its trampoline has returned (spec §4.1 `destroy`).
    pub fn destroy(&mut self, id: CoroutineId, pool: &mut crate::stack::StackPool) {
        if !self.slots.contains(id.0) {
            return;
        }
        let slot = self.slots.remove(id.0);
        if let Some(stack) = slot.stack {
            pool.give(stack);
        }
    }
}

/// The worker and id of the coroutine currently executing, if any.
/// Valid any time real coroutine code is running, including inside nested
/// calls made before the next `yield_now`.
pub fn current() -> Option<(*mut Worker, CoroutineId)> {
    CURRENT.with(|c| *c.borrow())
}

/// Suspend the calling coroutine until `fd` is ready for `kind`, or until
/// `deadline` passes. Only valid when called from inside a running
/// coroutine. Returns `true` if woken by the deadline rather than by I/O
/// readiness.
///
/// This is the sole suspension point in the whole system (spec §5): the
/// parser, the URI decoder, and handler routing never call this.
pub fn yield_now(fd: RawFd, kind: WaitKind, deadline: Option<Instant>) -> bool {
    let (worker_ptr, id) = current().expect("yield_now called outside a coroutine");

    // Safety: `worker_ptr` is only ever dereferenced on the OS thread that
    // owns it, which is exactly the thread we are running on right now,
    // since coroutines never migrate (spec §5).
    let worker = unsafe { &mut *worker_ptr };
    worker.arena.set_wait(id, fd, kind, deadline);
    worker.fd_table.park(fd, id);
    if let Err(e) = worker.ensure_registered(fd, kind) {
        log::warn!("failed to register fd {} with the poller: {}", fd, e);
    }

    swap_out();

    let worker = unsafe { &mut *worker_ptr };
    worker.arena.take_timed_out(id)
}

/// The raw half of a yield: swap control back to whatever resumed us, and
/// block until we are resumed again.
fn swap_out() {
    let ret = RETURN_CTX
        .with(|c| c.borrow_mut().take())
        .expect("swap_out called without a saved return context");
    let t = unsafe { ret.resume(WAKE) };
    RETURN_CTX.with(|c| *c.borrow_mut() = Some(t.context));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackPool;

    #[test]
    fn runs_to_completion_without_yielding() {
        let mut arena = CoroutineArena::new();
        let mut pool = StackPool::new();
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let ran2 = ran.clone();

        let id = arena
            .spawn(move || ran2.set(true), 64 * 1024, &mut pool)
            .unwrap();
        assert!(!arena.is_finished(id));

        // Never touches the wait-bookkeeping path, so a dangling worker
        // pointer is never dereferenced.
        let finished = arena.resume(std::ptr::null_mut(), id);

        assert!(finished);
        assert!(ran.get());
        assert!(arena.is_finished(id));
    }
}
