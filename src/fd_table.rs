//! C3 — the fd table (spec §3, §4.3).
//!
//! Maps a raw file descriptor to the single coroutine parked on it. Sized to
//! `RLIMIT_NOFILE` up front (grounded in the upstream `FdNode` table, which
//! is likewise a flat array indexed by fd rather than a hash map) so `park`/
//! `wake`/`clear` are O(1) with no allocation on the hot path.
//!
//! Invariant (spec §4.3): a live fd has at most one parked coroutine. `park`
//! panics on a double-park instead of silently clobbering the previous
//! waiter, since that would strand a coroutine forever.

use std::os::unix::io::RawFd;

use nix::sys::resource::{getrlimit, Resource};

use crate::coroutine::CoroutineId;

pub struct FdTable {
    slots: Vec<Option<CoroutineId>>,
}

/// Fallback capacity if `getrlimit` fails for some reason; generous enough
/// that almost no process will ever need to grow past it.
const FALLBACK_CAPACITY: usize = 4096;

impl FdTable {
    pub fn new() -> FdTable {
        let capacity = getrlimit(Resource::RLIMIT_NOFILE)
            .map(|(soft, _hard)| soft as usize)
            .unwrap_or(FALLBACK_CAPACITY);
        FdTable { slots: vec![None; capacity] }
    }

    fn slot_mut(&mut self, fd: RawFd) -> &mut Option<CoroutineId> {
        let idx = fd as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, None);
        }
        &mut self.slots[idx]
    }

    /// Record that `id` is waiting on `fd`. Panics if another coroutine is
    /// already parked on the same fd — that would be a scheduler bug, not a
    /// recoverable runtime condition.
    pub fn park(&mut self, fd: RawFd, id: CoroutineId) {
        let slot = self.slot_mut(fd);
        assert!(slot.is_none(), "fd {} already has a coroutine parked on it", fd);
        *slot = Some(id);
    }

    /// Remove and return the coroutine waiting on `fd`, if any. Leaves the
    /// slot empty (spec §4.3: waking does not imply the fd is still live —
    /// the caller re-registers interest if it yields again).
    pub fn wake(&mut self, fd: RawFd) -> Option<CoroutineId> {
        if (fd as usize) >= self.slots.len() {
            return None;
        }
        self.slots[fd as usize].take()
    }

    /// Drop any waiter on `fd` without returning it, for use when a
    /// connection is closing and its fd is about to be closed too. Must be
    /// called before the fd is actually `close()`d (spec §4.10): otherwise
    /// a reused fd number could be mistaken for the old waiter.
    pub fn clear(&mut self, fd: RawFd) {
        if (fd as usize) < self.slots.len() {
            self.slots[fd as usize] = None;
        }
    }

    pub fn is_parked(&self, fd: RawFd) -> bool {
        (fd as usize) < self.slots.len() && self.slots[fd as usize].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn park_then_wake_round_trips() {
        let mut t = FdTable::new();
        t.park(3, CoroutineId(7));
        assert!(t.is_parked(3));
        assert_eq!(t.wake(3), Some(CoroutineId(7)));
        assert!(!t.is_parked(3));
    }

    #[test]
    fn wake_on_unparked_fd_is_none() {
        let mut t = FdTable::new();
        assert_eq!(t.wake(42), None);
    }

    #[test]
    #[should_panic]
    fn double_park_panics() {
        let mut t = FdTable::new();
        t.park(3, CoroutineId(1));
        t.park(3, CoroutineId(2));
    }

    #[test]
    fn clear_removes_waiter_without_returning_it() {
        let mut t = FdTable::new();
        t.park(3, CoroutineId(1));
        t.clear(3);
        assert!(!t.is_parked(3));
    }
}
