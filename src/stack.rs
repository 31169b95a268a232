//! Guarded, fixed-size coroutine stacks, pooled for reuse.
//!
//! Grounded in `stack/stack_pool.rs` upstream: a size-indexed free list that
//! falls back to a fresh allocation on a cache miss. The stack type itself
//! comes from the `context` crate (`ProtectedFixedSizeStack`) rather than
//! the teacher's own mmap-backed `Stack`, since that crate already supplies
//! a guard page at the right end for the platform.

use context::stack::{ProtectedFixedSizeStack, Stack};

use crate::error::Error;

/// Per-worker cache of unused stacks, keyed loosely by size.
///
/// Not thread-safe by design: one `StackPool` lives inside one `Worker`,
/// touched only from that worker's OS thread (spec §5).
#[derive(Default)]
pub struct StackPool {
    stacks: Vec<ProtectedFixedSizeStack>,
}

/// Bound how many idle stacks a worker keeps around before freeing them
/// back to the OS. 64 KiB * 64 = 4 MiB of idle-stack cache per worker.
const MAX_CACHED_STACKS: usize = 64;

impl StackPool {
    pub fn new() -> StackPool {
        StackPool { stacks: Vec::new() }
    }

    pub fn take(&mut self, size: usize) -> Result<ProtectedFixedSizeStack, Error> {
        if let Some(idx) = self.stacks.iter().position(|s| s.len() >= size) {
            return Ok(self.stacks.swap_remove(idx));
        }
        ProtectedFixedSizeStack::new(size).map_err(|_| Error::ResourceExhausted)
    }

    pub fn give(&mut self, stack: ProtectedFixedSizeStack) {
        if self.stacks.len() < MAX_CACHED_STACKS {
            self.stacks.push(stack);
        }
    }
}
