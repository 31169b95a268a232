//! C2 — the ready queue (spec §3, §4.2).
//!
//! A `Worker` keeps exactly one ready queue, LIFO or FIFO, fixed for the
//! worker's whole lifetime by `Config::policy`. LIFO favors whichever
//! coroutine just yielded (cache-hot), FIFO is fair under load; either is a
//! thin wrapper over `VecDeque` rather than the teacher's chase-lev
//! work-stealing deque, since nothing here crosses threads (spec §5).

use std::collections::VecDeque;

use crate::coroutine::CoroutineId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Policy {
    Lifo,
    Fifo,
}

pub struct ReadyQueue {
    policy: Policy,
    queue: VecDeque<CoroutineId>,
}

impl ReadyQueue {
    pub fn new(policy: Policy) -> ReadyQueue {
        ReadyQueue { policy, queue: VecDeque::new() }
    }

    pub fn push(&mut self, id: CoroutineId) {
        match self.policy {
            Policy::Lifo => self.queue.push_front(id),
            Policy::Fifo => self.queue.push_back(id),
        }
    }

    pub fn pop(&mut self) -> Option<CoroutineId> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
