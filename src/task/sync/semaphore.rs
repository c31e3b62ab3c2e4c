//! Counting semaphore with a priority-ordered wait list.
//!
//! Grounded on `original_source/pintos/threads/synch.c`'s `sema_down` (loop
//! while the value is zero, block on the waiters list, re-check on wake —
//! the re-check guards against the value having been taken by someone else
//! between wake and resume) and `sema_up` (sort waiters by priority before
//! popping, since a waiter's priority may have changed while it slept, then
//! unblock the front one).

use crate::task::interrupt;
use crate::task::scheduler;
use crate::task::thread::{self, Tid};
use alloc::vec::Vec;
use spin::Mutex;

struct Inner {
    value: usize,
    waiters: Vec<Tid>,
}

pub struct Semaphore {
    inner: Mutex<Inner>,
}

impl Semaphore {
    pub const fn new(value: usize) -> Semaphore {
        Semaphore {
            inner: Mutex::new(Inner {
                value,
                waiters: Vec::new(),
            }),
        }
    }

    pub fn value(&self) -> usize {
        self.inner.lock().value
    }

    /// Block until the count is positive, then decrement it.
    pub fn down(&self) {
        loop {
            let old = interrupt::disable();
            {
                let mut inner = self.inner.lock();
                if inner.value > 0 {
                    inner.value -= 1;
                    interrupt::restore(old);
                    return;
                }
                let tid = scheduler::current_tid();
                let pos = inner
                    .waiters
                    .iter()
                    .position(|&o| thread::compare_priority(tid, o) == core::cmp::Ordering::Less)
                    .unwrap_or(inner.waiters.len());
                inner.waiters.insert(pos, tid);
            }
            scheduler::block_current();
            interrupt::restore(old);
        }
    }

    /// Decrement without blocking if the count is already positive.
    /// Returns whether it succeeded.
    pub fn try_down(&self) -> bool {
        let old = interrupt::disable();
        let mut inner = self.inner.lock();
        let got = if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        };
        drop(inner);
        interrupt::restore(old);
        got
    }

    /// Increment the count, waking the highest-priority waiter if any.
    pub fn up(&self) {
        let old = interrupt::disable();
        let woken = {
            let mut inner = self.inner.lock();
            inner.value += 1;
            if inner.waiters.is_empty() {
                None
            } else {
                inner.waiters.sort_by(|&a, &b| thread::compare_priority(a, b));
                Some(inner.waiters.remove(0))
            }
        };
        if let Some(tid) = woken {
            scheduler::unblock(tid);
        }
        interrupt::restore(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_down_respects_value() {
        let sem = Semaphore::new(1);
        assert!(sem.try_down());
        assert!(!sem.try_down());
        sem.up();
        assert!(sem.try_down());
    }

    #[test]
    fn up_restores_value() {
        let sem = Semaphore::new(0);
        assert_eq!(sem.value(), 0);
        sem.up();
        assert_eq!(sem.value(), 1);
    }
}
