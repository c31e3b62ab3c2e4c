//! Condition variable, waited on while holding a [`Mutex`].
//!
//! Grounded on `original_source/pintos/threads/synch.c`'s `cond_wait`
//! (park on a fresh per-waiter semaphore recorded with the waiter's
//! priority, release the lock, block, then reacquire on wake) and
//! `cond_signal`/`cond_broadcast` (sort waiters by priority before waking
//! the front one, so a broadcast wakes in priority order too).

use super::mutex::Mutex;
use super::semaphore::Semaphore;
use crate::task::scheduler;
use crate::task::thread;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex as SpinMutex;

struct Waiter {
    sema: Arc<Semaphore>,
    priority: i32,
}

pub struct CondVar {
    waiters: SpinMutex<Vec<Waiter>>,
}

impl CondVar {
    pub const fn new() -> CondVar {
        CondVar {
            waiters: SpinMutex::new(Vec::new()),
        }
    }

    /// `lock` must be held by the caller. Released while parked, and
    /// reacquired before returning.
    pub fn wait(&self, lock: &Mutex) {
        debug_assert!(lock.is_held_by_current());

        let priority = thread::priority_of(scheduler::current_tid());
        let sema = Arc::new(Semaphore::new(0));
        self.waiters.lock().push(Waiter {
            sema: sema.clone(),
            priority,
        });

        lock.release();
        sema.down();
        lock.acquire();
    }

    pub fn signal(&self, lock: &Mutex) {
        debug_assert!(lock.is_held_by_current());
        let mut waiters = self.waiters.lock();
        if waiters.is_empty() {
            return;
        }
        let top_priority = waiters.iter().map(|w| w.priority).max().unwrap();
        let pos = waiters
            .iter()
            .position(|w| w.priority == top_priority)
            .unwrap();
        let woken = waiters.remove(pos);
        drop(waiters);
        woken.sema.up();
    }

    pub fn broadcast(&self, lock: &Mutex) {
        while !self.waiters.lock().is_empty() {
            self.signal(lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_on_empty_waiters_is_a_no_op() {
        let lock = Mutex::new();
        lock.acquire();
        let cv = CondVar::new();
        cv.signal(&lock);
        lock.release();
    }
}
