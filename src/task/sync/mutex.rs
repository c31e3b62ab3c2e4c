//! A lock with priority donation.
//!
//! Grounded on `original_source/pintos/threads/synch.c`'s `lock_acquire`
//! (record `wait_on_lock`, walk the donation chain, block on the
//! underlying semaphore, then clear `wait_on_lock` and remember the lock
//! as held) and `lock_release` (clear the holder, drop any donations tied
//! to this lock, recompute this thread's own priority, then wake a
//! waiter). Donation itself lives in [`crate::task::thread`] and the chain
//! walk in this module's `donate_priority_chain`, a direct port of
//! `thread.c`'s function of the same name.

use super::semaphore::Semaphore;
use crate::task::config::{self, DONATION_DEPTH_LIMIT};
use crate::task::interrupt;
use crate::task::scheduler;
use crate::task::thread::{self, Donation, Tid};
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicUsize, Ordering};

static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(1);

/// Locks aren't addressable from a donation chain walk by reference (a
/// blocked thread only remembers a lock id in `wait_on_lock`), so every
/// live `Mutex` registers its current holder here for the duration between
/// `acquire` and `release`.
static HOLDER_TABLE: spin::Mutex<BTreeMap<u64, Tid>> = spin::Mutex::new(BTreeMap::new());

pub struct Mutex {
    id: u64,
    sema: Semaphore,
}

impl Mutex {
    pub fn new() -> Mutex {
        Mutex {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed) as u64,
            sema: Semaphore::new(1),
        }
    }

    pub fn is_held_by_current(&self) -> bool {
        HOLDER_TABLE.lock().get(&self.id).copied() == Some(scheduler::current_tid())
    }

    fn holder(&self) -> Option<Tid> {
        HOLDER_TABLE.lock().get(&self.id).copied()
    }

    pub fn acquire(&self) {
        let cur = scheduler::current_tid();

        if !config::mlfqs_enabled() {
            if let Some(holder) = self.holder() {
                if holder != cur {
                    thread::with_mut(cur, |t| t.wait_on_lock = Some(self.id));
                    donate_priority_chain(holder);
                }
            }
        }

        self.sema.down();

        if !config::mlfqs_enabled() {
            thread::with_mut(cur, |t| {
                t.wait_on_lock = None;
                t.held_locks.push(self.id);
            });
        }
        HOLDER_TABLE.lock().insert(self.id, cur);
    }

    pub fn try_acquire(&self) -> bool {
        if self.sema.try_down() {
            let cur = scheduler::current_tid();
            HOLDER_TABLE.lock().insert(self.id, cur);
            if !config::mlfqs_enabled() {
                thread::with_mut(cur, |t| t.held_locks.push(self.id));
            }
            true
        } else {
            false
        }
    }

    pub fn release(&self) {
        debug_assert!(self.is_held_by_current());
        HOLDER_TABLE.lock().remove(&self.id);

        if !config::mlfqs_enabled() {
            let cur = scheduler::current_tid();
            let lock_id = self.id;
            thread::with_mut(cur, |t| {
                t.held_locks.retain(|&l| l != lock_id);
                t.donations.retain(|d| {
                    thread::with(d.donor, |donor| donor.wait_on_lock != Some(lock_id))
                        .unwrap_or(true)
                });
                t.refresh_priority();
            });
            scheduler::reposition_ready(cur);
        }

        self.sema.up();
    }
}

/// Walk from the current thread up the chain of lock holders, lending
/// priority at each hop, up to `DONATION_DEPTH_LIMIT` hops. Ported from
/// `thread.c`'s `donate_priority_chain`.
fn donate_priority_chain(mut donee: Tid) {
    let old = interrupt::disable();
    let mut donor = scheduler::current_tid();

    for _ in 0..DONATION_DEPTH_LIMIT {
        let donated_pri = thread::priority_of(donor);

        let next_wait = thread::with_mut(donee, |t| {
            t.donations.retain(|d| d.donor != donor);
            let pos = t
                .donations
                .iter()
                .position(|d| d.priority < donated_pri)
                .unwrap_or(t.donations.len());
            t.donations.insert(
                pos,
                Donation {
                    donor,
                    priority: donated_pri,
                },
            );
            t.refresh_priority();
            t.wait_on_lock
        });
        scheduler::reposition_ready(donee);

        let next_lock_id = match next_wait {
            Some(Some(id)) => id,
            _ => break,
        };

        let next_holder = HOLDER_TABLE.lock().get(&next_lock_id).copied();
        match next_holder {
            Some(h) if h != donee => {
                donor = donee;
                donee = h;
            }
            _ => break,
        }
    }
    interrupt::restore(old);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_is_exclusive() {
        let m = Mutex::new();
        assert!(m.try_acquire());
        assert!(!m.try_acquire());
        m.release();
        assert!(m.try_acquire());
    }
}
