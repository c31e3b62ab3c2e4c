//! The sleep list: threads blocked until a future tick.
//!
//! Grounded on `original_source/pintos/devices/timer.c`'s `sleep_list`,
//! kept sorted ascending by `wake_tick` via `sleep_less`/
//! `list_insert_ordered`, and drained from the front by `timer_interrupt`
//! each tick until the first not-yet-due entry is reached.

use super::scheduler;
use super::thread::Tid;
use alloc::vec::Vec;
use spin::Mutex;

struct Sleeper {
    tid: Tid,
    wake_tick: u64,
}

static SLEEP_LIST: Mutex<Vec<Sleeper>> = Mutex::new(Vec::new());

/// Insert the current thread into the sleep list and block it. Caller must
/// already hold interrupts disabled and be prepared to call
/// `scheduler::block_current` immediately after — mirrors `timer_sleep`,
/// which disables interrupts, records `wake_tick`, inserts into
/// `sleep_list`, then calls `thread_block`.
pub fn register_and_block(tid: Tid, wake_tick: u64) {
    let mut list = SLEEP_LIST.lock();
    let pos = list
        .iter()
        .position(|s| s.wake_tick > wake_tick)
        .unwrap_or(list.len());
    list.insert(pos, Sleeper { tid, wake_tick });
    drop(list);
    scheduler::block_current();
}

/// Called once per tick from interrupt context. Wakes every sleeper whose
/// `wake_tick` has arrived. Relies on the list being sorted ascending so it
/// can stop at the first thread not yet due.
pub fn wake_due(now: u64) {
    let mut list = SLEEP_LIST.lock();
    let mut woken = Vec::new();
    while let Some(front) = list.first() {
        if front.wake_tick > now {
            break;
        }
        woken.push(list.remove(0).tid);
    }
    drop(list);
    for tid in woken {
        scheduler::unblock(tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_list_orders_by_wake_tick_ascending() {
        let mut list = SLEEP_LIST.lock();
        list.clear();
        drop(list);

        let mut list = SLEEP_LIST.lock();
        for (tid, wake) in [(1u64, 50u64), (2, 10), (3, 30)] {
            let pos = list
                .iter()
                .position(|s| s.wake_tick > wake)
                .unwrap_or(list.len());
            list.insert(pos, Sleeper { tid, wake_tick: wake });
        }
        let order: Vec<u64> = list.iter().map(|s| s.tid).collect();
        assert_eq!(order, alloc::vec![2, 3, 1]);
        list.clear();
    }
}
