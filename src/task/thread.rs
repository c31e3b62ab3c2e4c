//! Thread descriptors and the global registry that owns them.
//!
//! Grounded on `original_source/pintos/include/threads/thread.h`'s
//! `struct thread` (the field list below is a direct port: `priority`,
//! `base_priority`, `nice`, `recent_cpu`, `wait_on_lock`, `donations`,
//! `held_locks`, `magic`) and on the teacher's `ProcessTable`
//! (`task::process::ProcessTable` in the original tree) for the
//! "single global `Mutex<BTreeMap<Id, Box<T>>>` registry, callers look
//! threads up by id rather than hold references into the queues" idiom —
//! the same shape that let the teacher's process table be mutated safely
//! from both the scheduler and exception handlers.

use crate::task::config;
use crate::task::context::InterruptFrame;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

pub type Tid = u64;

/// Canary written to the lowest word of every thread's stack allocation.
/// If this is ever found clobbered the thread overran its stack.
pub const STACK_CANARY: u64 = 0xcd6a_bf4b_0000_dead;

pub const STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    /// Blocked on a semaphore/lock/condvar wait list, or asleep (woken by
    /// `task::sleep`, not by this enum carrying the wake time itself).
    Blocked,
    Dying,
}

/// One donation record: another thread is waiting on a resource this
/// thread holds, and has lent it `priority` until the resource is freed.
#[derive(Debug, Clone, Copy)]
pub struct Donation {
    pub donor: Tid,
    pub priority: i32,
}

pub struct Thread {
    pub tid: Tid,
    pub name: String,
    pub state: ThreadState,

    /// Effective priority: `base_priority` unless raised by a donation.
    pub priority: i32,
    pub base_priority: i32,

    pub nice: i32,
    /// 17.14 fixed-point, see `task::mlfqs`.
    pub recent_cpu: i64,

    /// Lock id this thread is blocked waiting to acquire, if any. Set just
    /// before donating and just before blocking; cleared on acquire.
    pub wait_on_lock: Option<u64>,
    /// Donations received from threads blocked on locks this thread holds,
    /// ordered by descending donor priority.
    pub donations: Vec<Donation>,
    /// Lock ids currently held, used to drop donations tied to a lock on
    /// release.
    pub held_locks: Vec<u64>,

    /// Monotonic order this thread entered the ready queue, used to break
    /// priority ties FIFO (teacher's `VecDeque` push-back order made this
    /// implicit; an explicit sequence number reproduces it now that the
    /// queue is priority-ordered).
    pub sequence: u64,

    /// Remaining stack allocation. The live stack pointer while the thread
    /// is not running lives in `frame`, which points somewhere inside this
    /// buffer.
    pub stack: Box<[u8]>,
    pub frame: *mut InterruptFrame,
}

unsafe impl Send for Thread {}

impl Thread {
    pub fn check_canary(&self) -> bool {
        let word = u64::from_ne_bytes(self.stack[0..8].try_into().unwrap());
        word == STACK_CANARY
    }

    /// Recompute `priority` from `base_priority` and current donations.
    /// Grounded on `thread.c`'s `refresh_priority`.
    pub fn refresh_priority(&mut self) {
        self.priority = self.base_priority;
        if let Some(top) = self.donations.iter().map(|d| d.priority).max() {
            if top > self.priority {
                self.priority = top;
            }
        }
    }
}

static NEXT_TID: AtomicU64 = AtomicU64::new(1);
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn alloc_tid() -> Tid {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}

pub fn next_sequence() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

pub static REGISTRY: Mutex<BTreeMap<Tid, Box<Thread>>> = Mutex::new(BTreeMap::new());

pub fn insert(thread: Box<Thread>) {
    REGISTRY.lock().insert(thread.tid, thread);
}

pub fn remove(tid: Tid) -> Option<Box<Thread>> {
    REGISTRY.lock().remove(&tid)
}

pub fn with<R>(tid: Tid, f: impl FnOnce(&Thread) -> R) -> Option<R> {
    REGISTRY.lock().get(&tid).map(|t| f(t))
}

pub fn with_mut<R>(tid: Tid, f: impl FnOnce(&mut Thread) -> R) -> Option<R> {
    REGISTRY.lock().get_mut(&tid).map(|t| f(t))
}

pub fn priority_of(tid: Tid) -> i32 {
    with(tid, |t| t.priority).unwrap_or(config::PRI_MIN)
}

/// Descending-priority, then ascending-sequence comparator: the ordering
/// every ready/wait queue in `task` is kept sorted by. Ported from
/// `thread.c`'s `compare_thread_priority`, generalized to take ids instead
/// of list elements since threads here live in the registry, not inline in
/// the queue.
pub fn compare_priority(a: Tid, b: Tid) -> core::cmp::Ordering {
    let (pa, sa) = with(a, |t| (t.priority, t.sequence)).unwrap_or((config::PRI_MIN, 0));
    let (pb, sb) = with(b, |t| (t.priority, t.sequence)).unwrap_or((config::PRI_MIN, 0));
    pb.cmp(&pa).then(sa.cmp(&sb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(tid: Tid, priority: i32) -> Box<Thread> {
        Box::new(Thread {
            tid,
            name: String::from("t"),
            state: ThreadState::Ready,
            priority,
            base_priority: priority,
            nice: 0,
            recent_cpu: 0,
            wait_on_lock: None,
            donations: Vec::new(),
            held_locks: Vec::new(),
            sequence: next_sequence(),
            stack: alloc::vec![0u8; 8].into_boxed_slice(),
            frame: core::ptr::null_mut(),
        })
    }

    #[test]
    fn refresh_priority_falls_back_to_base() {
        let mut t = make(1, 10);
        t.donations.push(Donation {
            donor: 2,
            priority: 30,
        });
        t.refresh_priority();
        assert_eq!(t.priority, 30);
        t.donations.clear();
        t.refresh_priority();
        assert_eq!(t.priority, 10);
    }

    #[test]
    fn refresh_priority_ignores_lower_donation() {
        let mut t = make(1, 40);
        t.donations.push(Donation {
            donor: 2,
            priority: 20,
        });
        t.refresh_priority();
        assert_eq!(t.priority, 40);
    }

    #[test]
    fn compare_priority_orders_descending_then_fifo() {
        insert(make(10, 5));
        insert(make(11, 5));
        with_mut(10, |t| t.sequence = 1).unwrap();
        with_mut(11, |t| t.sequence = 2).unwrap();
        insert(make(12, 9));
        assert_eq!(compare_priority(12, 10), core::cmp::Ordering::Less);
        assert_eq!(compare_priority(10, 11), core::cmp::Ordering::Less);
        remove(10);
        remove(11);
        remove(12);
    }
}
