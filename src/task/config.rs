//! Boot-time constants and the fixed-priority/MLFQS policy switch.
//!
//! Grounded on `original_source/pintos/include/threads/thread.h` for the
//! constant values and on the teacher's `SCHEDULER_ENABLED: AtomicBool`
//! boot-once-flag idiom (`task::scheduler`) for how a policy choice made at
//! `task::init` time is read lock-free afterwards.

use core::sync::atomic::{AtomicBool, Ordering};

/// Lowest legal thread priority.
pub const PRI_MIN: i32 = 0;
/// Priority assigned to a thread that does not request one explicitly.
pub const PRI_DEFAULT: i32 = 31;
/// Highest legal thread priority.
pub const PRI_MAX: i32 = 63;

/// Ticks granted to a running thread before it is forced to yield to a
/// thread of equal priority.
pub const TIME_SLICE: u64 = 4;

/// Maximum hop count the donation-chain walk will follow before giving up
/// (cycle/abuse guard).
pub const DONATION_DEPTH_LIMIT: u32 = 8;

pub const NICE_MIN: i32 = -20;
pub const NICE_MAX: i32 = 20;

/// 17.14 fixed-point radix, `2^14`.
pub const FP_SHIFT: i32 = 14;
pub const FP_ONE: i64 = 1 << FP_SHIFT;

/// Timer interrupt frequency in Hz. Must stay within `[19, 1000]` — the
/// 8254 PIT cannot reliably fire faster, and anything slower than 19 Hz
/// makes `TIME_SLICE`-based preemption meaningless.
pub const TIMER_FREQ: u32 = 100;

const _: () = assert!(TIMER_FREQ >= 19 && TIMER_FREQ <= 1000);

/// Which priority policy governs `priority` recomputation:
/// fixed-priority-with-donation (the default) or MLFQS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPolicy {
    FixedPriority,
    Mlfqs,
}

/// `false` once set, unless `-mlfqs` was passed at boot. Mirrors the
/// teacher's `SCHEDULER_ENABLED` flag: written once during `task::init`,
/// read from every hot path afterwards without locking.
static MLFQS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Select the scheduler policy for the remainder of the boot session. Must
/// be called at most once, before any thread is created.
pub fn set_policy(policy: SchedulerPolicy) {
    MLFQS_ENABLED.store(policy == SchedulerPolicy::Mlfqs, Ordering::Release);
}

pub fn policy() -> SchedulerPolicy {
    if MLFQS_ENABLED.load(Ordering::Acquire) {
        SchedulerPolicy::Mlfqs
    } else {
        SchedulerPolicy::FixedPriority
    }
}

pub fn mlfqs_enabled() -> bool {
    MLFQS_ENABLED.load(Ordering::Acquire)
}

pub fn clamp_priority(p: i32) -> i32 {
    p.clamp(PRI_MIN, PRI_MAX)
}

pub fn clamp_nice(n: i32) -> i32 {
    n.clamp(NICE_MIN, NICE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_to_fixed_priority() {
        assert_eq!(policy(), SchedulerPolicy::FixedPriority);
    }

    #[test]
    fn clamp_priority_saturates() {
        assert_eq!(clamp_priority(-5), PRI_MIN);
        assert_eq!(clamp_priority(1000), PRI_MAX);
        assert_eq!(clamp_priority(40), 40);
    }
}
