//! Preemptive kernel threading and synchronization core.
//!
//! Everything under this module is written to compile and run as an
//! ordinary `std` crate under `cargo test` as well as a true `no_std`
//! kernel binary: the scheduling algorithms, the donation chain walk, the
//! MLFQS formulas, and the sleep list are plain data-structure code with
//! no dependency on being on bare metal, so they get unit-tested directly
//! on the host. Only [`context`]'s raw assembly stubs and the
//! `x86_64::instructions` calls in [`interrupt`] require the real target
//! and are not exercised that way.

pub mod config;
pub mod context;
pub mod interrupt;
pub mod mlfqs;
pub mod scheduler;
pub mod sleep;
pub mod sync;
pub mod thread;
pub mod timer;

pub use thread::Tid;

/// Bring up the threading core. Must run after the heap is initialized
/// (thread stacks are heap-allocated) and before the PIT/PIC start firing.
pub fn init(policy: config::SchedulerPolicy) {
    config::set_policy(policy);
    scheduler::init();
}

/// Spawn a new kernel thread at the given priority. Under MLFQS, the
/// initial priority is derived from `nice`/`recent_cpu` instead and this
/// value is only used as the starting `base_priority` before the first
/// recalculation.
pub fn spawn(name: &str, priority: i32, entry: extern "C" fn(usize), arg: usize) -> Tid {
    scheduler::spawn(name, priority, entry, arg)
}

pub fn current() -> Tid {
    scheduler::current_tid()
}

pub fn yield_now() {
    scheduler::yield_now()
}

pub fn priority(tid: Tid) -> i32 {
    thread::priority_of(tid)
}

/// Set the current thread's base priority, donating back down if the
/// resulting priority no longer outranks the head of the ready queue.
/// No-op under MLFQS, where priority is derived, not set directly.
pub fn set_priority(priority: i32) {
    if config::mlfqs_enabled() {
        return;
    }
    let priority = config::clamp_priority(priority);
    let cur = scheduler::current_tid();
    thread::with_mut(cur, |t| {
        t.base_priority = priority;
        t.refresh_priority();
    });
    if scheduler::highest_ready_priority() > thread::priority_of(cur) {
        scheduler::yield_now();
    }
}

pub fn set_nice(nice: i32) {
    let nice = config::clamp_nice(nice);
    let cur = scheduler::current_tid();
    let new_priority = thread::with_mut(cur, |t| {
        t.nice = nice;
        if config::mlfqs_enabled() {
            t.priority = mlfqs::recalc_priority(mlfqs::Fixed(t.recent_cpu), t.nice);
        }
        t.priority
    });
    if let Some(p) = new_priority {
        if scheduler::highest_ready_priority() > p {
            scheduler::yield_now();
        }
    }
}

pub fn nice() -> i32 {
    thread::with(scheduler::current_tid(), |t| t.nice).unwrap_or(0)
}

pub fn load_avg_x100() -> i32 {
    timer::load_avg_x100()
}

pub fn recent_cpu_x100() -> i32 {
    timer::recent_cpu_x100(scheduler::current_tid())
}
