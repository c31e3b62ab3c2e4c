//! Public sleep API and the per-tick hook driven by the hardware timer.
//!
//! Grounded on `original_source/pintos/devices/timer.c`: `timer_interrupt`
//! (bump the tick count, run `thread_tick`, wake due sleepers, and — under
//! MLFQS — recompute `recent_cpu`/`load_avg`/`priority` on the documented
//! schedule, then re-sort the ready queue before checking for preemption)
//! and `timer_sleep`/`real_time_sleep` for the public sleep entry points.

use super::config;
use super::context::InterruptFrame;
use super::interrupt;
use super::mlfqs;
use super::scheduler;
use super::sleep;
use super::thread;
use crate::interrupts::TICK_COUNT;
use core::sync::atomic::Ordering;

pub fn ticks() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed)
}

pub fn elapsed(since: u64) -> u64 {
    ticks().saturating_sub(since)
}

/// Called from `timer_tick_handler` with the interrupted thread's saved
/// frame. Performs all per-tick bookkeeping, then returns either that same
/// frame (no switch needed) or a different thread's frame to resume.
pub(crate) fn tick(frame: *mut InterruptFrame) -> *mut InterruptFrame {
    interrupt::enter_external();

    let now = ticks();
    sleep::wake_due(now);

    let idle = scheduler::idle_tid();
    let current = scheduler::current_tid();

    if config::mlfqs_enabled() {
        mlfqs::bump_running_recent_cpu(current, idle);
        if now % config::TIMER_FREQ as u64 == 0 {
            mlfqs::recalc_load_avg(scheduler::ready_thread_count());
            mlfqs::recalc_all(idle, true);
            scheduler::resort_ready();
        } else if now % 4 == 0 {
            mlfqs::recalc_all(idle, false);
            scheduler::resort_ready();
        }
    }

    if scheduler::note_tick() {
        interrupt::yield_on_return();
    }
    if scheduler::highest_ready_priority() > thread::priority_of(current) {
        interrupt::yield_on_return();
    }

    if interrupt::exit_external() {
        scheduler::schedule(frame)
    } else {
        frame
    }
}

/// Block the current thread until `ticks()` reaches `wake_tick`. No-op if
/// that tick has already passed.
pub fn sleep_until(wake_tick: u64) {
    if wake_tick <= ticks() {
        return;
    }
    let old = interrupt::disable();
    sleep::register_and_block(scheduler::current_tid(), wake_tick);
    interrupt::restore(old);
}

/// Sleep for `n` timer ticks. `n <= 0` returns immediately, matching
/// `timer_sleep`'s guard.
pub fn sleep(n: i64) {
    if n <= 0 {
        return;
    }
    sleep_until(ticks() + n as u64);
}

fn real_time_sleep(num: i64, denom: i64) {
    let ticks_to_wait = (num * config::TIMER_FREQ as i64) / denom;
    if ticks_to_wait > 0 {
        sleep(ticks_to_wait);
    }
    // Sub-tick requests are rounded down to zero rather than busy-waited:
    // this kernel has no calibrated `loops_per_tick` spin loop, and a
    // rounding error of under one tick is not worth one.
}

pub fn msleep(ms: i64) {
    real_time_sleep(ms, 1000);
}

pub fn usleep(us: i64) {
    real_time_sleep(us, 1_000_000);
}

pub fn nsleep(ns: i64) {
    real_time_sleep(ns, 1_000_000_000);
}

pub fn load_avg_x100() -> i32 {
    mlfqs::load_avg().mul_int(100).to_int_nearest()
}

pub fn recent_cpu_x100(tid: thread::Tid) -> i32 {
    thread::with(tid, |t| {
        mlfqs::Fixed(t.recent_cpu).mul_int(100).to_int_nearest()
    })
    .unwrap_or(0)
}
