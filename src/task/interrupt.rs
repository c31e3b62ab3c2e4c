//! Interrupt-level bookkeeping the scheduler core depends on.
//!
//! Grounded on `original_source/pintos/threads/interrupt.c`'s
//! `intr_handler`: on entry to an external interrupt it clears a
//! "yield on return" flag and marks itself as running in external-interrupt
//! context; handlers that want a reschedule call `intr_yield_on_return`
//! instead of yielding directly (a real context switch cannot run on an
//! interrupt's borrowed stack); at the tail, after EOI, the dispatcher
//! checks the flag and performs the actual reschedule synchronously, still
//! with interrupts disabled.
//!
//! The x86_64 gate itself (`cli`/`sti`, `pushfq`/`popfq`) is the teacher's
//! `x86_64::instructions::interrupts` idiom, used the same way
//! `serial.rs`'s `_print` already does to keep the serial port critical
//! section atomic.

use core::sync::atomic::{AtomicBool, Ordering};
use x86_64::instructions::interrupts as hw;

static IN_EXTERNAL_INTR: AtomicBool = AtomicBool::new(false);
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// True while a hardware interrupt handler is running. Distinguishes a
/// nested-preemption reschedule (frame-swap-on-return) from a thread's own
/// voluntary yield (synchronous switch).
pub fn in_interrupt() -> bool {
    IN_EXTERNAL_INTR.load(Ordering::Acquire)
}

/// Called by the timer ISR before running any scheduler hooks.
pub(crate) fn enter_external() {
    IN_EXTERNAL_INTR.store(true, Ordering::Release);
    YIELD_ON_RETURN.store(false, Ordering::Release);
}

/// Called by the timer ISR after EOI. Returns whether the caller should
/// swap in a different thread's frame before `iretq`.
pub(crate) fn exit_external() -> bool {
    IN_EXTERNAL_INTR.store(false, Ordering::Release);
    YIELD_ON_RETURN.swap(false, Ordering::AcqRel)
}

/// Request a reschedule at the tail of the current interrupt. Panics if
/// called outside interrupt context — callers running normally should
/// reach for `task::scheduler::yield_now` instead.
pub fn yield_on_return() {
    debug_assert!(in_interrupt(), "yield_on_return outside interrupt context");
    YIELD_ON_RETURN.store(true, Ordering::Release);
}

/// Disable maskable interrupts, returning the previous level so it can be
/// restored exactly. Mirrors Pintos's `intr_disable`/`intr_set_level` pair.
pub fn disable() -> bool {
    let was_enabled = hw::are_enabled();
    hw::disable();
    was_enabled
}

pub fn enable() {
    hw::enable();
}

pub fn are_enabled() -> bool {
    hw::are_enabled()
}

/// Restore a level previously returned by [`disable`].
pub fn restore(was_enabled: bool) {
    if was_enabled {
        hw::enable();
    }
}

/// Run `f` with interrupts disabled, restoring the prior level afterward
/// regardless of how `f` returns. The fundamental mutual-exclusion
/// primitive every lock-free structure in `task` is built on.
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    hw::without_interrupts(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yield_flag_round_trips() {
        enter_external();
        assert!(in_interrupt());
        yield_on_return();
        let should_switch = exit_external();
        assert!(should_switch);
        assert!(!in_interrupt());
    }

    #[test]
    fn yield_flag_resets_on_entry() {
        enter_external();
        yield_on_return();
        exit_external();
        enter_external();
        assert!(!exit_external());
    }
}
