//! 17.14 fixed-point arithmetic and the multi-level feedback queue formulas.
//!
//! Grounded on `original_source/pintos/threads/thread.c`'s `FP_*` macros
//! and `mlfqs_priority`/`mlfqs_recent_cpu`/`mlfqs_load_avg`. Pintos keeps
//! these as plain `int` arithmetic with shift-based macros; here they are
//! wrapped in a newtype so the shift and rounding rule live in one place
//! instead of being repeated at every call site.

use super::config::{self, FP_ONE, FP_SHIFT, PRI_MAX};
use super::thread::{self, Tid, ThreadState};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI64, Ordering};

/// A 17.14 fixed-point value: `raw / 2^14`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fixed(pub i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub fn from_int(n: i32) -> Fixed {
        Fixed((n as i64) * FP_ONE)
    }

    /// Truncate toward zero.
    pub fn to_int_trunc(self) -> i32 {
        (self.0 / FP_ONE) as i32
    }

    /// Round to nearest, ties away from zero — Pintos's `FP_TO_INT_NEAREST`.
    pub fn to_int_nearest(self) -> i32 {
        if self.0 >= 0 {
            ((self.0 + FP_ONE / 2) / FP_ONE) as i32
        } else {
            ((self.0 - FP_ONE / 2) / FP_ONE) as i32
        }
    }

    pub fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0 + other.0)
    }

    pub fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0 - other.0)
    }

    pub fn add_int(self, n: i32) -> Fixed {
        self.add(Fixed::from_int(n))
    }

    pub fn sub_int(self, n: i32) -> Fixed {
        self.sub(Fixed::from_int(n))
    }

    pub fn mul(self, other: Fixed) -> Fixed {
        Fixed(((self.0 as i128 * other.0 as i128) >> FP_SHIFT) as i64)
    }

    pub fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n as i64)
    }

    pub fn div(self, other: Fixed) -> Fixed {
        Fixed((((self.0 as i128) << FP_SHIFT) / other.0 as i128) as i64)
    }

    pub fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n as i64)
    }
}

/// System-wide load average, 17.14 fixed point. Raw bits stored in an
/// atomic so it can be read without locking anything else.
static LOAD_AVG_RAW: AtomicI64 = AtomicI64::new(0);

pub fn load_avg() -> Fixed {
    Fixed(LOAD_AVG_RAW.load(Ordering::Relaxed))
}

fn set_load_avg(v: Fixed) {
    LOAD_AVG_RAW.store(v.0, Ordering::Relaxed);
}

/// `load_avg = (59/60) * load_avg + (1/60) * ready_threads`.
pub fn recalc_load_avg(ready_threads: usize) {
    let fifty_nine_sixtieths = Fixed::from_int(59).div_int(60);
    let one_sixtieth = Fixed::from_int(1).div_int(60);
    let next = fifty_nine_sixtieths
        .mul(load_avg())
        .add(one_sixtieth.mul_int(ready_threads as i32));
    set_load_avg(next);
}

/// `recent_cpu = (2*load_avg)/(2*load_avg+1) * recent_cpu + nice`.
pub fn recalc_recent_cpu(recent_cpu: Fixed, nice: i32) -> Fixed {
    let two_load = load_avg().mul_int(2);
    let coeff = two_load.div(two_load.add_int(1));
    coeff.mul(recent_cpu).add_int(nice)
}

/// `priority = clamp(PRI_MAX - recent_cpu/4 - nice*2)`.
pub fn recalc_priority(recent_cpu: Fixed, nice: i32) -> i32 {
    let pri = Fixed::from_int(PRI_MAX)
        .sub(recent_cpu.div_int(4))
        .sub_int(nice * 2);
    config::clamp_priority(pri.to_int_nearest())
}

/// `recent_cpu += 1` for the running thread, skipped for idle. Called once
/// per tick.
pub fn bump_running_recent_cpu(tid: Tid, idle_tid: Tid) {
    if tid == idle_tid {
        return;
    }
    thread::with_mut(tid, |t| {
        t.recent_cpu = Fixed(t.recent_cpu).add_int(1).0;
    });
}

/// Recompute `recent_cpu` (only on a whole-second boundary) and `priority`
/// (every `recalc_period` ticks) for every thread. Grounded on
/// `mlfqs_recalc_all_recent_cpu_and_priority`, which Pintos calls from the
/// timer interrupt with interrupts already disabled.
pub fn recalc_all(idle_tid: Tid, recalc_recent_cpu_too: bool) {
    let tids: Vec<Tid> = {
        let reg = thread::REGISTRY.lock();
        reg.keys().copied().collect()
    };
    for tid in tids {
        if tid == idle_tid {
            continue;
        }
        thread::with_mut(tid, |t| {
            if t.state == ThreadState::Dying {
                return;
            }
            if recalc_recent_cpu_too {
                t.recent_cpu = recalc_recent_cpu(Fixed(t.recent_cpu), t.nice).0;
            }
            t.priority = recalc_priority(Fixed(t.recent_cpu), t.nice);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_int_and_back() {
        assert_eq!(Fixed::from_int(5).to_int_trunc(), 5);
        assert_eq!(Fixed::from_int(-5).to_int_trunc(), -5);
    }

    #[test]
    fn to_int_nearest_rounds_half_away_from_zero() {
        let half = Fixed(FP_ONE / 2);
        assert_eq!(Fixed::from_int(3).add(half).to_int_nearest(), 4);
        assert_eq!(Fixed::from_int(-3).sub(half).to_int_nearest(), -4);
    }

    #[test]
    fn priority_formula_matches_default_at_zero_cpu_and_nice() {
        assert_eq!(recalc_priority(Fixed::ZERO, 0), PRI_MAX);
    }

    #[test]
    fn priority_decreases_with_recent_cpu() {
        let high_cpu = Fixed::from_int(40);
        let low = recalc_priority(high_cpu, 0);
        let high = recalc_priority(Fixed::ZERO, 0);
        assert!(low < high);
    }

    #[test]
    fn load_avg_converges_toward_ready_count_under_constant_load() {
        set_load_avg(Fixed::ZERO);
        for _ in 0..5000 {
            recalc_load_avg(1);
        }
        let got = load_avg().to_int_nearest();
        assert_eq!(got, 1);
    }
}
