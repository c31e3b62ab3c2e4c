//! The ready queue and the core `schedule()` dispatch loop.
//!
//! Grounded on `original_source/pintos/threads/thread.c`: `next_thread_to_run`
//! (pop the highest-priority ready thread, or run idle), `schedule` (the
//! lazy stack-deallocation-on-next-switch trick for a thread that exited),
//! and `thread_create`'s "yield immediately if the new thread outranks the
//! caller" check. The priority-ordered insert-on-push replaces the
//! teacher's plain `VecDeque::push_back` ready queue (the prior
//! `Scheduler` type in the copied tree) with a list kept sorted by
//! [`crate::task::thread::compare_priority`] the way `list_insert_ordered`
//! keeps Pintos's `ready_list` sorted.

use super::config;
use super::context::{self, InterruptFrame, RFLAGS_IF};
use super::interrupt;
use super::thread::{self, Thread, ThreadState, Tid};
use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{Mutex, Once};

static READY_QUEUE: Mutex<Vec<Tid>> = Mutex::new(Vec::new());
static DESTRUCTION_REQ: Mutex<Vec<Tid>> = Mutex::new(Vec::new());
static CURRENT: AtomicU64 = AtomicU64::new(0);
static IDLE_TID: Once<Tid> = Once::new();
static SLICE_TICKS: AtomicU64 = AtomicU64::new(0);

extern "C" fn idle_entry(_arg: usize) {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Bring up the scheduler: create the idle thread and make it current.
/// Must run once, after `task::thread`'s registry is usable and before any
/// interrupt can fire.
pub fn init() {
    let idle = new_thread("idle", config::PRI_MIN, idle_entry, 0);
    let tid = idle.tid;
    thread::insert(idle);
    IDLE_TID.call_once(|| tid);
    CURRENT.store(tid, Ordering::Release);
    thread::with_mut(tid, |t| t.state = ThreadState::Running);
}

pub fn current_tid() -> Tid {
    CURRENT.load(Ordering::Acquire)
}

pub fn idle_tid() -> Tid {
    *IDLE_TID.get().expect("scheduler::init not called")
}

/// Ready threads plus one for whichever thread is currently running,
/// unless that thread is idle — the `ready_threads` term in the load
/// average formula. Grounded on `get_ready_threads_count`.
pub fn ready_thread_count() -> usize {
    let ready = READY_QUEUE.lock().len();
    if current_tid() == idle_tid() {
        ready
    } else {
        ready + 1
    }
}

/// Bump the current thread's time-slice counter. Returns `true` once it
/// has run for `task::config::TIME_SLICE` ticks without yielding, the
/// signal to request a preemption. Reset whenever `schedule_core` actually
/// switches threads.
pub fn note_tick() -> bool {
    SLICE_TICKS.fetch_add(1, Ordering::Relaxed) + 1 >= config::TIME_SLICE
}

fn build_initial_frame(
    stack: &mut [u8],
    entry: extern "C" fn(usize),
    arg: usize,
) -> *mut InterruptFrame {
    let top = stack.as_mut_ptr() as usize + stack.len();
    let frame_addr = (top - core::mem::size_of::<InterruptFrame>()) & !0xf;
    let frame = frame_addr as *mut InterruptFrame;

    let cs: u64;
    let ss: u64;
    unsafe {
        core::arch::asm!("mov {0:x}, cs", out(reg) cs, options(nomem, nostack));
        core::arch::asm!("mov {0:x}, ss", out(reg) ss, options(nomem, nostack));
    }

    unsafe {
        (*frame) = InterruptFrame {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: entry as usize as u64,
            rsi: arg as u64,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            rip: context::thread_entry_trampoline as usize as u64,
            cs,
            rflags: RFLAGS_IF,
            rsp: frame_addr as u64,
            ss,
        };
    }
    frame
}

fn new_thread(name: &str, priority: i32, entry: extern "C" fn(usize), arg: usize) -> Box<Thread> {
    let tid = thread::alloc_tid();
    let mut stack = alloc::vec![0u8; thread::STACK_SIZE].into_boxed_slice();
    stack[0..8].copy_from_slice(&thread::STACK_CANARY.to_ne_bytes());
    let frame = build_initial_frame(&mut stack, entry, arg);

    Box::new(Thread {
        tid,
        name: name.to_string(),
        state: ThreadState::Ready,
        priority: config::clamp_priority(priority),
        base_priority: config::clamp_priority(priority),
        nice: 0,
        recent_cpu: 0,
        wait_on_lock: None,
        donations: Vec::new(),
        held_locks: Vec::new(),
        sequence: thread::next_sequence(),
        stack,
        frame,
    })
}

fn ready_insert(tid: Tid) {
    let mut q = READY_QUEUE.lock();
    let pos = q
        .iter()
        .position(|&other| thread::compare_priority(tid, other) == core::cmp::Ordering::Less)
        .unwrap_or(q.len());
    q.insert(pos, tid);
}

/// Re-sort a thread's slot in the ready queue after its priority changed
/// while it was sitting there (e.g. a donation raised the priority of a
/// thread that was preempted before it could acquire the lock it now
/// holds). No-op if `tid` isn't currently in the ready queue. Grounded on
/// `thread.c`'s `list_insert_ordered` being re-run by `donate_priority`
/// against a list element that's already linked in.
pub fn reposition_ready(tid: Tid) {
    let mut q = READY_QUEUE.lock();
    if let Some(idx) = q.iter().position(|&t| t == tid) {
        q.remove(idx);
    } else {
        return;
    }
    drop(q);
    ready_insert(tid);
}

fn ready_pop_highest() -> Option<Tid> {
    let mut q = READY_QUEUE.lock();
    if q.is_empty() {
        None
    } else {
        Some(q.remove(0))
    }
}

/// Re-sort the entire ready queue by current priority. Needed after an
/// MLFQS recomputation pass rewrites every ready thread's `priority` in
/// place without touching queue order. Grounded on `thread.c`'s
/// `recalc_all_recent_cpu_and_priority` re-running `list_sort` against
/// `ready_list` once every thread's priority has been updated.
pub fn resort_ready() {
    READY_QUEUE.lock().sort_by(|&a, &b| thread::compare_priority(a, b));
}

/// Highest priority currently waiting in the ready queue, or `PRI_MIN` if
/// empty. Used by callers deciding whether to preempt immediately.
pub fn highest_ready_priority() -> i32 {
    READY_QUEUE
        .lock()
        .first()
        .map(|&tid| thread::priority_of(tid))
        .unwrap_or(config::PRI_MIN)
}

/// Spawn a new thread at `priority`. Preempts the caller immediately if the
/// new thread outranks it, mirroring `thread_create`.
pub fn spawn(name: &str, priority: i32, entry: extern "C" fn(usize), arg: usize) -> Tid {
    let old = interrupt::disable();
    let t = new_thread(name, priority, entry, arg);
    let tid = t.tid;
    thread::insert(t);
    ready_insert(tid);

    let cur = current_tid();
    if priority > thread::priority_of(cur) && !interrupt::in_interrupt() {
        yield_now_locked();
    }
    interrupt::restore(old);
    tid
}

fn drain_destruction_queue() {
    let finished: Vec<Tid> = DESTRUCTION_REQ.lock().drain(..).collect();
    for tid in finished {
        thread::remove(tid);
    }
}

/// The mechanical half of a context switch: called from either ISR stub
/// with the currently-running thread's just-saved frame. Requeues or
/// retires the outgoing thread based on the state it was already put into,
/// picks the next thread to run, and returns the frame to resume into.
#[no_mangle]
extern "C" fn schedule_core(outgoing_frame: *mut InterruptFrame) -> *mut InterruptFrame {
    drain_destruction_queue();

    let cur = current_tid();
    thread::with_mut(cur, |t| {
        t.frame = outgoing_frame;
        debug_assert!(t.check_canary(), "thread {} stack overflow", t.tid);
    });

    match thread::with(cur, |t| t.state) {
        Some(ThreadState::Ready) => ready_insert(cur),
        Some(ThreadState::Dying) => DESTRUCTION_REQ.lock().push(cur),
        _ => {}
    }

    let next = ready_pop_highest().unwrap_or_else(idle_tid);
    thread::with_mut(next, |t| t.state = ThreadState::Running);
    CURRENT.store(next, Ordering::Release);
    SLICE_TICKS.store(0, Ordering::Relaxed);

    thread::with(next, |t| t.frame).unwrap_or(outgoing_frame)
}

/// Entry point for the hardware timer's frame-swap-on-return path. Only
/// called once `task::timer::tick` has decided a switch is warranted.
pub(crate) fn schedule(outgoing_frame: *mut InterruptFrame) -> *mut InterruptFrame {
    schedule_core(outgoing_frame)
}

#[no_mangle]
extern "C" fn yield_isr_handler(frame: *mut InterruptFrame) -> *mut InterruptFrame {
    schedule_core(frame)
}

fn yield_now_locked() {
    thread::with_mut(current_tid(), |t| t.state = ThreadState::Ready);
    context::trap_yield();
}

/// Voluntary yield: give up the CPU, remaining Ready. Equivalent to
/// `thread_yield` when called outside interrupt context.
pub fn yield_now() {
    let old = interrupt::disable();
    yield_now_locked();
    interrupt::restore(old);
}

/// Block the current thread. Caller must already have inserted its tid
/// into whatever wait structure it is waiting on, with interrupts
/// disabled, before calling this.
pub fn block_current() {
    thread::with_mut(current_tid(), |t| t.state = ThreadState::Blocked);
    context::trap_yield();
}

/// Move a blocked thread back onto the ready queue. If called from
/// interrupt context, defers the actual preemption via
/// `interrupt::yield_on_return`; otherwise yields immediately if the
/// unblocked thread now outranks the caller. Mirrors `thread_unblock`.
pub fn unblock(tid: Tid) {
    thread::with_mut(tid, |t| t.state = ThreadState::Ready);
    ready_insert(tid);

    if interrupt::in_interrupt() {
        if thread::priority_of(tid) > thread::priority_of(current_tid()) {
            interrupt::yield_on_return();
        }
    } else if thread::priority_of(tid) > thread::priority_of(current_tid()) {
        yield_now();
    }
}

/// Terminate the current thread. Never returns.
pub fn exit_current_thread() -> ! {
    let old = interrupt::disable();
    thread::with_mut(current_tid(), |t| t.state = ThreadState::Dying);
    context::trap_yield();
    interrupt::restore(old);
    unreachable!("dying thread resumed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_insert_keeps_priority_order() {
        READY_QUEUE.lock().clear();
        let a = thread::alloc_tid();
        let b = thread::alloc_tid();
        let c = thread::alloc_tid();
        for (tid, pri) in [(a, 10), (b, 30), (c, 20)] {
            thread::insert(Box::new(Thread {
                tid,
                name: "t".to_string(),
                state: ThreadState::Ready,
                priority: pri,
                base_priority: pri,
                nice: 0,
                recent_cpu: 0,
                wait_on_lock: None,
                donations: Vec::new(),
                held_locks: Vec::new(),
                sequence: thread::next_sequence(),
                stack: alloc::vec![0u8; 8].into_boxed_slice(),
                frame: core::ptr::null_mut(),
            }));
        }
        ready_insert(a);
        ready_insert(b);
        ready_insert(c);
        let order: Vec<Tid> = READY_QUEUE.lock().clone();
        assert_eq!(order, alloc::vec![b, c, a]);
        for tid in [a, b, c] {
            thread::remove(tid);
        }
        READY_QUEUE.lock().clear();
    }
}
