//! Saved CPU state and the raw assembly stubs that swap it.
//!
//! Two interrupt vectors share one mechanism: the hardware timer (IRQ0,
//! preemption) and a software vector used for a thread's own voluntary
//! yield/block. Both stubs push the full general-purpose register file,
//! hand the stack pointer to a Rust handler as an `InterruptFrame`, then
//! resume whatever frame pointer that handler returns — which may belong
//! to a different thread entirely. `iretq` restores `rflags` (so the
//! incoming thread's interrupt-enable bit comes back exactly as it left
//! it) and privilege level, closing the loop.
//!
//! Adapted from the teacher's single timer-only ISR stub; the second
//! vector is a direct copy of the same shape, grounded on
//! `original_source/pintos/threads/thread.c`'s `thread_launch`, which
//! performs a synchronous context switch from ordinary (non-interrupt)
//! code by the same push-state/jump-to-new-state technique, just without
//! needing a real hardware trap to get there on x86.

#[repr(C)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    // Pushed by the CPU itself on interrupt entry.
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// `rflags` with only the interrupt-enable bit set, the value every freshly
/// spawned thread's frame resumes with.
pub const RFLAGS_IF: u64 = 1 << 9;

pub fn timer_isr_addr() -> u64 {
    extern "C" {
        fn timer_isr();
    }
    timer_isr as *const () as u64
}

/// Software vector a thread traps into to give up the CPU synchronously
/// (blocking on a semaphore, sleeping, or a plain voluntary yield).
pub const YIELD_VECTOR: u8 = 0x81;

pub fn yield_isr_addr() -> u64 {
    extern "C" {
        fn yield_isr();
    }
    yield_isr as *const () as u64
}

/// Trap into [`YIELD_VECTOR`]. Must be called with interrupts enabled and
/// outside interrupt context; the current thread's status must already
/// have been set to whatever it is waiting to become (Ready, Blocked, ...)
/// before this call, since `yield_isr_handler` schedules immediately.
#[inline(always)]
pub fn trap_yield() {
    unsafe {
        core::arch::asm!("int {0}", const YIELD_VECTOR, options(nostack));
    }
}

macro_rules! switch_stub {
    ($name:literal, $handler:literal) => {
        core::arch::global_asm!(
            concat!(".global ", $name),
            concat!($name, ":"),
            "push rax",
            "push rbx",
            "push rcx",
            "push rdx",
            "push rsi",
            "push rdi",
            "push rbp",
            "push r8",
            "push r9",
            "push r10",
            "push r11",
            "push r12",
            "push r13",
            "push r14",
            "push r15",
            "mov rdi, rsp",
            "cld",
            concat!("call ", $handler),
            "mov rsp, rax",
            "pop r15",
            "pop r14",
            "pop r13",
            "pop r12",
            "pop r11",
            "pop r10",
            "pop r9",
            "pop r8",
            "pop rbp",
            "pop rdi",
            "pop rsi",
            "pop rdx",
            "pop rcx",
            "pop rbx",
            "pop rax",
            "iretq",
        );
    };
}

switch_stub!("timer_isr", "timer_tick_handler");
switch_stub!("yield_isr", "yield_isr_handler");

/// Trampoline every freshly spawned thread's frame resumes into. Runs the
/// thread's entry function to completion, then hands the CPU back to the
/// scheduler for good — `entry` never returns to any other caller.
pub extern "C" fn thread_entry_trampoline(entry: extern "C" fn(usize), arg: usize) -> ! {
    super::interrupt::enable();
    entry(arg);
    super::scheduler::exit_current_thread();
}
