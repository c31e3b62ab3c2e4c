//! Kernel library: hardware bring-up plus the preemptive threading and
//! synchronization core under [`task`].
//!
//! Built with `#![no_std]` for the real `cargo run`/QEMU target, but
//! compiled as an ordinary `std` crate under `cargo test` (see
//! `task`'s module docs) so the scheduling algorithms can be exercised as
//! host unit tests without a hardware emulator.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), feature(abi_x86_interrupt))]

extern crate alloc;

pub mod allocator;
pub mod console;
pub mod font;
pub mod framebuffer;
pub mod gdt;
pub mod interrupts;
pub mod memory;
pub mod serial;
pub mod task;
pub mod vga_buffer;

/// Bring up the GDT, IDT and PIC. Must run before heap/task init.
pub fn init() {
    gdt::init();
    interrupts::init_idt();
    unsafe { interrupts::PICS.lock().initialize() };
    interrupts::init_pit();
}

pub fn hlt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Exit code passed to QEMU's `isa-debug-exit` device by the integration
/// test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(exit_code: QemuExitCode) {
    use x86_64::instructions::port::Port;
    unsafe {
        let mut port = Port::new(0xf4);
        port.write(exit_code as u32);
    }
}

#[cfg(not(test))]
pub trait Testable {
    fn run(&self);
}

#[cfg(not(test))]
impl<T: Fn()> Testable for T {
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

#[cfg(not(test))]
pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

#[cfg(not(test))]
pub fn test_panic_handler(info: &core::panic::PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
    hlt_loop();
}
