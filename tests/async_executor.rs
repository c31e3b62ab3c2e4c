// Integration test: verify the preemptive scheduler actually runs and
// synchronizes kernel threads under QEMU.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use bootloader_api::{entry_point, BootInfo, BootloaderConfig};
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel::task::sync::Semaphore;
use kernel::{allocator, memory, task};

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(bootloader_api::config::Mapping::Dynamic);
    config
};

entry_point!(main, config = &BOOTLOADER_CONFIG);

fn main(boot_info: &'static mut BootInfo) -> ! {
    kernel::init();

    let phys_mem_offset = x86_64::VirtAddr::new(
        boot_info
            .physical_memory_offset
            .into_option()
            .expect("physical_memory_offset not available"),
    );
    let mut mapper = unsafe { memory::init(phys_mem_offset) };
    let mut frame_allocator =
        unsafe { memory::BootInfoFrameAllocator::init(&boot_info.memory_regions) };
    allocator::init_heap(&mut mapper, &mut frame_allocator).expect("heap initialization failed");

    kernel::task::init(task::config::SchedulerPolicy::FixedPriority);

    test_main();
    kernel::hlt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::test_panic_handler(info)
}

static COUNTER: AtomicU32 = AtomicU32::new(0);
static DONE: Semaphore = Semaphore::new(0);

extern "C" fn increment_and_signal(_arg: usize) {
    COUNTER.fetch_add(1, Ordering::SeqCst);
    DONE.up();
}

#[test_case]
fn spawned_thread_runs_and_signals_completion() {
    COUNTER.store(0, Ordering::SeqCst);
    task::spawn("bump", task::config::PRI_DEFAULT, increment_and_signal, 0);
    DONE.down();
    assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
}

#[test_case]
fn higher_priority_thread_preempts_lower() {
    static ORDER: Semaphore = Semaphore::new(0);
    static FIRST: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);

    extern "C" fn low(_arg: usize) {
        FIRST.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok();
        ORDER.up();
    }
    extern "C" fn high(_arg: usize) {
        FIRST.compare_exchange(0, 2, Ordering::SeqCst, Ordering::SeqCst)
            .ok();
        ORDER.up();
    }

    FIRST.store(0, Ordering::SeqCst);
    task::spawn("low", task::config::PRI_MIN + 1, low, 0);
    task::spawn("high", task::config::PRI_MAX - 1, high, 0);
    ORDER.down();
    ORDER.down();
    assert_eq!(FIRST.load(Ordering::SeqCst), 2);
}
