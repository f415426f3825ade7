//! Kernel entry point and initialization.

#![no_std]
#![no_main]

use core::arch::global_asm;
use core::panic::PanicInfo;

use kernel::serial_println;

/// Boot stack used until the first process takes over. Processes get
/// their own 8 KB kernel stacks below 8 MB; this one only has to carry
/// initialization and the first `execute`.
const BOOT_STACK_SIZE: usize = 32 * 1024;

#[repr(C, align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

// Multiboot v1 header (page-aligned modules + memory info) and the real
// entry point: set up a stack, forward GRUB's magic and info pointer.
global_asm!(
    r#"
.section .multiboot, "a"
.balign 4
.long 0x1BADB002
.long 0x00000003
.long 0xE4524FFB

.section .text
.global boot_entry
boot_entry:
    cli
    lea esp, [{stack} + {stack_size}]
    push ebx
    push eax
    call {main}
1:
    hlt
    jmp 1b
"#,
    stack = sym BOOT_STACK,
    stack_size = const BOOT_STACK_SIZE,
    main = sym kernel_main,
);

/// Bring the machine up, then hand terminal 0 its first shell. The
/// remaining terminals get theirs lazily from the scheduler tick.
#[no_mangle]
extern "C" fn kernel_main(magic: u32, info_addr: u32) -> ! {
    kernel::serial::init();
    kernel::logger::init();
    log::info!("triad kernel booting");

    kernel::gdt::init();
    kernel::interrupts::init();
    kernel::interrupts::init_pic();
    kernel::memory::init();
    kernel::drivers::init();

    // Self-tests install their own throwaway filesystem image, so they
    // run before the real one goes in.
    #[cfg(feature = "testing")]
    kernel::tests::run_all();

    match kernel::boot::filesystem_image(magic, info_addr) {
        Ok(image) => {
            if let Err(err) = kernel::fs::install(image) {
                log::error!("bad filesystem image: {}", err);
            }
        }
        Err(err) => log::warn!("{}; no programs can run", err),
    }

    kernel::interrupts::timer::init();

    log::info!("launching the first shell");
    match kernel::process::exec::execute(b"shell") {
        // execute only comes back if the launch failed; a running shell
        // never returns here (an orphaned halt restarts it in place).
        Err(err) => log::error!("cannot start shell: {}", err),
        Ok(status) => log::error!("first shell unexpectedly exited with {}", status),
    }

    kernel::interrupts::enable();
    kernel::hlt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::interrupts::disable();
    serial_println!("KERNEL PANIC: {}", info);
    log::error!("kernel panic: {}", info);
    kernel::hlt_loop();
}
