//! PIT timer: the scheduler's heartbeat
//!
//! Channel 0 fires every 10 ms. The entry path pushes the preempted
//! process's full register state onto its *own* kernel stack, hands that
//! stack pointer to the scheduler, and resumes whatever stack pointer the
//! scheduler hands back, which is the entire context switch. Everything
//! else (remapping, TSS) happens inside `scheduler::preempt`.

use core::sync::atomic::{AtomicU64, Ordering};
use x86::io::outb;

use super::InterruptIndex;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
const PIT_BASE_HZ: u32 = 1_193_182;

/// Scheduler tick rate: 100 Hz, one slot advance per tick.
pub const TICK_HZ: u32 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program channel 0 for periodic interrupts and open IRQ 0.
pub fn init() {
    let divisor = (PIT_BASE_HZ / TICK_HZ) as u16;
    unsafe {
        outb(PIT_COMMAND, 0x36); // channel 0, lo/hi, square wave
        outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0, (divisor >> 8) as u8);

        super::PICS.lock().enable_irq(InterruptIndex::Timer.irq());
    }
    log::info!("PIT programmed for {} Hz", TICK_HZ);
}

/// Monotonic tick count since boot.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Timer interrupt entry. Saves the full register state of the preempted
/// context on its own kernel stack, lets the scheduler trade stack
/// pointers, and returns into whichever context the scheduler picked.
#[unsafe(naked)]
pub unsafe extern "C" fn timer_entry() {
    core::arch::naked_asm!(
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {kernel_data}",
        "mov ds, ax",
        "mov es, ax",
        "mov eax, esp",
        "push eax",
        "call {preempt}",
        "add esp, 4",
        "mov esp, eax",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        "iretd",
        kernel_data = const 0x10,
        preempt = sym timer_tick,
    );
}

/// Rust half of the tick: acknowledge the interrupt, do the deferred
/// keyboard work, then let the scheduler pick the next stack pointer.
///
/// May not return at all: an empty scheduler slot makes the scheduler
/// `execute` a fresh shell, and that call leaves through the user-mode
/// transfer instead. EOI is sent up front for exactly that reason.
extern "C" fn timer_tick(current_esp: u32) -> u32 {
    TICKS.fetch_add(1, Ordering::Relaxed);

    unsafe {
        super::PICS
            .lock()
            .notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }

    crate::drivers::keyboard::process_pending();

    crate::process::scheduler::preempt(current_esp)
}
