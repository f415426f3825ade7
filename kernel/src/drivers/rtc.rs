//! Virtualized real-time clock
//!
//! The hardware ticks once, at 1024 Hz; each terminal gets its own
//! virtual rate on top of it. A blocked `rtc_read` parks on a flag the
//! interrupt handler clears when that terminal's virtual counter runs
//! out, so three programs can wait at three different rates off one chip.

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use x86::io::{inb, outb};

use crate::interrupts::{self, InterruptIndex, InterruptStackFrame};
use crate::memory::layout::TERMINAL_COUNT;

const INDEX_PORT: u16 = 0x70;
const DATA_PORT: u16 = 0x71;

const REG_A: u8 = 0x8A;
const REG_B: u8 = 0x8B;
const REG_C: u8 = 0x0C;

/// Rate divider 6 → 1024 Hz.
const HW_RATE: u8 = 0x06;
pub const HW_FREQUENCY: i32 = 1024;

/// Virtual default: 2 Hz, the rate `rtc_open` establishes.
pub const DEFAULT_FREQUENCY: i32 = 2;

macro_rules! per_terminal {
    ($init:expr) => {
        [$init, $init, $init]
    };
}

/// Countdown of hardware ticks to the next virtual tick, per terminal.
static COUNTDOWN: [AtomicI32; TERMINAL_COUNT] = per_terminal!(AtomicI32::new(0));
/// Hardware ticks per virtual tick, per terminal.
static PERIOD: [AtomicI32; TERMINAL_COUNT] =
    per_terminal!(AtomicI32::new(HW_FREQUENCY / DEFAULT_FREQUENCY));
/// Set by a blocked reader, cleared by the handler on the virtual tick.
static WAITING: [AtomicBool; TERMINAL_COUNT] = per_terminal!(AtomicBool::new(false));

pub fn init() {
    interrupts::without_interrupts(|| unsafe {
        outb(INDEX_PORT, REG_A);
        let prev = inb(DATA_PORT);
        outb(INDEX_PORT, REG_A);
        outb(DATA_PORT, (prev & 0xF0) | HW_RATE);

        outb(INDEX_PORT, REG_B);
        let prev = inb(DATA_PORT);
        outb(INDEX_PORT, REG_B);
        outb(DATA_PORT, prev | 0x40); // periodic interrupt enable

        // flush any pending interrupt so the line starts clean
        outb(INDEX_PORT, REG_C);
        inb(DATA_PORT);

        interrupts::PICS.lock().enable_irq(InterruptIndex::Rtc.irq());
    });
    log::info!("RTC at {} Hz, virtual default {} Hz", HW_FREQUENCY, DEFAULT_FREQUENCY);
}

/// IRQ 8: advance every terminal's virtual countdown. Register C must be
/// read or the chip never fires again.
pub extern "x86-interrupt" fn rtc_interrupt_handler(_frame: InterruptStackFrame) {
    unsafe {
        outb(INDEX_PORT, REG_C);
        inb(DATA_PORT);
    }

    for terminal in 0..TERMINAL_COUNT {
        if COUNTDOWN[terminal].fetch_sub(1, Ordering::AcqRel) <= 1 {
            COUNTDOWN[terminal].store(PERIOD[terminal].load(Ordering::Acquire), Ordering::Release);
            WAITING[terminal].store(false, Ordering::Release);
        }
    }

    unsafe {
        interrupts::PICS
            .lock()
            .notify_end_of_interrupt(InterruptIndex::Rtc.as_u8());
    }
}

// --- operation-table entry points -------------------------------------

/// Reset the calling process's terminal to the default virtual rate.
pub fn rtc_open() -> Result<(), &'static str> {
    let terminal = crate::process::active_terminal();
    set_period(terminal, HW_FREQUENCY / DEFAULT_FREQUENCY);
    Ok(())
}

pub fn rtc_close() -> Result<(), &'static str> {
    let terminal = crate::process::active_terminal();
    set_period(terminal, HW_FREQUENCY / DEFAULT_FREQUENCY);
    Ok(())
}

/// Block until the calling process's terminal takes its next virtual
/// tick. Always reads "zero bytes".
pub fn rtc_read(_inode: u32, _position: usize, _buf: &mut [u8]) -> Result<usize, &'static str> {
    let terminal = crate::process::active_terminal();
    WAITING[terminal].store(true, Ordering::Release);
    while WAITING[terminal].load(Ordering::Acquire) {
        core::hint::spin_loop();
    }
    Ok(0)
}

/// Set the virtual rate: a 4-byte little-endian frequency, a power of two
/// between 2 and 1024 Hz.
pub fn rtc_write(buf: &[u8]) -> Result<usize, &'static str> {
    if buf.len() < 4 {
        return Err("rtc rate needs four bytes");
    }
    let frequency = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if frequency < 2 || frequency > HW_FREQUENCY || !(frequency as u32).is_power_of_two() {
        return Err("rtc rate must be a power of two in 2..=1024");
    }
    let terminal = crate::process::active_terminal();
    set_period(terminal, HW_FREQUENCY / frequency);
    Ok(4)
}

fn set_period(terminal: usize, period: i32) {
    PERIOD[terminal].store(period, Ordering::Release);
    COUNTDOWN[terminal].store(period, Ordering::Release);
}
