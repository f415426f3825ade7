//! 16550 serial output on COM1
//!
//! Kernel logs go out over the serial line so they survive terminal
//! switches and video remapping.

use core::fmt;
use spin::Mutex;
use x86::io::{inb, outb};

const COM1_PORT: u16 = 0x3F8;

pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1_PORT));

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        SerialPort { base }
    }

    /// Program the UART: 38400 baud, 8N1, FIFOs on, no interrupts.
    pub fn init(&mut self) {
        unsafe {
            outb(self.base + 1, 0x00); // disable interrupts
            outb(self.base + 3, 0x80); // DLAB on
            outb(self.base + 0, 0x03); // divisor low (38400 baud)
            outb(self.base + 1, 0x00); // divisor high
            outb(self.base + 3, 0x03); // 8 bits, no parity, one stop
            outb(self.base + 2, 0xC7); // enable + clear FIFOs
            outb(self.base + 4, 0x0B); // RTS/DSR set
        }
    }

    fn transmit_ready(&self) -> bool {
        unsafe { inb(self.base + 5) & 0x20 != 0 }
    }

    pub fn write_byte(&mut self, byte: u8) {
        while !self.transmit_ready() {
            core::hint::spin_loop();
        }
        unsafe {
            outb(self.base, byte);
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

pub fn init() {
    SERIAL1.lock().init();
}

/// Print to COM1 with the serial lock held and interrupts masked, so a
/// handler logging mid-line cannot deadlock against us.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    crate::interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}
