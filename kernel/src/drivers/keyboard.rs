//! PS/2 keyboard driver
//!
//! The interrupt handler does the minimum (read the scancode, queue it,
//! acknowledge) and the lock-free queue is drained outside interrupt
//! context by `process_pending`, called from the timer tick and from
//! blocked terminal reads. Draining translates set-1 scancodes, tracks
//! modifiers, and feeds keystrokes to the displayed terminal.

use bitflags::bitflags;
use conquer_once::spin::OnceCell;
use crossbeam_queue::ArrayQueue;
use spin::Mutex;
use x86::io::inb;

use crate::drivers::terminal;
use crate::interrupts::{self, InterruptIndex, InterruptStackFrame};

const DATA_PORT: u16 = 0x60;
const QUEUE_CAPACITY: usize = 256;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Modifiers: u8 {
        const LEFT_SHIFT  = 1 << 0;
        const RIGHT_SHIFT = 1 << 1;
        const CTRL        = 1 << 2;
        const ALT         = 1 << 3;
        const CAPS_LOCK   = 1 << 4;
    }
}

impl Modifiers {
    fn shifted(self) -> bool {
        self.intersects(Modifiers::LEFT_SHIFT | Modifiers::RIGHT_SHIFT)
    }
}

static SCANCODES: OnceCell<ArrayQueue<u8>> = OnceCell::uninit();
static MODIFIERS: Mutex<Modifiers> = Mutex::new(Modifiers::empty());

// Set-1 make codes up to 0x39 (space).
#[rustfmt::skip]
static PLAIN: [u8; 58] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08,
    b' ', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

#[rustfmt::skip]
static SHIFTED: [u8; 58] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08,
    b' ', b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n',
    0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
    0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

const SC_LEFT_SHIFT: u8 = 0x2A;
const SC_RIGHT_SHIFT: u8 = 0x36;
const SC_CTRL: u8 = 0x1D;
const SC_ALT: u8 = 0x38;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_F1: u8 = 0x3B;
const SC_F3: u8 = 0x3D;
const SC_L: u8 = 0x26;
const RELEASE_BIT: u8 = 0x80;

pub fn init() {
    SCANCODES
        .try_init_once(|| ArrayQueue::new(QUEUE_CAPACITY))
        .expect("keyboard queue already initialized");
    unsafe {
        interrupts::PICS.lock().enable_irq(InterruptIndex::Keyboard.irq());
    }
    log::info!("keyboard ready");
}

/// IRQ 1 handler. Must not block or allocate: one port read, one
/// lock-free push, one EOI.
pub extern "x86-interrupt" fn keyboard_interrupt_handler(_frame: InterruptStackFrame) {
    let scancode = unsafe { inb(DATA_PORT) };
    if let Ok(queue) = SCANCODES.try_get() {
        // a full queue drops the keystroke
        let _ = queue.push(scancode);
    }
    unsafe {
        interrupts::PICS
            .lock()
            .notify_end_of_interrupt(InterruptIndex::Keyboard.as_u8());
    }
}

/// Drain queued scancodes and apply them. Called from the timer tick (so
/// typing stays live while programs run) and from blocked terminal reads.
/// The whole drain runs with interrupts masked; a drain preempted halfway
/// could otherwise apply keystrokes out of order.
pub fn process_pending() {
    let queue = match SCANCODES.try_get() {
        Ok(queue) => queue,
        Err(_) => return,
    };
    interrupts::without_interrupts(|| {
        while let Some(scancode) = queue.pop() {
            handle_scancode(scancode);
        }
    });
}

fn modifiers_update<F: FnOnce(&mut Modifiers)>(f: F) -> Modifiers {
    interrupts::without_interrupts(|| {
        let mut mods = MODIFIERS.lock();
        f(&mut mods);
        *mods
    })
}

fn handle_scancode(scancode: u8) {
    let released = scancode & RELEASE_BIT != 0;
    let make = scancode & !RELEASE_BIT;

    match make {
        SC_LEFT_SHIFT => {
            modifiers_update(|m| m.set(Modifiers::LEFT_SHIFT, !released));
            return;
        }
        SC_RIGHT_SHIFT => {
            modifiers_update(|m| m.set(Modifiers::RIGHT_SHIFT, !released));
            return;
        }
        SC_CTRL => {
            modifiers_update(|m| m.set(Modifiers::CTRL, !released));
            return;
        }
        SC_ALT => {
            modifiers_update(|m| m.set(Modifiers::ALT, !released));
            return;
        }
        SC_CAPS_LOCK => {
            if !released {
                modifiers_update(|m| m.toggle(Modifiers::CAPS_LOCK));
            }
            return;
        }
        _ => {}
    }
    if released {
        return;
    }

    let mods = modifiers_update(|_| {});

    // Alt+F1..F3: bring another terminal on screen.
    if mods.contains(Modifiers::ALT) && (SC_F1..=SC_F3).contains(&scancode) {
        terminal::switch_to((scancode - SC_F1) as usize);
        return;
    }
    // Ctrl+L: clear the displayed terminal.
    if mods.contains(Modifiers::CTRL) && scancode == SC_L {
        terminal::clear_displayed();
        return;
    }
    if mods.contains(Modifiers::CTRL) || mods.contains(Modifiers::ALT) {
        return;
    }

    let index = scancode as usize;
    if index >= PLAIN.len() {
        return;
    }
    let mut byte = if mods.shifted() { SHIFTED[index] } else { PLAIN[index] };
    if byte == 0 {
        return;
    }
    // Caps lock affects letters only, on top of shift.
    if mods.contains(Modifiers::CAPS_LOCK) && byte.is_ascii_alphabetic() {
        byte ^= 0x20;
    }
    terminal::input_char(byte);
}
