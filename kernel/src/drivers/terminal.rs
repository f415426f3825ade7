//! Multi-terminal text driver
//!
//! Three terminals share one VGA text screen. The displayed terminal
//! writes straight to video memory; background terminals write to their
//! own 4 KB back buffer at 3 MB, so a background process's output lands
//! exactly where its screen will be when it is switched back in.
//! Switching terminals swaps buffer contents and re-aims the user video
//! window.
//!
//! Input is line-oriented: the keyboard feeds the *displayed* terminal's
//! edit buffer, and a blocked `terminal_read` on that terminal completes
//! when Enter arrives.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;
use x86::io::outb;

use crate::memory::layout::{self, TERMINAL_COUNT, VIDEO_PHYS};

pub const COLS: usize = 80;
pub const ROWS: usize = 25;
const ATTRIB: u8 = 0x07;
const BLANK: u16 = (ATTRIB as u16) << 8 | b' ' as u16;

/// Line-edit capacity, including the terminating newline.
pub const INPUT_CAPACITY: usize = 128;

struct Terminal {
    cursor_col: usize,
    cursor_row: usize,
    input: [u8; INPUT_CAPACITY],
    input_len: usize,
}

impl Terminal {
    const fn new() -> Self {
        Terminal {
            cursor_col: 0,
            cursor_row: 0,
            input: [0; INPUT_CAPACITY],
            input_len: 0,
        }
    }
}

static TERMINALS: Mutex<[Terminal; TERMINAL_COUNT]> =
    Mutex::new([Terminal::new(), Terminal::new(), Terminal::new()]);

/// Which terminal owns the real screen right now.
static DISPLAYED: AtomicUsize = AtomicUsize::new(0);

/// Set when a terminal's edit buffer holds a completed line; cleared by
/// the reader. Lives outside the terminal lock so blocked readers can
/// poll it without contending.
static ENTER_PENDING: [AtomicBool; TERMINAL_COUNT] =
    [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)];

fn with_terminals<F, R>(f: F) -> R
where
    F: FnOnce(&mut [Terminal; TERMINAL_COUNT]) -> R,
{
    crate::interrupts::without_interrupts(|| f(&mut TERMINALS.lock()))
}

/// The terminal currently on screen.
pub fn displayed() -> usize {
    DISPLAYED.load(Ordering::Acquire)
}

/// Frame this terminal's output lands in: real video memory when
/// displayed, its back buffer otherwise.
fn frame_base(terminal: usize) -> *mut u16 {
    if displayed() == terminal {
        VIDEO_PHYS as *mut u16
    } else {
        layout::terminal_video_buffer(terminal) as *mut u16
    }
}

fn cell_write(base: *mut u16, index: usize, value: u16) {
    unsafe {
        core::ptr::write_volatile(base.add(index), value);
    }
}

fn cell_read(base: *mut u16, index: usize) -> u16 {
    unsafe { core::ptr::read_volatile(base.add(index)) }
}

fn clear_frame(base: *mut u16) {
    for index in 0..COLS * ROWS {
        cell_write(base, index, BLANK);
    }
}

fn scroll(base: *mut u16) {
    for index in 0..COLS * (ROWS - 1) {
        let below = cell_read(base, index + COLS);
        cell_write(base, index, below);
    }
    for index in COLS * (ROWS - 1)..COLS * ROWS {
        cell_write(base, index, BLANK);
    }
}

fn put_byte(term: &mut Terminal, base: *mut u16, byte: u8) {
    match byte {
        b'\n' => {
            term.cursor_col = 0;
            term.cursor_row += 1;
        }
        0x08 => {
            if term.cursor_col > 0 {
                term.cursor_col -= 1;
                cell_write(base, term.cursor_row * COLS + term.cursor_col, BLANK);
            }
        }
        byte => {
            cell_write(
                base,
                term.cursor_row * COLS + term.cursor_col,
                (ATTRIB as u16) << 8 | byte as u16,
            );
            term.cursor_col += 1;
            if term.cursor_col == COLS {
                term.cursor_col = 0;
                term.cursor_row += 1;
            }
        }
    }
    if term.cursor_row == ROWS {
        scroll(base);
        term.cursor_row = ROWS - 1;
    }
}

/// Program the VGA hardware cursor.
fn update_hw_cursor(col: usize, row: usize) {
    let position = (row * COLS + col) as u16;
    unsafe {
        outb(0x3D4, 0x0F);
        outb(0x3D5, (position & 0xFF) as u8);
        outb(0x3D4, 0x0E);
        outb(0x3D5, (position >> 8) as u8);
    }
}

/// Clear every terminal and put terminal 0 on screen.
pub fn init() {
    with_terminals(|terms| {
        for terminal in 0..TERMINAL_COUNT {
            clear_frame(layout::terminal_video_buffer(terminal) as *mut u16);
            terms[terminal] = Terminal::new();
        }
        clear_frame(VIDEO_PHYS as *mut u16);
    });
    DISPLAYED.store(0, Ordering::Release);
    update_hw_cursor(0, 0);
    log::info!("{} terminals ready", TERMINAL_COUNT);
}

/// Put `terminal` on screen: stash the outgoing screen into its buffer,
/// load the incoming buffer, and re-aim the active process's video
/// window.
pub fn switch_to(terminal: usize) {
    if terminal >= TERMINAL_COUNT || terminal == displayed() {
        return;
    }
    // Active-process lookup takes the scheduler locks; do it before the
    // terminal lock.
    let active_terminal = crate::process::active_terminal();

    let cursor = with_terminals(|terms| {
        let old = displayed();
        let video = VIDEO_PHYS as *mut u16;
        let old_buffer = layout::terminal_video_buffer(old) as *mut u16;
        let new_buffer = layout::terminal_video_buffer(terminal) as *mut u16;
        for index in 0..COLS * ROWS {
            cell_write(old_buffer, index, cell_read(video, index));
            cell_write(video, index, cell_read(new_buffer, index));
        }
        DISPLAYED.store(terminal, Ordering::Release);
        (terms[terminal].cursor_col, terms[terminal].cursor_row)
    });
    update_hw_cursor(cursor.0, cursor.1);

    // The running process's mapped "video memory" must follow the switch:
    // on screen if its terminal just came in, into its buffer otherwise.
    crate::memory::paging::retarget_video_window(active_terminal, active_terminal == terminal);
}

/// Clear the displayed terminal's screen (Ctrl+L).
pub fn clear_displayed() {
    let terminal = displayed();
    with_terminals(|terms| {
        clear_frame(VIDEO_PHYS as *mut u16);
        terms[terminal].cursor_col = 0;
        terms[terminal].cursor_row = 0;
    });
    update_hw_cursor(0, 0);
}

/// Feed one translated keystroke to the displayed terminal.
pub fn input_char(byte: u8) {
    let terminal = displayed();
    let cursor = with_terminals(|terms| {
        let term = &mut terms[terminal];
        let base = VIDEO_PHYS as *mut u16;
        match byte {
            b'\n' => {
                if term.input_len < INPUT_CAPACITY {
                    term.input[term.input_len] = b'\n';
                    term.input_len += 1;
                }
                put_byte(term, base, b'\n');
                ENTER_PENDING[terminal].store(true, Ordering::Release);
            }
            0x08 => {
                if term.input_len > 0 && !ENTER_PENDING[terminal].load(Ordering::Acquire) {
                    term.input_len -= 1;
                    put_byte(term, base, 0x08);
                }
            }
            byte => {
                // Leave room for the newline that finishes the line.
                if term.input_len < INPUT_CAPACITY - 1 {
                    term.input[term.input_len] = byte;
                    term.input_len += 1;
                    put_byte(term, base, byte);
                }
            }
        }
        (term.cursor_col, term.cursor_row)
    });
    update_hw_cursor(cursor.0, cursor.1);
}

// --- operation-table entry points -------------------------------------

/// Reset the calling process's terminal: clear screen and input state.
/// This runs as a side effect of every `execute` through the fresh
/// stdin/stdout bindings.
pub fn terminal_open() -> Result<(), &'static str> {
    let terminal = crate::process::active_terminal();
    with_terminals(|terms| {
        let term = &mut terms[terminal];
        clear_frame(frame_base(terminal));
        term.cursor_col = 0;
        term.cursor_row = 0;
        term.input_len = 0;
    });
    ENTER_PENDING[terminal].store(false, Ordering::Release);
    if displayed() == terminal {
        update_hw_cursor(0, 0);
    }
    Ok(())
}

pub fn terminal_close() -> Result<(), &'static str> {
    Ok(())
}

/// Block until the calling process's terminal has a completed line, then
/// copy it (newline included) into `buf`.
pub fn terminal_read(_inode: u32, _position: usize, buf: &mut [u8]) -> Result<usize, &'static str> {
    let terminal = crate::process::active_terminal();

    // Interrupts are live here: the keyboard handler and the scheduler
    // both keep running while we wait.
    while !ENTER_PENDING[terminal].load(Ordering::Acquire) {
        crate::drivers::keyboard::process_pending();
        core::hint::spin_loop();
    }

    let copied = with_terminals(|terms| {
        let term = &mut terms[terminal];
        let len = term.input_len.min(buf.len());
        buf[..len].copy_from_slice(&term.input[..len]);
        term.input_len = 0;
        len
    });
    ENTER_PENDING[terminal].store(false, Ordering::Release);
    Ok(copied)
}

/// Write bytes to the calling process's terminal.
pub fn terminal_write(buf: &[u8]) -> Result<usize, &'static str> {
    let terminal = crate::process::active_terminal();
    let cursor = with_terminals(|terms| {
        let term = &mut terms[terminal];
        let base = frame_base(terminal);
        for &byte in buf {
            put_byte(term, base, byte);
        }
        (term.cursor_col, term.cursor_row)
    });
    if displayed() == terminal {
        update_hw_cursor(cursor.0, cursor.1);
    }
    Ok(buf.len())
}
