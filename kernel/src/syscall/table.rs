//! Per-type file operation tables
//!
//! Each file type supplies exactly four operations with one signature
//! family. `open` binds one of these tables into a descriptor slot and
//! the binding never changes afterwards; dispatch from then on is a plain
//! indirect call through the slot.

/// Open side effect for the file type. No descriptor state yet: the
/// binding happens around this call.
pub type OpenOp = fn() -> Result<(), &'static str>;

/// Close side effect; runs on explicit `close` and on process halt.
pub type CloseOp = fn() -> Result<(), &'static str>;

/// Read from the object into `buf`, starting at `position` for types that
/// have one. Returns bytes produced.
pub type ReadOp = fn(inode: u32, position: usize, buf: &mut [u8]) -> Result<usize, &'static str>;

/// Write `buf` to the object. Returns bytes consumed.
pub type WriteOp = fn(buf: &[u8]) -> Result<usize, &'static str>;

pub struct FileOps {
    pub open: OpenOp,
    pub close: CloseOp,
    pub read: ReadOp,
    pub write: WriteOp,
}

pub static TERMINAL_OPS: FileOps = FileOps {
    open: crate::drivers::terminal::terminal_open,
    close: crate::drivers::terminal::terminal_close,
    read: crate::drivers::terminal::terminal_read,
    write: crate::drivers::terminal::terminal_write,
};

pub static RTC_OPS: FileOps = FileOps {
    open: crate::drivers::rtc::rtc_open,
    close: crate::drivers::rtc::rtc_close,
    read: crate::drivers::rtc::rtc_read,
    write: crate::drivers::rtc::rtc_write,
};

pub static FILE_OPS: FileOps = FileOps {
    open: crate::fs::file_open,
    close: crate::fs::file_close,
    read: crate::fs::file_read,
    write: crate::fs::file_write,
};

pub static DIR_OPS: FileOps = FileOps {
    open: crate::fs::dir_open,
    close: crate::fs::dir_close,
    read: crate::fs::dir_read,
    write: crate::fs::dir_write,
};
