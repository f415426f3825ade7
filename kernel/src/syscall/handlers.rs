//! System call handler implementations
//!
//! Argument validation happens here, before any driver or filesystem code
//! runs: descriptor index in range and correctly directed, buffers
//! non-null, lengths non-negative, slot actually in use. The op table
//! bound at open time does the rest.

use crate::memory::layout::{
    self, PROGRAM_IMAGE_OFFSET, PROGRAM_VIRT, USER_STACK_TOP, USER_VIDEO_VIRT, VIDEO_PHYS,
};
use crate::process::pcb::{FdEntry, FdKind, ARGS_CAPACITY, FD_COUNT, FD_STDIN, FD_STDOUT};
use crate::process::{exec, with_active_pcb};
use crate::syscall::table;
use crate::{fs, memory::paging};

type SysResult = Result<i32, &'static str>;

/// Longest command line / filename accepted from user space. Matches the
/// terminal's line-edit capacity: nothing longer can be typed.
const COMMAND_CAPACITY: usize = 128;

/// Copy a NUL-terminated user string into `buf`, returning the used
/// prefix. Stops at the buffer capacity.
fn copy_user_cstring(ptr: u32, buf: &mut [u8]) -> Result<&[u8], &'static str> {
    if ptr == 0 {
        return Err("null string pointer");
    }
    let mut len = 0;
    while len < buf.len() {
        let byte = unsafe { *((ptr as usize + len) as *const u8) };
        if byte == 0 {
            break;
        }
        buf[len] = byte;
        len += 1;
    }
    Ok(&buf[..len])
}

/// Terminate the calling process. Only the low byte of `status` is
/// honored, keeping the exception status (256) unforgeable.
pub fn sys_halt(status: u32) -> SysResult {
    exec::halt((status & 0xFF) as i32)?;
    unreachable!("halt returned without an error");
}

/// Run a program and return its exit status once it halts.
pub fn sys_execute(command_ptr: u32) -> SysResult {
    let mut buf = [0u8; COMMAND_CAPACITY];
    let command = copy_user_cstring(command_ptr, &mut buf)?;
    exec::execute(command)
}

pub fn sys_read(fd: u32, buf: u32, nbytes: u32) -> SysResult {
    let fd = fd as usize;
    if fd >= FD_COUNT || fd == FD_STDOUT {
        return Err("bad descriptor for read");
    }
    if buf == 0 {
        return Err("null read buffer");
    }
    if (nbytes as i32) < 0 {
        return Err("negative read length");
    }

    let entry = lookup_fd(fd)?;
    let ops = entry.ops.ok_or("descriptor has no operations")?;
    let slice = unsafe { core::slice::from_raw_parts_mut(buf as *mut u8, nbytes as usize) };
    let count = (ops.read)(entry.inode, entry.position, slice)?;

    // Directory descriptors advance one entry per call; everything else
    // advances by the bytes actually produced.
    with_active_pcb(|pcb| {
        let entry = &mut pcb.files[fd];
        if entry.in_use {
            entry.position += match entry.kind {
                Some(FdKind::Directory) => 1,
                _ => count,
            };
        }
    });
    Ok(count as i32)
}

pub fn sys_write(fd: u32, buf: u32, nbytes: u32) -> SysResult {
    let fd = fd as usize;
    if fd >= FD_COUNT || fd == FD_STDIN {
        return Err("bad descriptor for write");
    }
    if buf == 0 {
        return Err("null write buffer");
    }
    if (nbytes as i32) < 0 {
        return Err("negative write length");
    }

    let entry = lookup_fd(fd)?;
    let ops = entry.ops.ok_or("descriptor has no operations")?;
    let slice = unsafe { core::slice::from_raw_parts(buf as *const u8, nbytes as usize) };
    let count = (ops.write)(slice)?;
    Ok(count as i32)
}

pub fn sys_open(filename_ptr: u32) -> SysResult {
    let mut buf = [0u8; COMMAND_CAPACITY];
    let name = copy_user_cstring(filename_ptr, &mut buf)?;
    if name.is_empty() {
        return Err("empty filename");
    }

    let fd = with_active_pcb(|pcb| pcb.free_fd())
        .ok_or("no active process")?
        .ok_or("descriptor table full")?;

    let dentry = fs::read_dentry_by_name(name)?;
    let (ops, kind): (&'static table::FileOps, FdKind) = match dentry.file_type {
        fs::FileType::Rtc => (&table::RTC_OPS, FdKind::Rtc),
        fs::FileType::Directory => (&table::DIR_OPS, FdKind::Directory),
        fs::FileType::Regular => (&table::FILE_OPS, FdKind::Regular),
    };

    (ops.open)()?;
    with_active_pcb(|pcb| {
        pcb.files[fd] = FdEntry::bind(ops, kind, dentry.inode);
    });
    Ok(fd as i32)
}

pub fn sys_close(fd: u32) -> SysResult {
    let fd = fd as usize;
    // stdin/stdout are permanent; they only close when the process halts.
    if fd < 2 || fd >= FD_COUNT {
        return Err("bad descriptor for close");
    }

    let entry = lookup_fd(fd)?;
    with_active_pcb(|pcb| pcb.files[fd] = FdEntry::free());
    if let Some(ops) = entry.ops {
        (ops.close)()?;
    }
    Ok(0)
}

/// Copy the saved command-line arguments (with a terminating NUL) into a
/// user buffer.
pub fn sys_getargs(buf: u32, nbytes: u32) -> SysResult {
    if buf == 0 {
        return Err("null argument buffer");
    }
    let mut args = [0u8; ARGS_CAPACITY];
    let len = with_active_pcb(|pcb| {
        let stored = pcb.args();
        args[..stored.len()].copy_from_slice(stored);
        stored.len()
    })
    .ok_or("no active process")?;

    if len == 0 {
        return Err("no arguments");
    }
    if len + 1 > nbytes as usize {
        return Err("argument buffer too small");
    }

    unsafe {
        core::ptr::copy_nonoverlapping(args.as_ptr(), buf as *mut u8, len);
        *((buf as usize + len) as *mut u8) = 0;
    }
    Ok(0)
}

/// Map the video window into the caller's address space and store its
/// virtual address through `screen_start`.
pub fn sys_vidmap(screen_start: u32) -> SysResult {
    // The pointer itself must live inside the caller's program image
    // region; anything else (kernel addresses included) is rejected.
    if screen_start <= PROGRAM_VIRT + PROGRAM_IMAGE_OFFSET || screen_start >= USER_STACK_TOP {
        return Err("vidmap pointer outside the program image");
    }

    let terminal = crate::process::active_terminal();
    let displayed = crate::drivers::terminal::displayed() == terminal;
    let target = if displayed {
        VIDEO_PHYS
    } else {
        layout::terminal_video_buffer(terminal)
    };
    paging::bind_user_video_window(USER_VIDEO_VIRT, target)?;

    unsafe {
        *(screen_start as *mut u32) = USER_VIDEO_VIRT;
    }
    Ok(0)
}

/// Signal delivery is not implemented; the call succeeds and does nothing.
pub fn sys_set_handler(_signum: u32, _handler: u32) -> SysResult {
    Ok(0)
}

/// Signal delivery is not implemented; the call succeeds and does nothing.
pub fn sys_sigreturn() -> SysResult {
    Ok(0)
}

/// Snapshot an in-use descriptor slot of the active process.
fn lookup_fd(fd: usize) -> Result<FdEntry, &'static str> {
    with_active_pcb(|pcb| {
        let entry = pcb.files[fd];
        if entry.in_use {
            Ok(entry)
        } else {
            Err("descriptor not in use")
        }
    })
    .ok_or("no active process")?
}
