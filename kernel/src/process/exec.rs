//! The execute/halt protocol
//!
//! `execute` carries a process Loading → Running; `halt` is its inverse,
//! Running → Halting → gone. The two meet through the continuation saved
//! by `enter_user_program`: the next thing `execute`'s caller observes
//! after the user-mode transfer is the exit status `halt` delivers.
//!
//! Validation happens strictly before any state mutation: by the time the
//! PCB is allocated and the scheduler slot switched, the only remaining
//! steps are infallible copies and register loads.

use crate::interrupts;
use crate::memory::layout::{self, PROGRAM_IMAGE_OFFSET, PROGRAM_VIRT, USER_STACK_TOP};
use crate::memory::paging;
use crate::process::pcb::{FdEntry, FdKind, ProcessId, FD_STDIN, FD_STDOUT};
use crate::process::scheduler::with_scheduler;
use crate::process::{context, with_pcbs};
use crate::syscall::table;
use crate::{fs, gdt};

/// First four bytes of every executable image.
pub const EXECUTABLE_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Byte offset of the little-endian entry-point address in the image.
pub const ENTRY_POINT_OFFSET: usize = 24;

/// Exit status delivered when a hardware exception kills a process;
/// deliberately outside the 0–255 range a program can pass to `halt`.
pub const EXCEPTION_STATUS: i32 = 256;

/// Default program launched on every idle or orphaned terminal.
const SHELL: &[u8] = b"shell";

struct Command<'a> {
    program: &'a [u8],
    args: &'a [u8],
}

/// Split a command line into the program name and the argument string.
/// The arguments keep their internal spacing; `getargs` hands them to the
/// program verbatim.
fn parse_command(command: &[u8]) -> Result<Command<'_>, &'static str> {
    let trimmed = trim_spaces(command);
    if trimmed.is_empty() {
        return Err("empty command");
    }
    let split = trimmed
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(trimmed.len());
    Ok(Command {
        program: &trimmed[..split],
        args: trim_spaces(&trimmed[split..]),
    })
}

fn trim_spaces(mut bytes: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' '] = bytes {
        bytes = rest;
    }
    bytes
}

/// Terminal a new process belongs to: its parent's terminal when it has
/// one, otherwise the slot index being scheduled (a terminal's first
/// process). Deliberately *not* the displayed terminal: a shell that
/// execs while another terminal is on screen keeps its children.
pub(crate) fn inherited_terminal(
    parent: Option<ProcessId>,
    sched: &crate::process::scheduler::Scheduler,
    pcbs: &crate::process::pcb::PcbPool,
) -> usize {
    match parent {
        Some(p) => pcbs.get(p).terminal,
        None => sched.running_index(),
    }
}

/// Load and run a program, suspending the caller until it halts.
///
/// On success the return value is the child's exit status: 0–255 from the
/// child's own `halt`, or [`EXCEPTION_STATUS`] if an exception killed it.
/// Every failure (unknown name, wrong file type, bad magic, exhausted
/// PCB pool) collapses into one error at this boundary; callers cannot
/// (and must not try to) tell them apart.
pub fn execute(command: &[u8]) -> Result<i32, &'static str> {
    let cmd = parse_command(command)?;

    // Resolve and validate everything fallible up front.
    let dentry = fs::read_dentry_by_name(cmd.program)?;
    if dentry.file_type != fs::FileType::Regular {
        return Err("not a regular file");
    }
    let mut header = [0u8; ENTRY_POINT_OFFSET + 4];
    if fs::read_data(dentry.inode, 0, &mut header)? < header.len() {
        return Err("image too small for a header");
    }
    if header[..4] != EXECUTABLE_MAGIC {
        return Err("bad executable magic");
    }
    let entry_point = u32::from_le_bytes([
        header[ENTRY_POINT_OFFSET],
        header[ENTRY_POINT_OFFSET + 1],
        header[ENTRY_POINT_OFFSET + 2],
        header[ENTRY_POINT_OFFSET + 3],
    ]);
    let image_size = fs::file_size(dentry.inode)?;

    // Commit point. Interrupts stay off until the iret into the child:
    // the slot is about to name a process that has not executed an
    // instruction, and a tick in between would save a live context into
    // the wrong PCB.
    let were_enabled = interrupts::are_enabled();
    interrupts::disable();

    let commit = with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            let parent = sched.current_pid();
            let terminal = inherited_terminal(parent, sched, pcbs);
            let pid = pcbs.create(terminal, parent)?;
            let pcb = pcbs.get_mut(pid);
            pcb.set_args(cmd.args);
            pcb.files[FD_STDIN] = FdEntry::bind(&table::TERMINAL_OPS, FdKind::Terminal, 0);
            pcb.files[FD_STDOUT] = FdEntry::bind(&table::TERMINAL_OPS, FdKind::Terminal, 0);
            sched.set_current(Some(pid));
            Ok((pid, parent))
        })
    });
    let (child, parent) = match commit {
        Ok(ids) => ids,
        Err(err) => {
            if were_enabled {
                interrupts::enable();
            }
            return Err(err);
        }
    };

    // Mandatory side effect of every execute: the child's terminal is
    // reset through its freshly bound stdin.
    let _ = (table::TERMINAL_OPS.open)();

    match launch(child, dentry.inode, image_size, entry_point) {
        // The child ran and halted; its status arrived through the saved
        // continuation. Interrupts are re-masked at this point and stay
        // so until the caller's own interrupt frame is restored.
        Ok(status) => Ok(status),
        Err(err) => {
            // Undo the commit; the parent never stopped being the real
            // occupant of this slot.
            with_scheduler(|sched| {
                with_pcbs(|pcbs| {
                    sched.set_current(parent);
                    pcbs.remove(child);
                })
            });
            if were_enabled {
                interrupts::enable();
            }
            Err(err)
        }
    }
}

/// Map, load, and enter the child. An `Ok` here is already the child's
/// exit status: `enter_user_program` only returns once `halt` resumes the
/// continuation it saved.
fn launch(
    child: ProcessId,
    inode: u32,
    image_size: usize,
    entry_point: u32,
) -> Result<i32, &'static str> {
    let pid = child.as_usize();
    paging::map_program(layout::program_frame(pid))?;

    // The window now maps this child's private frame; copy the image in.
    let dest = unsafe {
        core::slice::from_raw_parts_mut(
            (PROGRAM_VIRT + PROGRAM_IMAGE_OFFSET) as *mut u8,
            image_size,
        )
    };
    if fs::read_data(inode, 0, dest)? < image_size {
        return Err("short read loading program image");
    }

    // Interrupts taken while the child runs must land on its own stack.
    gdt::set_kernel_stack(layout::kernel_stack_top(pid));

    log::debug!("entering user program: pid {}, entry {:#x}", pid, entry_point);
    let status = unsafe { context::enter_user_program(USER_STACK_TOP, entry_point) };
    Ok(status)
}

/// Tear down the current process and resume its parent, delivering
/// `status`. Returns only on failure; on success control transfers into
/// the parent's saved `execute` context (or, for an orphan, into a fresh
/// shell) and never comes back.
pub fn halt(status: i32) -> Result<(), &'static str> {
    interrupts::disable();

    let (pid, parent, continuation) = detach_current_process()?;

    let parent = match parent {
        Some(parent) => parent,
        None => {
            // A terminal is never left without a resident process: the
            // last halt on a terminal restarts its shell in place.
            log::info!("root process exited (status {}), restarting shell", status);
            let err = match execute(SHELL) {
                Err(err) => err,
                Ok(_) => "shell exit leaked through execute",
            };
            panic!("terminal left without a resident process: {}", err);
        }
    };

    // Restore the parent's world before resuming it.
    paging::map_program(layout::program_frame(parent.as_usize()))?;
    gdt::set_kernel_stack(layout::kernel_stack_top(parent.as_usize()));

    log::debug!(
        "halt: pid {} -> parent {} (status {})",
        pid.as_usize(),
        parent.as_usize(),
        status
    );
    unsafe { context::resume_execute_context(continuation, status) }
}

/// The bookkeeping half of `halt`: close every descriptor, re-point the
/// scheduler slot at the parent, and free the id. Returns the halted pid,
/// its parent, and the saved `execute` continuation that will receive the
/// exit status.
pub(crate) fn detach_current_process(
) -> Result<(ProcessId, Option<ProcessId>, u32), &'static str> {
    let pid =
        with_scheduler(|sched| sched.current_pid()).ok_or("halt with no active process")?;

    // Close every open slot. The bound close operations run outside the
    // PCB lock; stdin/stdout always get the terminal close side effect.
    let entries = with_pcbs(|pcbs| {
        let pcb = pcbs.get_mut(pid);
        let copy = pcb.files;
        for entry in pcb.files.iter_mut() {
            *entry = FdEntry::free();
        }
        copy
    });
    for entry in entries.iter().filter(|e| e.in_use) {
        if let Some(ops) = entry.ops {
            if let Err(err) = (ops.close)() {
                log::warn!("close during halt failed: {}", err);
            }
        }
    }

    let (parent, continuation) = with_pcbs(|pcbs| {
        let pcb = pcbs.get(pid);
        (pcb.parent, pcb.execute_esp)
    });

    // The slot resumes the parent from now on; scheduling ticks for this
    // terminal must never see the halted child again.
    with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            sched.set_current(parent);
            pcbs.remove(pid);
        })
    });

    Ok((pid, parent, continuation))
}

/// Forced halt for a process killed by a hardware exception.
pub fn exception_halt() -> ! {
    match halt(EXCEPTION_STATUS) {
        Err(err) => panic!("exception halt failed: {}", err),
        Ok(()) => unreachable!(),
    }
}
