//! Round-robin scheduling across the terminal slots
//!
//! One slot per terminal holds "the process currently running on that
//! terminal": a chain whose suspended ancestors are reachable through
//! parent links, so the slot alone identifies the whole terminal's state.
//! Every timer tick advances a single global index over the slots and
//! swaps kernel stacks. A null slot means the terminal has never launched
//! a shell; the tick that lands on it starts one.

use spin::Mutex;

use super::pcb::ProcessId;
use crate::memory::layout::{self, TERMINAL_COUNT};

pub struct Scheduler {
    slots: [Option<ProcessId>; TERMINAL_COUNT],
    running: usize,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            slots: [None; TERMINAL_COUNT],
            running: 0,
        }
    }

    /// Index of the slot whose process owns the CPU right now.
    pub fn running_index(&self) -> usize {
        self.running
    }

    /// Process currently recorded in the running slot.
    pub fn current_pid(&self) -> Option<ProcessId> {
        self.slots[self.running]
    }

    pub fn slot(&self, terminal: usize) -> Option<ProcessId> {
        self.slots[terminal]
    }

    /// Replace the running slot's process. Used by `execute` (child takes
    /// over immediately) and `halt` (parent takes back over).
    pub fn set_current(&mut self, pid: Option<ProcessId>) {
        self.slots[self.running] = pid;
    }

    /// Advance round-robin to the next slot and return its index.
    pub fn advance(&mut self) -> usize {
        self.running = (self.running + 1) % TERMINAL_COUNT;
        self.running
    }

    /// Undo one `advance` after a failed lazy launch so the cycle retries
    /// from the same place next tick.
    fn retreat(&mut self) {
        self.running = (self.running + TERMINAL_COUNT - 1) % TERMINAL_COUNT;
    }
}

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// Run `f` with the scheduler locked and interrupts masked. Same rule as
/// every process-wide singleton: the timer path takes this lock, so it is
/// never held with interrupts open.
pub fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&mut Scheduler) -> R,
{
    crate::interrupts::without_interrupts(|| f(&mut SCHEDULER.lock()))
}

/// The timer tick body: round-robin to the next terminal slot.
///
/// `current_esp` is the preempted context's kernel stack pointer, with its
/// full register state already pushed by the interrupt entry. The return
/// value is the stack pointer the entry path must resume: either another
/// process's saved context or, when nothing could be switched, the
/// preempted one unchanged.
///
/// Landing on an empty slot launches that terminal's first shell; the
/// `execute` call leaves through the user-mode transfer and never comes
/// back here.
pub fn preempt(current_esp: u32) -> u32 {
    // Save the preempted context. An empty current slot means the tick
    // interrupted the boot context, which is abandoned by design once the
    // first shell is running.
    let next = with_scheduler(|sched| {
        if let Some(pid) = sched.current_pid() {
            super::with_pcbs(|pcbs| pcbs.get_mut(pid).sched_esp = current_esp);
        }
        sched.advance();
        sched.current_pid()
    });

    let next_pid = match next {
        Some(pid) => pid,
        None => {
            // Lazy shell start for a terminal that has never run one.
            log::info!("starting shell for idle terminal");
            let err = match super::exec::execute(b"shell") {
                Ok(_) => "shell returned through the scheduler",
                Err(err) => err,
            };
            // Could not launch (e.g. no filesystem image). Step back and
            // resume whoever we preempted.
            log::error!("lazy shell launch failed: {}", err);
            with_scheduler(|sched| sched.retreat());
            return current_esp;
        }
    };

    let (terminal, sched_esp) = super::with_pcbs(|pcbs| {
        let pcb = pcbs.get(next_pid);
        (pcb.terminal, pcb.sched_esp)
    });

    // The program window and the video window both belong to the process
    // about to run; remap strictly before control reaches it.
    if let Err(err) = crate::memory::paging::map_program(layout::program_frame(next_pid.as_usize()))
    {
        panic!("scheduler failed to remap program window: {}", err);
    }
    let displayed = crate::drivers::terminal::displayed() == terminal;
    crate::memory::paging::retarget_video_window(terminal, displayed);

    // Future privilege transitions must land on the next process's stack.
    crate::gdt::set_kernel_stack(layout::kernel_stack_top(next_pid.as_usize()));

    sched_esp
}
