//! Process management
//!
//! The PCB pool and the scheduler slots are process-wide singletons owned
//! here, constructed once at boot and only ever touched with interrupts
//! masked. "The active process" always means: the process recorded in the
//! scheduler slot currently being run: system calls and drivers use that
//! lookup to find whose file table and whose terminal applies.

pub mod context;
pub mod exec;
pub mod pcb;
pub mod scheduler;

use pcb::{Pcb, PcbPool, ProcessId};
use spin::Mutex;

static PCB_POOL: Mutex<PcbPool> = Mutex::new(PcbPool::new());

/// Run `f` with the PCB pool locked and interrupts masked.
pub fn with_pcbs<F, R>(f: F) -> R
where
    F: FnOnce(&mut PcbPool) -> R,
{
    crate::interrupts::without_interrupts(|| f(&mut PCB_POOL.lock()))
}

/// Id of the active process, if any terminal has launched one.
pub fn active_pid() -> Option<ProcessId> {
    scheduler::with_scheduler(|sched| sched.current_pid())
}

/// Run `f` against the active process's PCB. Pure lookup plus the closure;
/// returns `None` when no process is resident yet (early boot).
pub fn with_active_pcb<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut Pcb) -> R,
{
    crate::interrupts::without_interrupts(|| {
        let pid = scheduler::with_scheduler(|sched| sched.current_pid())?;
        Some(with_pcbs(|pcbs| f(pcbs.get_mut(pid))))
    })
}

/// Terminal owning the active process, defaulting to the displayed
/// terminal before any process exists.
pub fn active_terminal() -> usize {
    with_active_pcb(|pcb| pcb.terminal).unwrap_or_else(crate::drivers::terminal::displayed)
}
