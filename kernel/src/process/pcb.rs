//! Process control blocks and the fixed PCB arena
//!
//! At most eight processes are resident at once. Occupancy lives in one
//! `u8` bitmap and the descriptors themselves live in a static arena
//! indexed by process id, so an id is all anyone ever needs to hold: the
//! program frame, the kernel stack, and the PCB storage are all pure
//! functions of it. Ids are reused: nothing may cache one across a
//! remove/create cycle without re-checking the bitmap.

use crate::memory::layout::MAX_PROCESSES;
use crate::syscall::table::FileOps;

/// Slots in a process's file-descriptor table.
pub const FD_COUNT: usize = 8;

/// stdin / stdout, permanently bound to the terminal, never closable.
pub const FD_STDIN: usize = 0;
pub const FD_STDOUT: usize = 1;

/// Capacity of the saved command-line argument buffer.
pub const ARGS_CAPACITY: usize = 128;

/// Process id: index into the PCB arena and into every per-process
/// address formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(usize);

impl ProcessId {
    pub fn new(id: usize) -> Self {
        debug_assert!(id < MAX_PROCESSES);
        ProcessId(id)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// What an open descriptor refers to; decides the offset-advance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdKind {
    Terminal,
    Rtc,
    Directory,
    Regular,
}

/// One slot of the per-process descriptor table. The operation table is
/// chosen by file type at `open` time and never rebound afterwards.
#[derive(Clone, Copy)]
pub struct FdEntry {
    pub ops: Option<&'static FileOps>,
    pub kind: Option<FdKind>,
    pub inode: u32,
    pub position: usize,
    pub in_use: bool,
}

impl FdEntry {
    pub const fn free() -> Self {
        FdEntry {
            ops: None,
            kind: None,
            inode: 0,
            position: 0,
            in_use: false,
        }
    }

    pub fn bind(ops: &'static FileOps, kind: FdKind, inode: u32) -> Self {
        FdEntry {
            ops: Some(ops),
            kind: Some(kind),
            inode,
            position: 0,
            in_use: true,
        }
    }
}

/// Per-process kernel descriptor.
pub struct Pcb {
    pub pid: ProcessId,
    /// Terminal this process belongs to; inherited from the parent, or
    /// the scheduler slot index for a terminal's first process.
    pub terminal: usize,
    /// Weak back-reference: the parent outlives the child while the child
    /// is resident, and is never owned through this field.
    pub parent: Option<ProcessId>,
    /// Kernel stack pointer of the `execute` call that spawned this
    /// process; `halt` resumes it, delivering the exit status.
    pub execute_esp: u32,
    /// Kernel stack pointer saved by the scheduler at preemption.
    pub sched_esp: u32,
    args: [u8; ARGS_CAPACITY],
    args_len: usize,
    pub files: [FdEntry; FD_COUNT],
}

impl Pcb {
    const fn vacant(id: usize) -> Self {
        Pcb {
            pid: ProcessId(id),
            terminal: 0,
            parent: None,
            execute_esp: 0,
            sched_esp: 0,
            args: [0; ARGS_CAPACITY],
            args_len: 0,
            files: [FdEntry::free(); FD_COUNT],
        }
    }

    /// Reinitialize every field for a fresh process. Ids are recycled, so
    /// nothing from the previous occupant may survive.
    fn reset(&mut self, terminal: usize, parent: Option<ProcessId>) {
        self.terminal = terminal;
        self.parent = parent;
        self.execute_esp = 0;
        self.sched_esp = 0;
        self.args = [0; ARGS_CAPACITY];
        self.args_len = 0;
        self.files = [FdEntry::free(); FD_COUNT];
    }

    pub fn set_args(&mut self, args: &[u8]) {
        let len = args.len().min(ARGS_CAPACITY);
        self.args[..len].copy_from_slice(&args[..len]);
        self.args_len = len;
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }

    /// Lowest free descriptor slot above stdin/stdout.
    pub fn free_fd(&self) -> Option<usize> {
        (2..FD_COUNT).find(|&fd| !self.files[fd].in_use)
    }
}

/// The fixed-capacity PCB pool.
pub struct PcbPool {
    occupancy: u8,
    slots: [Pcb; MAX_PROCESSES],
}

impl PcbPool {
    pub const fn new() -> Self {
        PcbPool {
            occupancy: 0,
            slots: [
                Pcb::vacant(0),
                Pcb::vacant(1),
                Pcb::vacant(2),
                Pcb::vacant(3),
                Pcb::vacant(4),
                Pcb::vacant(5),
                Pcb::vacant(6),
                Pcb::vacant(7),
            ],
        }
    }

    /// Claim the lowest free id and reinitialize its PCB. Exhaustion is
    /// an error the caller must surface as "cannot launch": there is no
    /// queueing.
    pub fn create(
        &mut self,
        terminal: usize,
        parent: Option<ProcessId>,
    ) -> Result<ProcessId, &'static str> {
        for id in 0..MAX_PROCESSES {
            if self.occupancy & (1 << id) == 0 {
                self.occupancy |= 1 << id;
                self.slots[id].reset(terminal, parent);
                return Ok(ProcessId(id));
            }
        }
        Err("all process slots occupied")
    }

    /// Release an id. The PCB contents are left as-is; the next `create`
    /// of this id rewrites every field.
    pub fn remove(&mut self, pid: ProcessId) {
        self.occupancy &= !(1 << pid.0);
    }

    pub fn is_occupied(&self, pid: ProcessId) -> bool {
        self.occupancy & (1 << pid.0) != 0
    }

    pub fn occupied_count(&self) -> u32 {
        self.occupancy.count_ones()
    }

    pub fn get(&self, pid: ProcessId) -> &Pcb {
        &self.slots[pid.0]
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> &mut Pcb {
        &mut self.slots[pid.0]
    }
}
