//! Canonical physical/virtual memory layout
//!
//! The whole layout is fixed at build time: the kernel occupies the
//! identity-mapped 4 MB page at 4 MB, per-process kernel stacks hang below
//! 8 MB, and program frames are dealt out above 8 MB purely by process id.
//! There is no frame allocator: with a hard cap of eight processes the
//! arithmetic below is the allocator.

/// Number of entries in a page directory or page table.
pub const TABLE_ENTRIES: usize = 1024;

/// Size of a 4 KB page.
pub const PAGE_SIZE: usize = 0x1000;

/// Size of a 4 MB page.
pub const LARGE_PAGE_SIZE: usize = 0x40_0000;

/// Physical and virtual base of the kernel's identity-mapped 4 MB page.
pub const KERNEL_BASE: u32 = 0x40_0000;

/// VGA text buffer.
pub const VIDEO_PHYS: u32 = 0xB8000;

/// Physical base of the per-terminal off-screen video buffers (one 4 KB
/// page each, directly below the kernel image at 3 MB).
pub const TERMINAL_VIDEO_BASE: u32 = 0x30_0000;

/// Number of terminals multiplexed by the scheduler.
pub const TERMINAL_COUNT: usize = 3;

/// Hard cap on resident processes.
pub const MAX_PROCESSES: usize = 8;

/// Virtual base of the (single) user program window.
pub const PROGRAM_VIRT: u32 = 0x0800_0000;

/// Load offset of a program image inside its 4 MB window.
pub const PROGRAM_IMAGE_OFFSET: u32 = 0x4_8000;

/// Initial user stack pointer: the top of the program window.
pub const USER_STACK_TOP: u32 = PROGRAM_VIRT + LARGE_PAGE_SIZE as u32;

/// Virtual page handed to user programs by `vidmap`. Chosen well above the
/// program window so the two never overlap.
pub const USER_VIDEO_VIRT: u32 = 0x1000_0000;

/// Top of the kernel-stack region; process 0's stack grows down from here.
pub const KERNEL_STACK_REGION_TOP: u32 = 0x80_0000;

/// Size of one per-process kernel stack block.
pub const KERNEL_STACK_SIZE: u32 = 0x2000;

/// Physical base of the first program frame (directly above the kernel
/// stacks at 8 MB).
pub const PROGRAM_FRAME_BASE: u32 = 0x80_0000;

/// Physical 4 MB frame dedicated to a process id.
pub const fn program_frame(pid: usize) -> u32 {
    PROGRAM_FRAME_BASE + (pid as u32) * LARGE_PAGE_SIZE as u32
}

/// Top of the private kernel stack for a process id. A privilege-level
/// transition taken while `pid` runs lands here via TSS `esp0`.
pub const fn kernel_stack_top(pid: usize) -> u32 {
    KERNEL_STACK_REGION_TOP - (pid as u32) * KERNEL_STACK_SIZE
}

/// Physical page backing a terminal's off-screen video buffer.
pub const fn terminal_video_buffer(terminal: usize) -> u32 {
    TERMINAL_VIDEO_BASE + (terminal as u32) * PAGE_SIZE as u32
}

#[inline]
pub const fn is_large_page_aligned(addr: u32) -> bool {
    addr & (LARGE_PAGE_SIZE as u32 - 1) == 0
}

#[inline]
pub const fn is_page_aligned(addr: u32) -> bool {
    addr & (PAGE_SIZE as u32 - 1) == 0
}
