//! Page-directory management
//!
//! One statically allocated address space serves the whole kernel. The
//! directory holds three kinds of entries: entry 0 points at the low 4 KB
//! table (VGA text page plus the per-terminal back buffers at 3 MB),
//! entry 1 identity-maps the kernel's 4 MB page, and exactly one 4 MB user
//! entry backs the program window at `PROGRAM_VIRT`. That user entry is
//! rewritten (never duplicated) on every process switch, so at any
//! instant only the scheduled process's frame is visible there.
//!
//! All alignment and kernel-protection checks happen before any entry is
//! written; an inconsistent directory would be fatal to the whole system,
//! so these paths fail fast and mutate nothing.

use bitflags::bitflags;
use spin::Mutex;

use super::layout::{
    self, KERNEL_BASE, PAGE_SIZE, PROGRAM_VIRT, TABLE_ENTRIES, TERMINAL_COUNT, USER_VIDEO_VIRT,
    VIDEO_PHYS,
};

bitflags! {
    /// Bits shared by directory and table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        /// 4 MB page (directory entries only).
        const LARGE         = 1 << 7;
        const GLOBAL        = 1 << 8;
    }
}

/// A raw 32-bit directory or table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn absent() -> Self {
        Entry(0)
    }

    /// Build an entry from a page-aligned physical base and flag bits.
    pub fn new(base: u32, flags: EntryFlags) -> Self {
        Entry((base & !(PAGE_SIZE as u32 - 1)) | flags.bits())
    }

    pub fn is_present(self) -> bool {
        self.0 & EntryFlags::PRESENT.bits() != 0
    }

    pub fn base(self) -> u32 {
        self.0 & !(PAGE_SIZE as u32 - 1)
    }

    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }
}

#[repr(C, align(4096))]
struct PageTable {
    entries: [Entry; TABLE_ENTRIES],
}

impl PageTable {
    const fn empty() -> Self {
        PageTable {
            entries: [Entry::absent(); TABLE_ENTRIES],
        }
    }
}

const fn directory_index(virt: u32) -> usize {
    (virt >> 22) as usize
}

const fn table_index(virt: u32) -> usize {
    ((virt >> 12) & 0x3FF) as usize
}

/// The kernel's one and only address space: the directory plus the two
/// page tables it can point at. Constructed empty so it can live in .bss;
/// `init_kernel_mappings` fills in the permanent entries.
#[repr(C, align(4096))]
pub struct AddressSpace {
    directory: PageTable,
    /// Maps the 0–4 MB region: VGA text page and terminal back buffers.
    low_table: PageTable,
    /// Backs the single user-visible video page handed out by `vidmap`.
    user_video_table: PageTable,
}

impl AddressSpace {
    pub const fn new() -> Self {
        AddressSpace {
            directory: PageTable::empty(),
            low_table: PageTable::empty(),
            user_video_table: PageTable::empty(),
        }
    }

    /// Install the permanent boot-time mappings: entry 0 → low table
    /// (video page, terminal buffers), entry 1 → the global 4 MB kernel
    /// page. Everything else stays absent until a process needs it.
    pub fn init_kernel_mappings(&mut self) {
        let kernel_flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;

        let low_table_base = self.low_table.entries.as_ptr() as u32;
        self.directory.entries[0] = Entry::new(low_table_base, kernel_flags);
        self.directory.entries[1] = Entry::new(
            KERNEL_BASE,
            kernel_flags | EntryFlags::LARGE | EntryFlags::GLOBAL,
        );

        self.low_table.entries[table_index(VIDEO_PHYS)] =
            Entry::new(VIDEO_PHYS, kernel_flags | EntryFlags::NO_CACHE);
        for terminal in 0..TERMINAL_COUNT {
            let page = layout::terminal_video_buffer(terminal);
            self.low_table.entries[table_index(page)] =
                Entry::new(page, kernel_flags | EntryFlags::NO_CACHE);
        }
    }

    /// Point the user program window at a dedicated 4 MB frame.
    ///
    /// `frame` must be 4 MB aligned; a misaligned frame is a caller bug
    /// and is rejected before anything is written. Mapping the same frame
    /// twice is a no-op.
    pub fn map_program(&mut self, frame: u32) -> Result<(), &'static str> {
        if !layout::is_large_page_aligned(frame) {
            return Err("program frame is not 4 MB aligned");
        }
        self.directory.entries[directory_index(PROGRAM_VIRT)] = Entry::new(
            frame,
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER | EntryFlags::LARGE,
        );
        Ok(())
    }

    /// Clear a 4 MB directory entry. The kernel's own mapping is refused:
    /// unmapping it would take the kernel down with it.
    pub fn unmap_program_region(&mut self, virt: u32) -> Result<(), &'static str> {
        if !layout::is_large_page_aligned(virt) {
            return Err("virtual address is not 4 MB aligned");
        }
        if virt == KERNEL_BASE {
            return Err("refusing to unmap the kernel region");
        }
        self.directory.entries[directory_index(virt)] = Entry::absent();
        Ok(())
    }

    /// Map the 4 KB user video window at `virt_page` to `phys_page`.
    ///
    /// Installs the user video table into the directory on first use and
    /// leaves every other slot of that table absent, so a process gets
    /// exactly one video page.
    pub fn bind_user_video_window(
        &mut self,
        virt_page: u32,
        phys_page: u32,
    ) -> Result<(), &'static str> {
        if !layout::is_page_aligned(virt_page) || !layout::is_page_aligned(phys_page) {
            return Err("video window addresses must be page aligned");
        }
        if directory_index(virt_page) == directory_index(KERNEL_BASE) {
            return Err("video window may not alias the kernel region");
        }

        let user_flags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER;
        let table_base = self.user_video_table.entries.as_ptr() as u32;
        self.directory.entries[directory_index(virt_page)] = Entry::new(table_base, user_flags);

        let idx = table_index(virt_page);
        for (i, entry) in self.user_video_table.entries.iter_mut().enumerate() {
            *entry = if i == idx {
                Entry::new(phys_page, user_flags | EntryFlags::NO_CACHE)
            } else {
                Entry::absent()
            };
        }
        Ok(())
    }

    /// Re-aim the user video window for a terminal: the displayed terminal
    /// sees the real VGA page, background terminals see their own back
    /// buffer. Called on every terminal switch and every process switch.
    pub fn retarget_video_window(&mut self, terminal: usize, displayed: bool) {
        let target = if displayed {
            VIDEO_PHYS
        } else {
            layout::terminal_video_buffer(terminal)
        };
        let idx = table_index(USER_VIDEO_VIRT);
        let entry = &mut self.user_video_table.entries[idx];
        if entry.is_present() {
            *entry = Entry::new(target, entry.flags());
        }
    }

    /// Current physical base of the program window, if mapped.
    pub fn program_frame(&self) -> Option<u32> {
        let entry = self.directory.entries[directory_index(PROGRAM_VIRT)];
        entry.is_present().then(|| entry.base())
    }

    /// Raw program-window entry, for the idempotence checks in the test
    /// build.
    pub fn program_entry_raw(&self) -> u32 {
        self.directory.entries[directory_index(PROGRAM_VIRT)].0
    }

    /// Physical page the user video window currently resolves to.
    pub fn user_video_target(&self) -> Option<u32> {
        let entry = self.user_video_table.entries[table_index(USER_VIDEO_VIRT)];
        entry.is_present().then(|| entry.base())
    }

    fn directory_base(&self) -> u32 {
        self.directory.entries.as_ptr() as u32
    }
}

static ADDRESS_SPACE: Mutex<AddressSpace> = Mutex::new(AddressSpace::new());

/// Run `f` with the kernel address space locked and interrupts masked.
/// The paging lock is also taken from the timer path, so it must never be
/// held with interrupts enabled.
pub fn with_address_space<F, R>(f: F) -> R
where
    F: FnOnce(&mut AddressSpace) -> R,
{
    crate::interrupts::without_interrupts(|| f(&mut ADDRESS_SPACE.lock()))
}

/// Build the permanent kernel mappings and turn paging on. Runs exactly
/// once at boot; there is no error path because a failure here is a
/// boot-time fatal condition.
pub fn init() {
    use x86::controlregs::{cr0, cr0_write, cr4, cr4_write, cr3_write, Cr0, Cr4};

    let cr3 = {
        let mut space = ADDRESS_SPACE.lock();
        space.init_kernel_mappings();
        space.directory_base()
    };

    unsafe {
        cr4_write(cr4() | Cr4::CR4_ENABLE_PSE | Cr4::CR4_ENABLE_GLOBAL_PAGES);
        cr3_write(cr3 as u64);
        cr0_write(cr0() | Cr0::CR0_ENABLE_PAGING);
    }

    log::info!("paging enabled, directory at {:#x}", cr3);
}

/// Flush the TLB by reloading CR3, exactly as the hardware expects after
/// a directory rewrite.
pub fn flush_tlb() {
    use x86::controlregs::{cr3, cr3_write};
    unsafe {
        cr3_write(cr3());
    }
}

/// Rewrite the program window to `frame` and flush. This is the per-switch
/// fast path used by the scheduler and by execute/halt.
pub fn map_program(frame: u32) -> Result<(), &'static str> {
    with_address_space(|space| space.map_program(frame))?;
    flush_tlb();
    Ok(())
}

/// Clear a 4 MB mapping and flush.
pub fn unmap_program_region(virt: u32) -> Result<(), &'static str> {
    with_address_space(|space| space.unmap_program_region(virt))?;
    flush_tlb();
    Ok(())
}

/// Establish the user video window and flush.
pub fn bind_user_video_window(virt_page: u32, phys_page: u32) -> Result<(), &'static str> {
    with_address_space(|space| space.bind_user_video_window(virt_page, phys_page))?;
    flush_tlb();
    Ok(())
}

/// Point the user video window at the right physical page for `terminal`
/// and flush.
pub fn retarget_video_window(terminal: usize, displayed: bool) {
    with_address_space(|space| space.retarget_video_window(terminal, displayed));
    flush_tlb();
}
