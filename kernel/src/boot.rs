//! Multiboot v1 handoff
//!
//! GRUB leaves the magic in EAX, an info pointer in EBX, and the
//! filesystem image as the first module. The module lands below 8 MB, so
//! it stays reachable through the kernel's identity mappings after paging
//! comes on.

/// Value GRUB leaves in EAX.
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

const INFO_MODS_VALID: u32 = 1 << 3;

#[repr(C)]
pub struct MultibootInfo {
    pub flags: u32,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: u32,
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
}

#[repr(C)]
pub struct MultibootModule {
    pub start: u32,
    pub end: u32,
    pub string: u32,
    pub reserved: u32,
}

/// Locate the filesystem image: the first Multiboot module.
pub fn filesystem_image(magic: u32, info_addr: u32) -> Result<&'static [u8], &'static str> {
    if magic != BOOTLOADER_MAGIC {
        return Err("not booted by a Multiboot loader");
    }
    if info_addr == 0 {
        return Err("null Multiboot info pointer");
    }
    let info = unsafe { &*(info_addr as *const MultibootInfo) };
    if info.flags & INFO_MODS_VALID == 0 || info.mods_count == 0 {
        return Err("boot loader provided no modules");
    }

    let module = unsafe { &*(info.mods_addr as *const MultibootModule) };
    if module.end <= module.start {
        return Err("degenerate module range");
    }
    let len = (module.end - module.start) as usize;
    log::info!(
        "filesystem module at {:#x}, {} bytes",
        module.start,
        len
    );
    Ok(unsafe { core::slice::from_raw_parts(module.start as *const u8, len) })
}
