//! In-kernel test suite (cargo feature `testing`)
//!
//! Runs from `kernel_main` after the subsystems are up but before the
//! timer starts ticking and before any process exists, so every test
//! leaves global state exactly as it found it. Failures assert; a clean
//! run logs a summary and boot continues into the first shell.

mod exec;
mod paging;
mod pcb;
mod scheduler;
mod syscall_guardrails;

use crate::fs::BLOCK_SIZE;

pub fn run_all() {
    log::info!("==== kernel self-tests ====");
    pcb::run();
    paging::run();
    scheduler::run();
    exec::run();
    syscall_guardrails::run();
    log::info!("==== kernel self-tests passed ====");
}

// A miniature filesystem image shared by the exec and syscall tests:
//   "."      directory
//   "subdir" directory
//   "notelf" regular file without the executable magic
//   "victim" regular file with a valid header (never actually run)
const IMAGE_BLOCKS: usize = 5; // boot block, 2 inodes, 2 data blocks
static mut IMAGE_BUF: [u8; BLOCK_SIZE * IMAGE_BLOCKS] = [0; BLOCK_SIZE * IMAGE_BLOCKS];

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_dentry(buf: &mut [u8], index: usize, name: &[u8], file_type: u32, inode: u32) {
    let base = 64 * (index + 1);
    buf[base..base + name.len()].copy_from_slice(name);
    write_u32(buf, base + 32, file_type);
    write_u32(buf, base + 36, inode);
}

/// Build and install the test image. The real boot image goes in after
/// the test run, so clobbering the filesystem here is fine.
pub(crate) fn install_test_image() {
    let buf = unsafe { &mut *core::ptr::addr_of_mut!(IMAGE_BUF) };
    buf.fill(0);

    // boot block: 4 dentries, 2 inodes, 2 data blocks
    write_u32(buf, 0, 4);
    write_u32(buf, 4, 2);
    write_u32(buf, 8, 2);
    write_dentry(buf, 0, b".", 1, 0);
    write_dentry(buf, 1, b"notelf", 2, 0);
    write_dentry(buf, 2, b"victim", 2, 1);
    write_dentry(buf, 3, b"subdir", 1, 0);

    // inode 0: "notelf", 16 bytes in data block 0
    write_u32(buf, BLOCK_SIZE, 16);
    write_u32(buf, BLOCK_SIZE + 4, 0);
    // inode 1: "victim", 32 bytes in data block 1
    write_u32(buf, 2 * BLOCK_SIZE, 32);
    write_u32(buf, 2 * BLOCK_SIZE + 4, 1);

    // data block 0: no executable magic
    buf[3 * BLOCK_SIZE..3 * BLOCK_SIZE + 16].copy_from_slice(b"plain text here!");
    // data block 1: proper magic and an entry point at offset 24
    buf[4 * BLOCK_SIZE..4 * BLOCK_SIZE + 4]
        .copy_from_slice(&crate::process::exec::EXECUTABLE_MAGIC);
    write_u32(buf, 4 * BLOCK_SIZE + 24, 0x0804_8000);

    let image =
        unsafe { core::slice::from_raw_parts(core::ptr::addr_of!(IMAGE_BUF) as *const u8, BLOCK_SIZE * IMAGE_BLOCKS) };
    crate::fs::install(image).expect("test image rejected");
}
