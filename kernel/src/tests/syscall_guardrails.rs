//! Syscall validation tests: descriptor range and direction rules, the
//! reserved stdin/stdout slots, and buffer checks. Everything runs
//! against a fabricated active process so the real lookup paths execute.

use crate::process::pcb::{FdEntry, FdKind, ProcessId};
use crate::process::scheduler::with_scheduler;
use crate::process::with_pcbs;
use crate::syscall::handlers;
use crate::syscall::table;

pub fn run() {
    super::install_test_image();
    let pid = setup_process();

    test_reserved_slots();
    test_fd_range();
    test_buffer_validation();
    test_stdout_write();
    test_getargs();
    test_open_close_lifecycle();
    test_directory_read_advances_one_entry();

    teardown_process(pid);
    log::info!("syscall guardrail tests passed");
}

/// Stand up a process the way `execute` would, minus the user-mode
/// transfer: PCB, slot, stdin/stdout bindings.
fn setup_process() -> ProcessId {
    with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            let pid = pcbs.create(0, None).unwrap();
            let pcb = pcbs.get_mut(pid);
            pcb.files[0] = FdEntry::bind(&table::TERMINAL_OPS, FdKind::Terminal, 0);
            pcb.files[1] = FdEntry::bind(&table::TERMINAL_OPS, FdKind::Terminal, 0);
            sched.set_current(Some(pid));
            pid
        })
    })
}

fn teardown_process(pid: ProcessId) {
    with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            sched.set_current(None);
            pcbs.remove(pid);
        })
    });
}

fn test_reserved_slots() {
    // stdin and stdout can never be closed;
    assert!(handlers::sys_close(0).is_err());
    assert!(handlers::sys_close(1).is_err());
    // stdout cannot be read, stdin cannot be written.
    let mut buf = [0u8; 8];
    assert!(handlers::sys_read(1, buf.as_mut_ptr() as u32, 8).is_err());
    assert!(handlers::sys_write(0, buf.as_ptr() as u32, 8).is_err());
}

fn test_fd_range() {
    let mut buf = [0u8; 8];
    for fd in [8u32, 9, 100, u32::MAX] {
        assert!(handlers::sys_read(fd, buf.as_mut_ptr() as u32, 8).is_err());
        assert!(handlers::sys_write(fd, buf.as_ptr() as u32, 8).is_err());
        assert!(handlers::sys_close(fd).is_err());
    }
    // In range but not open.
    assert!(handlers::sys_read(5, buf.as_mut_ptr() as u32, 8).is_err());
    assert!(handlers::sys_close(5).is_err());
}

fn test_buffer_validation() {
    // Null buffers fail before any driver runs, including on stdin,
    // where a real read would block.
    assert!(handlers::sys_read(0, 0, 8).is_err());
    assert!(handlers::sys_write(1, 0, 8).is_err());
    // Negative lengths are rejected as such.
    let mut buf = [0u8; 8];
    assert!(handlers::sys_read(0, buf.as_mut_ptr() as u32, 0x8000_0000).is_err());
    assert!(handlers::sys_write(1, buf.as_ptr() as u32, u32::MAX).is_err());
}

fn test_stdout_write() {
    let message = b"self-test: stdout write\n";
    let written = handlers::sys_write(1, message.as_ptr() as u32, message.len() as u32)
        .expect("stdout write should succeed");
    assert_eq!(written as usize, message.len());
}

fn test_getargs() {
    let mut buf = [0u8; 32];
    // No arguments were stored for this process.
    assert!(handlers::sys_getargs(buf.as_mut_ptr() as u32, 32).is_err());

    with_pcbs(|pcbs| {
        let pid = crate::process::active_pid().unwrap();
        pcbs.get_mut(pid).set_args(b"alpha beta");
    });
    // Too small for the arguments plus the terminator.
    assert!(handlers::sys_getargs(buf.as_mut_ptr() as u32, 10).is_err());
    assert_eq!(handlers::sys_getargs(buf.as_mut_ptr() as u32, 32), Ok(0));
    assert_eq!(&buf[..11], b"alpha beta\0");
}

fn test_open_close_lifecycle() {
    let name = b"notelf\0";
    let fd = handlers::sys_open(name.as_ptr() as u32).expect("open a present file");
    assert!(fd >= 2, "0 and 1 are reserved");

    let mut buf = [0u8; 16];
    let count = handlers::sys_read(fd as u32, buf.as_mut_ptr() as u32, 16)
        .expect("read an open regular file");
    assert_eq!(count, 16);
    assert_eq!(&buf, b"plain text here!");

    // The read-only filesystem rejects writes through the bound table.
    assert!(handlers::sys_write(fd as u32, buf.as_ptr() as u32, 4).is_err());

    assert_eq!(handlers::sys_close(fd as u32), Ok(0));
    assert!(handlers::sys_close(fd as u32).is_err(), "double close fails");

    let missing = b"no-such-file\0";
    assert!(handlers::sys_open(missing.as_ptr() as u32).is_err());
}

fn test_directory_read_advances_one_entry() {
    let name = b".\0";
    let fd = handlers::sys_open(name.as_ptr() as u32).expect("open the directory") as u32;

    let mut buf = [0u8; 32];
    let names: [&[u8]; 4] = [b".", b"notelf", b"victim", b"subdir"];
    for expected in names.iter() {
        let len = handlers::sys_read(fd, buf.as_mut_ptr() as u32, 32)
            .expect("directory read") as usize;
        assert_eq!(&buf[..len], *expected, "one entry per read, in order");
    }
    // Exhausted: zero bytes from now on.
    assert_eq!(handlers::sys_read(fd, buf.as_mut_ptr() as u32, 32), Ok(0));

    assert_eq!(handlers::sys_close(fd), Ok(0));
}
