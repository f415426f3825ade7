//! Execute/halt protocol tests: the executable gate and the halt
//! bookkeeping, exercised without actually entering user mode.

use crate::process::exec::{detach_current_process, execute};
use crate::process::pcb::{FdEntry, FdKind};
use crate::process::scheduler::with_scheduler;
use crate::process::with_pcbs;
use crate::syscall::table;

pub fn run() {
    super::install_test_image();
    test_execute_rejects_unknown_name();
    test_execute_rejects_directory();
    test_magic_number_gate();
    test_execute_failure_is_collapsed();
    test_halt_bookkeeping_returns_to_parent();
    log::info!("exec tests passed");
}

fn assert_no_residue() {
    let occupied = with_pcbs(|pcbs| pcbs.occupied_count());
    assert_eq!(occupied, 0, "a failed execute must leave no PCB behind");
    let slot = with_scheduler(|sched| sched.current_pid());
    assert!(slot.is_none(), "a failed execute must leave the slot alone");
}

fn test_execute_rejects_unknown_name() {
    assert!(execute(b"no-such-program").is_err());
    assert!(execute(b"").is_err());
    assert!(execute(b"   ").is_err());
    assert_no_residue();
}

fn test_execute_rejects_directory() {
    assert!(execute(b"subdir").is_err());
    assert_no_residue();
}

fn test_magic_number_gate() {
    // Valid dentry, valid inode, readable data, but the first four
    // bytes are wrong, so it must never launch.
    assert!(execute(b"notelf").is_err());
    assert!(execute(b"notelf with args").is_err());
    assert_no_residue();
}

fn test_execute_failure_is_collapsed() {
    // Fill the pool so a perfectly valid image fails on allocation. The
    // caller sees the same single failure as for a bad name or magic.
    let pids: [_; 8] = core::array::from_fn(|_| {
        with_pcbs(|pcbs| pcbs.create(0, None).unwrap())
    });

    assert!(execute(b"victim").is_err());

    with_pcbs(|pcbs| {
        assert_eq!(pcbs.occupied_count(), 8, "the failed launch freed nothing");
        for pid in pids {
            pcbs.remove(pid);
        }
    });
}

fn test_halt_bookkeeping_returns_to_parent() {
    const CONTINUATION: u32 = 0x7FC0_DE00;

    let (parent, child) = with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            let parent = pcbs.create(0, None).unwrap();
            let child = pcbs.create(0, Some(parent)).unwrap();
            {
                let pcb = pcbs.get_mut(child);
                pcb.execute_esp = CONTINUATION;
                pcb.files[0] = FdEntry::bind(&table::TERMINAL_OPS, FdKind::Terminal, 0);
                pcb.files[1] = FdEntry::bind(&table::TERMINAL_OPS, FdKind::Terminal, 0);
            }
            sched.set_current(Some(child));
            (parent, child)
        })
    });

    let (halted, halted_parent, continuation) =
        detach_current_process().expect("an active process must detach");
    assert_eq!(halted, child);
    assert_eq!(halted_parent, Some(parent));
    assert_eq!(
        continuation, CONTINUATION,
        "the parent's execute call site is what halt resumes"
    );

    with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            assert_eq!(
                sched.current_pid(),
                Some(parent),
                "the slot now schedules the parent"
            );
            assert!(!pcbs.is_occupied(child), "the child's id is free again");
            assert!(pcbs.is_occupied(parent));

            sched.set_current(None);
            pcbs.remove(parent);
        })
    });
}
