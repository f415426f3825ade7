//! PCB arena tests: id allocation, reuse, and exhaustion.

use crate::memory::layout::MAX_PROCESSES;
use crate::process::pcb::ProcessId;
use crate::process::with_pcbs;

pub fn run() {
    test_id_allocation_and_exhaustion();
    test_id_reuse();
    test_slot_reinitialized_on_create();
    log::info!("pcb tests passed");
}

fn test_id_allocation_and_exhaustion() {
    with_pcbs(|pcbs| {
        assert_eq!(pcbs.occupied_count(), 0, "tests must start with an empty pool");

        for expected in 0..MAX_PROCESSES {
            let pid = pcbs.create(0, None).expect("pool should have room");
            assert_eq!(pid.as_usize(), expected, "ids hand out lowest-first");
            assert!(pcbs.is_occupied(pid));
        }
        assert!(
            pcbs.create(0, None).is_err(),
            "ninth create must fail, not wait"
        );

        for id in 0..MAX_PROCESSES {
            pcbs.remove(ProcessId::new(id));
        }
        assert_eq!(pcbs.occupied_count(), 0);
    });
}

fn test_id_reuse() {
    with_pcbs(|pcbs| {
        let a = pcbs.create(0, None).unwrap();
        let b = pcbs.create(0, None).unwrap();
        let c = pcbs.create(0, None).unwrap();

        pcbs.remove(b);
        assert!(!pcbs.is_occupied(b));
        assert!(pcbs.is_occupied(a) && pcbs.is_occupied(c));

        let reused = pcbs.create(1, Some(a)).unwrap();
        assert_eq!(reused, b, "the freed id is the lowest and comes back first");
        assert_eq!(pcbs.get(reused).terminal, 1);
        assert_eq!(pcbs.get(reused).parent, Some(a));

        pcbs.remove(a);
        pcbs.remove(b);
        pcbs.remove(c);
    });
}

fn test_slot_reinitialized_on_create() {
    with_pcbs(|pcbs| {
        let pid = pcbs.create(2, None).unwrap();
        {
            let pcb = pcbs.get_mut(pid);
            pcb.set_args(b"stale arguments");
            pcb.execute_esp = 0xDEAD_BEEF;
            pcb.sched_esp = 0xCAFE_F00D;
        }
        pcbs.remove(pid);

        // remove leaves the storage alone; the next create must not.
        let again = pcbs.create(0, None).unwrap();
        assert_eq!(again, pid);
        let pcb = pcbs.get(again);
        assert!(pcb.args().is_empty());
        assert_eq!(pcb.execute_esp, 0);
        assert_eq!(pcb.sched_esp, 0);
        assert_eq!(pcb.terminal, 0);
        assert!(pcb.files.iter().all(|f| !f.in_use));

        pcbs.remove(again);
    });
}
