//! Scheduler tests: rotation fairness and the terminal-inheritance rule.

use crate::memory::layout::TERMINAL_COUNT;
use crate::process::exec::inherited_terminal;
use crate::process::scheduler::with_scheduler;
use crate::process::with_pcbs;

pub fn run() {
    test_round_robin_order_and_fairness();
    test_terminal_inheritance();
    log::info!("scheduler tests passed");
}

fn test_round_robin_order_and_fairness() {
    const CYCLES: usize = 32;
    with_scheduler(|sched| {
        let start = sched.running_index();
        let mut visits = [0usize; TERMINAL_COUNT];
        let mut previous = start;

        for _ in 0..CYCLES * TERMINAL_COUNT {
            let index = sched.advance();
            assert_eq!(
                index,
                (previous + 1) % TERMINAL_COUNT,
                "rotation must follow the fixed cyclic order"
            );
            visits[index] += 1;
            previous = index;
        }

        assert!(
            visits.iter().all(|&count| count == CYCLES),
            "every slot is visited exactly once per full cycle"
        );
        assert_eq!(
            sched.running_index(),
            start,
            "a whole number of cycles returns to the start"
        );
    });
}

fn test_terminal_inheritance() {
    with_scheduler(|sched| {
        with_pcbs(|pcbs| {
            // A terminal's first process takes the slot index being
            // scheduled, wherever the display happens to be.
            let first = inherited_terminal(None, sched, pcbs);
            assert_eq!(first, sched.running_index());

            // A child follows its parent's terminal, not the display.
            let parent = pcbs.create(2, None).unwrap();
            assert_ne!(
                crate::drivers::terminal::displayed(),
                2,
                "test premise: terminal 2 is off-screen"
            );
            assert_eq!(inherited_terminal(Some(parent), sched, pcbs), 2);
            pcbs.remove(parent);
        });
    });
}
