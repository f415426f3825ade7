//! Paging tests: program-window idempotence and the fail-fast guards.

use crate::memory::layout::{self, KERNEL_BASE, USER_VIDEO_VIRT, VIDEO_PHYS};
use crate::memory::paging::with_address_space;

pub fn run() {
    test_map_program_idempotent();
    test_rejects_misaligned_frame();
    test_refuses_kernel_unmap();
    test_video_window_retarget();
    log::info!("paging tests passed");
}

fn test_map_program_idempotent() {
    // A high frame no process owns; the window is remapped by every
    // process launch anyway.
    let frame = layout::program_frame(6);
    with_address_space(|space| {
        assert!(space.program_frame().is_none(), "window must start unmapped");

        space.map_program(frame).unwrap();
        let first = space.program_entry_raw();
        assert_eq!(space.program_frame(), Some(frame));

        space.map_program(frame).unwrap();
        assert_eq!(
            space.program_entry_raw(),
            first,
            "mapping the same frame twice changes nothing"
        );

        space.unmap_program_region(layout::PROGRAM_VIRT).unwrap();
        assert!(space.program_frame().is_none());
    });
}

fn test_rejects_misaligned_frame() {
    with_address_space(|space| {
        let before = space.program_entry_raw();
        assert!(space.map_program(layout::program_frame(1) + 0x1000).is_err());
        assert!(space.map_program(0x1234).is_err());
        assert_eq!(
            space.program_entry_raw(),
            before,
            "a rejected map must not touch the directory"
        );
    });
}

fn test_refuses_kernel_unmap() {
    with_address_space(|space| {
        assert!(space.unmap_program_region(KERNEL_BASE).is_err());
        assert!(space.unmap_program_region(KERNEL_BASE + 3).is_err());
    });
}

fn test_video_window_retarget() {
    with_address_space(|space| {
        space
            .bind_user_video_window(USER_VIDEO_VIRT, VIDEO_PHYS)
            .unwrap();
        assert_eq!(space.user_video_target(), Some(VIDEO_PHYS));

        space.retarget_video_window(1, false);
        assert_eq!(
            space.user_video_target(),
            Some(layout::terminal_video_buffer(1)),
            "background terminal writes land in its buffer"
        );

        space.retarget_video_window(1, true);
        assert_eq!(space.user_video_target(), Some(VIDEO_PHYS));

        // misaligned bindings are rejected outright
        assert!(space.bind_user_video_window(USER_VIDEO_VIRT + 1, VIDEO_PHYS).is_err());
        assert!(space.bind_user_video_window(KERNEL_BASE, VIDEO_PHYS).is_err());
    });
}
