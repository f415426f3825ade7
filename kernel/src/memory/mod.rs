//! Memory management: fixed layout, paging, and the kernel heap.

pub mod layout;
pub mod paging;

use linked_list_allocator::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Backing storage for the kernel heap. The core process/paging/scheduler
/// paths are fully static; the heap only serves ambient drivers (e.g. the
/// keyboard scancode queue).
const HEAP_SIZE: usize = 256 * 1024;

#[repr(C, align(4096))]
struct HeapRegion([u8; HEAP_SIZE]);

static mut HEAP_REGION: HeapRegion = HeapRegion([0; HEAP_SIZE]);

/// Enable paging and bring up the heap.
pub fn init() {
    paging::init();

    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_REGION) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    log::info!("kernel heap: {} KiB", HEAP_SIZE / 1024);
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap exhausted allocating {:?}", layout);
}
