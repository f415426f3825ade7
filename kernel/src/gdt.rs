//! GDT and TSS setup
//!
//! Flat 32-bit segmentation: kernel and user code/data segments covering
//! the whole address space, plus one TSS. The TSS matters only for its
//! `esp0` field: the kernel stack pointer the CPU loads on any
//! ring 3 → ring 0 transition. Keeping `esp0` pointed at the *running*
//! process's private kernel stack is the scheduler's and exec path's job;
//! this module just owns the field.

use conquer_once::spin::OnceCell;
use core::sync::atomic::{AtomicPtr, Ordering};
use x86::bits32::task::TaskStateSegment;
use x86::dtables::{lgdt, DescriptorTablePointer};
use x86::segmentation::{
    load_ds, load_es, load_fs, load_gs, load_ss, BuildDescriptor, CodeSegmentType,
    DataSegmentType, Descriptor, DescriptorBuilder, GateDescriptorBuilder,
    SegmentDescriptorBuilder, SegmentSelector,
};
use x86::task::load_tr;
use x86::Ring;

pub const KERNEL_CODE_SEL: SegmentSelector = SegmentSelector::new(1, Ring::Ring0);
pub const KERNEL_DATA_SEL: SegmentSelector = SegmentSelector::new(2, Ring::Ring0);
pub const USER_CODE_SEL: SegmentSelector = SegmentSelector::new(3, Ring::Ring3);
pub const USER_DATA_SEL: SegmentSelector = SegmentSelector::new(4, Ring::Ring3);
pub const TSS_SEL: SegmentSelector = SegmentSelector::new(5, Ring::Ring0);

static TSS: OnceCell<TaskStateSegment> = OnceCell::uninit();
static GDT: OnceCell<GlobalDescriptorTable> = OnceCell::uninit();
static TSS_PTR: AtomicPtr<TaskStateSegment> = AtomicPtr::new(core::ptr::null_mut());

#[repr(C, align(8))]
pub struct GlobalDescriptorTable {
    null: Descriptor,
    kernel_code: Descriptor,
    kernel_data: Descriptor,
    user_code: Descriptor,
    user_data: Descriptor,
    tss_desc: Descriptor,
}

impl GlobalDescriptorTable {
    fn new() -> Self {
        let kernel_code =
            DescriptorBuilder::code_descriptor(0, 0xFFFFF, CodeSegmentType::ExecuteRead)
                .limit_granularity_4kb()
                .dpl(Ring::Ring0)
                .present()
                .db()
                .finish();

        let kernel_data =
            DescriptorBuilder::data_descriptor(0, 0xFFFFF, DataSegmentType::ReadWrite)
                .limit_granularity_4kb()
                .dpl(Ring::Ring0)
                .present()
                .db()
                .finish();

        let user_code =
            DescriptorBuilder::code_descriptor(0, 0xFFFFF, CodeSegmentType::ExecuteRead)
                .limit_granularity_4kb()
                .dpl(Ring::Ring3)
                .present()
                .db()
                .finish();

        let user_data = DescriptorBuilder::data_descriptor(0, 0xFFFFF, DataSegmentType::ReadWrite)
            .limit_granularity_4kb()
            .dpl(Ring::Ring3)
            .present()
            .db()
            .finish();

        let tss_desc = <DescriptorBuilder as GateDescriptorBuilder<u32>>::tss_descriptor(0, 0, true)
            .present()
            .finish();

        GlobalDescriptorTable {
            null: Descriptor::NULL,
            kernel_code,
            kernel_data,
            user_code,
            user_data,
            tss_desc,
        }
    }

    fn set_tss_desc(&mut self, base: u32, size_in_bytes: usize) {
        self.tss_desc.set_base_limit(base, size_in_bytes as u32 - 1);
    }

    unsafe fn load(&self) {
        let ptr = DescriptorTablePointer::<Self>::new(self);
        lgdt(&ptr);
    }
}

pub fn init() {
    TSS.init_once(|| {
        let mut tss = TaskStateSegment::new();
        tss.ss0 = KERNEL_DATA_SEL.bits();
        // esp0 is stale until the first execute() points it at a process
        // kernel stack; nothing reaches ring 3 before that.
        tss.esp0 = 0;
        // Push the I/O bitmap past the segment limit so no port is
        // user-accessible.
        tss.iobp_offset = core::mem::size_of::<TaskStateSegment>() as u16;
        tss
    });

    let tss_ref = TSS.get().expect("TSS just initialized");
    TSS_PTR.store(tss_ref as *const _ as *mut _, Ordering::Release);

    GDT.init_once(|| {
        let mut gdt = GlobalDescriptorTable::new();
        gdt.set_tss_desc(
            tss_ref as *const _ as u32,
            core::mem::size_of::<TaskStateSegment>(),
        );
        gdt
    });

    unsafe {
        GDT.get().expect("GDT just initialized").load();

        load_ss(KERNEL_DATA_SEL);
        load_ds(KERNEL_DATA_SEL);
        load_es(KERNEL_DATA_SEL);
        load_fs(KERNEL_DATA_SEL);
        load_gs(KERNEL_DATA_SEL);
        reload_cs();

        load_tr(TSS_SEL);
    }

    log::info!(
        "GDT loaded: kernel {:#x}/{:#x}, user {:#x}/{:#x}, TSS {:#x}",
        KERNEL_CODE_SEL.bits(),
        KERNEL_DATA_SEL.bits(),
        USER_CODE_SEL.bits(),
        USER_DATA_SEL.bits(),
        TSS_SEL.bits()
    );
}

/// Reload CS with the kernel code selector via a far return; there is no
/// mov to CS.
unsafe fn reload_cs() {
    core::arch::asm!(
        "push {sel}",
        "lea {tmp}, [2f]",
        "push {tmp}",
        "retf",
        "2:",
        sel = in(reg) u32::from(KERNEL_CODE_SEL.bits()),
        tmp = out(reg) _,
    );
}

/// Point TSS `esp0` at `stack_top`. Called by execute/halt and by the
/// scheduler right before control is handed to a process.
pub fn set_kernel_stack(stack_top: u32) {
    let tss_ptr = TSS_PTR.load(Ordering::Acquire);
    if tss_ptr.is_null() {
        panic!("TSS not initialized");
    }
    unsafe {
        (*tss_ptr).esp0 = stack_top;
    }
}
