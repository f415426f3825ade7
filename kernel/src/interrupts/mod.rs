//! IDT construction and interrupt-controller bring-up
//!
//! The vector map is fixed: CPU exceptions in 0..32, the chained 8259s
//! remapped to 0x20..0x30 (timer, keyboard, RTC), and `int 0x80` for
//! system calls with a ring 3 gate. Handlers for the hardware lines and
//! the syscall gate are registered by the owning modules; this one only
//! owns the table.

pub mod exceptions;
pub mod pic;
pub mod timer;

use conquer_once::spin::OnceCell;
use spin::Mutex;
use x86::dtables::{lidt, DescriptorTablePointer};
use x86::segmentation::{
    BuildDescriptor, Descriptor, DescriptorBuilder, GateDescriptorBuilder, SegmentSelector,
};
use x86::Ring;

use crate::gdt;

pub const PIC_PRIMARY_OFFSET: u8 = 0x20;
pub const PIC_SECONDARY_OFFSET: u8 = PIC_PRIMARY_OFFSET + 8;

/// Software interrupt vector for system calls.
pub const SYSCALL_VECTOR: u8 = 0x80;

pub static PICS: Mutex<pic::ChainedPics> =
    Mutex::new(pic::ChainedPics::new(PIC_PRIMARY_OFFSET, PIC_SECONDARY_OFFSET));

/// Hardware interrupt vectors after PIC remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_PRIMARY_OFFSET,
    Keyboard = PIC_PRIMARY_OFFSET + 1,
    Rtc = PIC_SECONDARY_OFFSET,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn irq(self) -> u8 {
        self.as_u8() - PIC_PRIMARY_OFFSET
    }
}

/// Processor state pushed for an interrupt. The stack pointer and segment
/// at the end are only pushed (and popped) on a privilege-level change.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptStackFrame {
    pub instruction_pointer: u32,
    pub code_segment: u32,
    pub cpu_flags: u32,
    pub stack_pointer: u32,
    pub stack_segment: u32,
}

impl InterruptStackFrame {
    /// Did this interrupt arrive from ring 3?
    pub fn from_user_mode(&self) -> bool {
        self.code_segment & 0x3 == 0x3
    }
}

pub type HandlerFn = extern "x86-interrupt" fn(InterruptStackFrame);
pub type HandlerWithErrorFn = extern "x86-interrupt" fn(InterruptStackFrame, u32);

const IDT_ENTRIES: usize = 256;

#[repr(C, align(8))]
pub struct InterruptDescriptorTable {
    entries: [Descriptor; IDT_ENTRIES],
}

impl InterruptDescriptorTable {
    fn new() -> Self {
        InterruptDescriptorTable {
            entries: [Descriptor::NULL; IDT_ENTRIES],
        }
    }

    fn set_gate(&mut self, index: u8, handler_addr: u32, code_sel: SegmentSelector, dpl: Ring) {
        self.entries[index as usize] =
            <DescriptorBuilder as GateDescriptorBuilder<u32>>::interrupt_descriptor(
                code_sel,
                handler_addr,
            )
            .present()
            .dpl(dpl)
            .finish();
    }

    fn set_handler(&mut self, index: u8, handler: HandlerFn) {
        self.set_gate(index, handler as usize as u32, gdt::KERNEL_CODE_SEL, Ring::Ring0);
    }

    fn set_handler_with_error(&mut self, index: u8, handler: HandlerWithErrorFn) {
        self.set_gate(index, handler as usize as u32, gdt::KERNEL_CODE_SEL, Ring::Ring0);
    }

    /// Register a raw assembly entry point. Used for the timer and the
    /// syscall gate, whose entry paths manage the full register frame
    /// themselves.
    fn set_raw_handler(&mut self, index: u8, entry: u32, dpl: Ring) {
        self.set_gate(index, entry, gdt::KERNEL_CODE_SEL, dpl);
    }

    unsafe fn load(&self) {
        let ptr = DescriptorTablePointer::<Self>::new(self);
        lidt(&ptr);
    }
}

static IDT: OnceCell<InterruptDescriptorTable> = OnceCell::uninit();

pub fn init() {
    IDT.init_once(|| {
        let mut idt = InterruptDescriptorTable::new();
        exceptions::install(&mut idt);

        idt.set_raw_handler(
            InterruptIndex::Timer.as_u8(),
            timer::timer_entry as usize as u32,
            Ring::Ring0,
        );
        idt.set_handler(
            InterruptIndex::Keyboard.as_u8(),
            crate::drivers::keyboard::keyboard_interrupt_handler,
        );
        idt.set_handler(InterruptIndex::Rtc.as_u8(), crate::drivers::rtc::rtc_interrupt_handler);

        // the one gate user code may raise directly
        idt.set_raw_handler(
            SYSCALL_VECTOR,
            crate::syscall::handler::syscall_entry as usize as u32,
            Ring::Ring3,
        );

        idt
    });

    unsafe {
        IDT.get().expect("IDT just initialized").load();
    }
    log::info!("IDT loaded ({} vectors)", IDT_ENTRIES);
}

pub fn init_pic() {
    unsafe {
        PICS.lock().initialize();
    }
    log::info!(
        "PICs remapped to {:#x}/{:#x}",
        PIC_PRIMARY_OFFSET,
        PIC_SECONDARY_OFFSET
    );
}

#[inline]
pub fn enable() {
    unsafe {
        x86::irq::enable();
    }
}

#[inline]
pub fn disable() {
    unsafe {
        x86::irq::disable();
    }
}

/// Is the interrupt flag currently set?
#[inline]
pub fn are_enabled() -> bool {
    let eflags: u32;
    unsafe {
        core::arch::asm!("pushfd", "pop {}", out(reg) eflags, options(nomem, preserves_flags));
    }
    eflags & 0x200 != 0
}

/// Run `f` with interrupts masked, restoring the previous state after.
/// Every process-wide lock in the kernel is taken through this bracket:
/// the timer path takes the same locks, so holding one with interrupts
/// open would deadlock the single CPU.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let were_enabled = are_enabled();
    if were_enabled {
        disable();
    }
    let result = f();
    if were_enabled {
        enable();
    }
    result
}
