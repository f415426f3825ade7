//! CPU exception handlers
//!
//! A fault raised by user code terminates the offending process with the
//! reserved exception status and resumes its parent; the kernel itself
//! survives every user-mode fault. A fault raised in kernel mode means the
//! kernel's own bookkeeping is broken, which is unrecoverable.

#![allow(improper_ctypes_definitions)]

use super::{InterruptDescriptorTable, InterruptStackFrame};
use x86::controlregs::cr2;
use x86::irq::{
    ALIGNMENT_CHECK_VECTOR, BOUND_RANGE_EXCEEDED_VECTOR, BREAKPOINT_VECTOR, DEBUG_VECTOR,
    DEVICE_NOT_AVAILABLE_VECTOR, DIVIDE_ERROR_VECTOR, DOUBLE_FAULT_VECTOR,
    GENERAL_PROTECTION_FAULT_VECTOR, INVALID_OPCODE_VECTOR, INVALID_TSS_VECTOR,
    MACHINE_CHECK_VECTOR, NONMASKABLE_INTERRUPT_VECTOR, OVERFLOW_VECTOR, PAGE_FAULT_VECTOR,
    SEGMENT_NOT_PRESENT_VECTOR, SIMD_FLOATING_POINT_VECTOR, STACK_SEGEMENT_FAULT_VECTOR,
    X87_FPU_VECTOR,
};

/// Terminate the faulting user process, or panic if the fault is ours.
fn fault(frame: &InterruptStackFrame, name: &'static str) -> ! {
    if frame.from_user_mode() {
        log::warn!(
            "user process fault: {} at {:#x}, forcing halt",
            name,
            frame.instruction_pointer
        );
        crate::process::exec::exception_halt();
    }
    panic!(
        "kernel-mode {} at {:#x} (flags {:#x})",
        name, frame.instruction_pointer, frame.cpu_flags
    );
}

macro_rules! exception {
    ($handler:ident, $name:expr) => {
        extern "x86-interrupt" fn $handler(frame: InterruptStackFrame) {
            fault(&frame, $name);
        }
    };
}

macro_rules! exception_with_error {
    ($handler:ident, $name:expr) => {
        extern "x86-interrupt" fn $handler(frame: InterruptStackFrame, error_code: u32) {
            if !frame.from_user_mode() {
                log::error!("{} error code {:#x}", $name, error_code);
            }
            fault(&frame, $name);
        }
    };
}

exception!(divide_error, "divide error");
exception!(debug, "debug exception");
exception!(non_maskable_interrupt, "non-maskable interrupt");
exception!(breakpoint, "breakpoint");
exception!(overflow, "overflow");
exception!(bound_range_exceeded, "bound range exceeded");
exception!(invalid_opcode, "invalid opcode");
exception!(device_not_available, "device not available");
exception!(x87_fpu_error, "x87 floating-point error");
exception!(simd_error, "SIMD floating-point error");
exception!(machine_check, "machine check");

exception_with_error!(double_fault, "double fault");
exception_with_error!(invalid_tss, "invalid TSS");
exception_with_error!(segment_not_present, "segment not present");
exception_with_error!(stack_segment_fault, "stack-segment fault");
exception_with_error!(general_protection_fault, "general protection fault");
exception_with_error!(alignment_check, "alignment check");

extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, error_code: u32) {
    let address = unsafe { cr2() };
    if !frame.from_user_mode() {
        log::error!("page fault address {:#x}, error code {:#x}", address, error_code);
    }
    fault(&frame, "page fault");
}

pub(super) fn install(idt: &mut InterruptDescriptorTable) {
    idt.set_handler(DIVIDE_ERROR_VECTOR, divide_error);
    idt.set_handler(DEBUG_VECTOR, debug);
    idt.set_handler(NONMASKABLE_INTERRUPT_VECTOR, non_maskable_interrupt);
    idt.set_handler(BREAKPOINT_VECTOR, breakpoint);
    idt.set_handler(OVERFLOW_VECTOR, overflow);
    idt.set_handler(BOUND_RANGE_EXCEEDED_VECTOR, bound_range_exceeded);
    idt.set_handler(INVALID_OPCODE_VECTOR, invalid_opcode);
    idt.set_handler(DEVICE_NOT_AVAILABLE_VECTOR, device_not_available);
    idt.set_handler(X87_FPU_VECTOR, x87_fpu_error);
    idt.set_handler(SIMD_FLOATING_POINT_VECTOR, simd_error);
    idt.set_handler(MACHINE_CHECK_VECTOR, machine_check);

    idt.set_handler_with_error(DOUBLE_FAULT_VECTOR, double_fault);
    idt.set_handler_with_error(INVALID_TSS_VECTOR, invalid_tss);
    idt.set_handler_with_error(SEGMENT_NOT_PRESENT_VECTOR, segment_not_present);
    idt.set_handler_with_error(STACK_SEGEMENT_FAULT_VECTOR, stack_segment_fault);
    idt.set_handler_with_error(GENERAL_PROTECTION_FAULT_VECTOR, general_protection_fault);
    idt.set_handler_with_error(PAGE_FAULT_VECTOR, page_fault);
    idt.set_handler_with_error(ALIGNMENT_CHECK_VECTOR, alignment_check);
}
