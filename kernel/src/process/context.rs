//! Kernel/user context transfer
//!
//! Two one-way doors, both built on a saved kernel stack pointer:
//!
//! * `enter_user_program` records the calling kernel context in the new
//!   process's PCB and drops to ring 3 through `iretd`. The recorded
//!   context is the continuation that eventually receives the process's
//!   exit status: `enter_user_program` "returns" only when `halt` jumps
//!   back into it.
//! * `resume_execute_context` is that jump: it abandons the current
//!   kernel stack, adopts the saved one, and makes `enter_user_program`
//!   return the exit status to its original caller.
//!
//! The timer path's stack swap lives in `interrupts::timer`; everything
//! else in the kernel manipulates contexts only through these functions.

use core::arch::global_asm;

global_asm!(
    r#"
.global enter_user_program
.global resume_execute_context

// enter_user_program(user_esp, user_eip) -> i32
//
// Saves the callee-saved half of this kernel context, records ESP in the
// active PCB, then builds a ring-3 interrupt frame and leaves through
// iretd with interrupts enabled. The matching return path is
// resume_execute_context below.
enter_user_program:
    push ebp
    push ebx
    push esi
    push edi
    mov eax, esp
    push eax
    call store_execute_context
    add esp, 4

    mov eax, [esp + 20]        // user_esp (4 saves + return address)
    mov edx, [esp + 24]        // user_eip
    mov cx, 0x23               // user data selector, RPL 3
    mov ds, cx
    mov es, cx
    mov fs, cx
    mov gs, cx
    push 0x23                  // ss
    push eax                   // esp
    pushfd
    pop eax
    or eax, 0x200              // resume ring 3 with IF set
    push eax
    push 0x1B                  // user code selector, RPL 3
    push edx                   // eip
    iretd

// resume_execute_context(saved_esp, status) -> !
//
// Adopts the kernel context recorded by enter_user_program and returns
// `status` as that call's value. The current stack is simply abandoned.
resume_execute_context:
    mov eax, [esp + 8]         // status
    mov esp, [esp + 4]         // saved context: edi at the top
    pop edi
    pop esi
    pop ebx
    pop ebp
    ret
"#
);

extern "C" {
    /// Transfer to user mode at `user_eip` with stack `user_esp`; the
    /// eventual return value is the exit status delivered by `halt`.
    pub fn enter_user_program(user_esp: u32, user_eip: u32) -> i32;

    /// Resume a context saved by `enter_user_program`, delivering
    /// `status`. Never returns to the caller.
    pub fn resume_execute_context(saved_esp: u32, status: i32) -> !;
}

/// Called from the `enter_user_program` prologue: record the pre-transfer
/// kernel stack pointer in the PCB of the process being launched (already
/// installed as current by `execute`).
#[no_mangle]
extern "C" fn store_execute_context(kernel_esp: u32) {
    let stored = crate::process::with_active_pcb(|pcb| pcb.execute_esp = kernel_esp);
    if stored.is_none() {
        panic!("user-mode transfer with no active process");
    }
}
