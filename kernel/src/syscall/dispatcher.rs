//! System call dispatch
//!
//! Routes a validated call number to its handler and flattens every
//! failure into the single −1 sentinel the ABI promises. The underlying
//! reasons stay in the kernel log.

use super::handlers;
use super::{SyscallNumber, SYSCALL_FAILURE};

/// Rust side of the `int 0x80` entry.
///
/// Interrupts are re-enabled on entry: the caller was running with them
/// on, and blocking calls (terminal or RTC reads) rely on the timer and
/// device interrupts while they wait. `execute` and `halt` mask
/// interrupts themselves around their critical tails.
pub extern "C" fn syscall_dispatch(number: u32, arg1: u32, arg2: u32, arg3: u32) -> i32 {
    crate::interrupts::enable();

    let result = match SyscallNumber::from_u32(number) {
        Some(SyscallNumber::Halt) => handlers::sys_halt(arg1),
        Some(SyscallNumber::Execute) => handlers::sys_execute(arg1),
        Some(SyscallNumber::Read) => handlers::sys_read(arg1, arg2, arg3),
        Some(SyscallNumber::Write) => handlers::sys_write(arg1, arg2, arg3),
        Some(SyscallNumber::Open) => handlers::sys_open(arg1),
        Some(SyscallNumber::Close) => handlers::sys_close(arg1),
        Some(SyscallNumber::GetArgs) => handlers::sys_getargs(arg1, arg2),
        Some(SyscallNumber::Vidmap) => handlers::sys_vidmap(arg1),
        Some(SyscallNumber::SetHandler) => handlers::sys_set_handler(arg1, arg2),
        Some(SyscallNumber::SigReturn) => handlers::sys_sigreturn(),
        None => {
            log::warn!("invalid syscall number {}", number);
            Err("invalid syscall number")
        }
    };

    match result {
        Ok(value) => value,
        Err(err) => {
            log::debug!("syscall {} failed: {}", number, err);
            SYSCALL_FAILURE
        }
    }
}
