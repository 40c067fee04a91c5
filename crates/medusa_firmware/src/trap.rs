//! RISC-V machine-mode trap handler.
//!
//! The command loop polls everything, so the only interrupt that can fire
//! is the machine timer; it is silenced by pushing `mtimecmp` far into the
//! future. Exceptions are reported and halt the controller, since the
//! register state of the chip can no longer be trusted.

use medusa_common::mmio::{MTIME_ADDR, MTIMECMP_ADDR, MTIME_HZ};
use riscv::register::mcause::{self, Interrupt, Trap};
use riscv::register::{mepc, mtval};

/// Trap handler called from the assembly trap vector.
///
/// # Safety
///
/// Called only from the trap vector in `entry.S`, which saves and restores
/// the caller-saved registers around it.
#[unsafe(no_mangle)]
pub extern "C" fn rust_trap_handler() {
    match mcause::read().cause() {
        Trap::Interrupt(Interrupt::MachineTimer) => unsafe {
            let now = (MTIME_ADDR as *const u64).read_volatile();
            (MTIMECMP_ADDR as *mut u64).write_volatile(now + 10 * MTIME_HZ);
        },
        Trap::Interrupt(other) => {
            log::warn!("spurious interrupt {:?}", other);
        }
        Trap::Exception(e) => {
            crate::println!(
                "STATUS:ERROR:TRAP {:?} at 0x{:x} (mtval 0x{:x})",
                e,
                mepc::read(),
                mtval::read()
            );
            loop {
                core::hint::spin_loop();
            }
        }
    }
}
