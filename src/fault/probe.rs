//! Fault-Recoverable Loads and Stores.
//!
//! Each access is a single load or store in inline assembly with a recovery
//! label right after it. Before touching memory the probe publishes two
//! addresses: the access instruction and the recovery label. If SIGBUS lands
//! on exactly that instruction, the signal handler rewrites the saved program
//! counter to the recovery label, which sets the fault flag and falls out of
//! the asm block. The kernel restores every other register on return from
//! the handler, so the compiler-visible state stays consistent.
//!
//! Callers must hold the `FaultGuard` access lock: the published addresses
//! are global.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::Fault;

/// `[access instruction, recovery label]` of the probe in flight; zero when idle.
static SLOTS: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];

#[inline]
fn disarm() {
    SLOTS[0].store(0, Ordering::Relaxed);
    SLOTS[1].store(0, Ordering::Relaxed);
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod arch {
    use std::arch::asm;

    use super::{disarm, Fault, SLOTS};

    pub(crate) const RECOVERY_SUPPORTED: bool = true;

    #[inline(never)]
    pub(crate) unsafe fn load(ptr: *const u32) -> Result<u32, Fault> {
        let value: u32;
        let faulted: u32;
        asm!(
            "lea {tmp}, [rip + 2f]",
            "mov qword ptr [{slots}], {tmp}",
            "lea {tmp}, [rip + 3f]",
            "mov qword ptr [{slots} + 8], {tmp}",
            "xor {flt:e}, {flt:e}",
            "2:",
            "mov {val:e}, dword ptr [{ptr}]",
            "jmp 4f",
            "3:",
            "mov {flt:e}, 1",
            "4:",
            slots = in(reg) SLOTS.as_ptr(),
            ptr = in(reg) ptr,
            tmp = out(reg) _,
            val = out(reg) value,
            flt = out(reg) faulted,
            options(nostack),
        );
        disarm();
        if faulted == 0 {
            Ok(value)
        } else {
            Err(Fault)
        }
    }

    #[inline(never)]
    pub(crate) unsafe fn store(ptr: *mut u32, value: u32) -> Result<(), Fault> {
        let faulted: u32;
        asm!(
            "lea {tmp}, [rip + 2f]",
            "mov qword ptr [{slots}], {tmp}",
            "lea {tmp}, [rip + 3f]",
            "mov qword ptr [{slots} + 8], {tmp}",
            "xor {flt:e}, {flt:e}",
            "2:",
            "mov dword ptr [{ptr}], {val:e}",
            "jmp 4f",
            "3:",
            "mov {flt:e}, 1",
            "4:",
            slots = in(reg) SLOTS.as_ptr(),
            ptr = in(reg) ptr,
            val = in(reg) value,
            tmp = out(reg) _,
            flt = out(reg) faulted,
            options(nostack),
        );
        disarm();
        if faulted == 0 {
            Ok(())
        } else {
            Err(Fault)
        }
    }

    pub(crate) unsafe fn program_counter(ctx: *mut libc::c_void) -> *mut libc::greg_t {
        let uc = ctx.cast::<libc::ucontext_t>();
        &mut (*uc).uc_mcontext.gregs[libc::REG_RIP as usize]
    }
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
mod arch {
    use std::arch::asm;

    use super::{disarm, Fault, SLOTS};

    pub(crate) const RECOVERY_SUPPORTED: bool = true;

    #[inline(never)]
    pub(crate) unsafe fn load(ptr: *const u32) -> Result<u32, Fault> {
        let value: u32;
        let faulted: u32;
        asm!(
            "adr {tmp}, 2f",
            "str {tmp}, [{slots}]",
            "adr {tmp}, 3f",
            "str {tmp}, [{slots}, #8]",
            "mov {flt:w}, #0",
            "2:",
            "ldr {val:w}, [{ptr}]",
            "b 4f",
            "3:",
            "mov {flt:w}, #1",
            "4:",
            slots = in(reg) SLOTS.as_ptr(),
            ptr = in(reg) ptr,
            tmp = out(reg) _,
            val = out(reg) value,
            flt = out(reg) faulted,
            options(nostack),
        );
        disarm();
        if faulted == 0 {
            Ok(value)
        } else {
            Err(Fault)
        }
    }

    #[inline(never)]
    pub(crate) unsafe fn store(ptr: *mut u32, value: u32) -> Result<(), Fault> {
        let faulted: u32;
        asm!(
            "adr {tmp}, 2f",
            "str {tmp}, [{slots}]",
            "adr {tmp}, 3f",
            "str {tmp}, [{slots}, #8]",
            "mov {flt:w}, #0",
            "2:",
            "str {val:w}, [{ptr}]",
            "b 4f",
            "3:",
            "mov {flt:w}, #1",
            "4:",
            slots = in(reg) SLOTS.as_ptr(),
            ptr = in(reg) ptr,
            val = in(reg) value,
            tmp = out(reg) _,
            flt = out(reg) faulted,
            options(nostack),
        );
        disarm();
        if faulted == 0 {
            Ok(())
        } else {
            Err(Fault)
        }
    }

    pub(crate) unsafe fn program_counter(ctx: *mut libc::c_void) -> *mut u64 {
        let uc = ctx.cast::<libc::ucontext_t>();
        std::ptr::addr_of_mut!((*uc).uc_mcontext.pc).cast::<u64>()
    }
}

#[cfg(not(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
)))]
mod arch {
    use super::Fault;

    pub(crate) const RECOVERY_SUPPORTED: bool = false;

    pub(crate) unsafe fn load(ptr: *const u32) -> Result<u32, Fault> {
        Ok(std::ptr::read_volatile(ptr))
    }

    pub(crate) unsafe fn store(ptr: *mut u32, value: u32) -> Result<(), Fault> {
        std::ptr::write_volatile(ptr, value);
        Ok(())
    }

    pub(crate) unsafe fn program_counter(_ctx: *mut libc::c_void) -> *mut usize {
        std::ptr::null_mut()
    }
}

pub(crate) use arch::{load, store, RECOVERY_SUPPORTED};

/// Redirects a faulting probe to its recovery label.
///
/// Called from the SIGBUS handler with the handler's `ucontext_t` pointer.
///
/// # Returns
///
/// `true` if the fault happened on the armed probe instruction and the saved
/// program counter was rewritten; `false` if the fault belongs to someone else.
pub(crate) unsafe fn recover(ctx: *mut libc::c_void) -> bool {
    let fault_pc = SLOTS[0].load(Ordering::Relaxed);
    if fault_pc == 0 || ctx.is_null() {
        return false;
    }
    let pc = arch::program_counter(ctx);
    if pc.is_null() || *pc as usize != fault_pc {
        return false;
    }
    *pc = SLOTS[1].load(Ordering::Relaxed) as _;
    true
}
