//! Bus Fault Guard.
//!
//! A register access to an AXI slave that does not answer shows up in
//! userspace as SIGBUS. Left alone that kills the process. `FaultGuard`
//! installs a SIGBUS handler for as long as a guard is alive and runs every
//! register access through [`FaultGuard::protect`], so a fault on one of our
//! accesses becomes a [`Fault`] value instead.
//!
//! # Concurrency
//!
//! The resume state used by the handler is process-global, so only one
//! protected access may be in flight at a time. `protect` holds a global
//! lock for the whole closure; accesses from different threads (and from
//! different engines) are serialized. Do not call `protect` from inside a
//! `protect` closure: the lock is not reentrant.
//!
//! # Handler lifetime
//!
//! Installation is reference counted. The first guard saves whatever SIGBUS
//! action was installed before and the last guard to be restored puts it
//! back. Faults that do not come from a probe are forwarded to that saved
//! action.

mod probe;

use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use libc::{c_int, c_void, siginfo_t};

use crate::common::{Result, UioError};

/// A protected access raised SIGBUS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fault;

struct InstallState {
    guards: usize,
    previous: Option<libc::sigaction>,
}

static INSTALL: Mutex<InstallState> = Mutex::new(InstallState {
    guards: 0,
    previous: None,
});

static ACCESS_LOCK: Mutex<()> = Mutex::new(());

// Copies of the saved action readable from the signal handler without locking.
static PREV_HANDLER: AtomicUsize = AtomicUsize::new(libc::SIG_DFL);
static PREV_SIGINFO: AtomicBool = AtomicBool::new(false);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

extern "C" fn on_sigbus(sig: c_int, info: *mut siginfo_t, ctx: *mut c_void) {
    // SAFETY: `ctx` is the ucontext_t the kernel passed to an SA_SIGINFO handler.
    if unsafe { probe::recover(ctx) } {
        return;
    }
    forward(sig, info, ctx);
}

/// Sets the SIGBUS action to `handler` with `flags`.
///
/// Async-signal-safe.
fn set_action(handler: libc::sighandler_t, flags: c_int) -> c_int {
    // SAFETY: sigaction is plain old data; zeroed is a valid empty action.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler;
    action.sa_flags = flags;
    // SAFETY: `action` is a live, initialized sigaction value.
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGBUS, &action, ptr::null_mut())
    }
}

fn our_handler() -> libc::sighandler_t {
    let handler: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = on_sigbus;
    handler as libc::sighandler_t
}

/// Hands a fault that is not ours to the previously installed action.
///
/// A signal sent by `kill`/`raise` (`si_code <= 0`) is not re-raised by
/// returning, so it is delivered here under the saved action and our handler
/// stays installed unless that action terminates the process.
fn forward(sig: c_int, info: *mut siginfo_t, ctx: *mut c_void) {
    // SAFETY: `info` is the siginfo_t the kernel passed to an SA_SIGINFO handler.
    let user_sent = !info.is_null() && unsafe { (*info).si_code } <= 0;
    let handler = PREV_HANDLER.load(Ordering::SeqCst);

    if handler == libc::SIG_IGN && user_sent {
        return;
    }
    if handler == libc::SIG_DFL || handler == libc::SIG_IGN {
        set_action(libc::SIG_DFL, 0);
        if user_sent {
            // Blocked while we run; delivered under the default action on return.
            // SAFETY: raise() is async-signal-safe.
            unsafe { libc::raise(sig) };
        }
        // A hardware fault re-executes under the default action on return.
        return;
    }

    // SAFETY: `handler` came from sigaction() and has the signature its flags declare.
    unsafe {
        if PREV_SIGINFO.load(Ordering::SeqCst) {
            let f: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = mem::transmute(handler);
            f(sig, info, ctx);
        } else {
            let f: extern "C" fn(c_int) = mem::transmute(handler);
            f(sig);
        }
    }
    if user_sent {
        // The previous handler may have reset the disposition.
        set_action(our_handler(), libc::SA_SIGINFO);
    }
}

/// Owner of the process-wide SIGBUS handler.
#[derive(Debug)]
pub struct FaultGuard {
    active: bool,
}

impl FaultGuard {
    /// Installs the SIGBUS handler (or joins an already installed one).
    ///
    /// # Returns
    ///
    /// The guard, or an `Io` error if `sigaction` fails.
    pub fn install() -> Result<Self> {
        let mut state = lock(&INSTALL);
        if state.guards == 0 {
            // SAFETY: sigaction is plain old data; zeroed is a valid empty action.
            let mut action: libc::sigaction = unsafe { mem::zeroed() };
            action.sa_sigaction = our_handler();
            action.sa_flags = libc::SA_SIGINFO;
            let mut previous: libc::sigaction = unsafe { mem::zeroed() };
            // SAFETY: both pointers reference live, initialized sigaction values.
            let rc = unsafe {
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(libc::SIGBUS, &action, &mut previous)
            };
            if rc != 0 {
                return Err(UioError::Io(std::io::Error::last_os_error()));
            }
            PREV_HANDLER.store(previous.sa_sigaction, Ordering::SeqCst);
            PREV_SIGINFO.store(previous.sa_flags & libc::SA_SIGINFO != 0, Ordering::SeqCst);
            state.previous = Some(previous);
            tracing::debug!("installed SIGBUS handler");
            if !probe::RECOVERY_SUPPORTED {
                tracing::warn!(
                    "bus fault recovery is not supported on this target; faults will terminate the process"
                );
            }
        }
        state.guards += 1;
        Ok(Self { active: true })
    }

    /// Whether this guard still holds a reference on the handler.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drops this guard's reference; the last one reinstates the saved action.
    ///
    /// Calling it more than once is a no-op.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let mut state = lock(&INSTALL);
        state.guards = state.guards.saturating_sub(1);
        if state.guards > 0 {
            return;
        }
        if let Some(previous) = state.previous.take() {
            // SAFETY: `previous` is the action returned by sigaction() at install time.
            let rc = unsafe { libc::sigaction(libc::SIGBUS, &previous, ptr::null_mut()) };
            if rc != 0 {
                tracing::warn!(
                    "failed to restore SIGBUS handler: {}",
                    std::io::Error::last_os_error()
                );
            }
            PREV_HANDLER.store(libc::SIG_DFL, Ordering::SeqCst);
            PREV_SIGINFO.store(false, Ordering::SeqCst);
            tracing::debug!("restored previous SIGBUS handler");
        }
    }

    /// Runs `f` with exclusive use of the fault recovery machinery.
    ///
    /// The global access lock is held until `f` returns, so a sequence of
    /// accesses made through the same [`Probe`] is not interleaved with any
    /// other protected access in the process.
    pub fn protect<R>(&self, f: impl FnOnce(&Probe<'_>) -> R) -> R {
        let held = lock(&ACCESS_LOCK);
        let probe = Probe {
            _held: PhantomData,
        };
        let out = f(&probe);
        drop(held);
        out
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Access handle valid inside [`FaultGuard::protect`].
///
/// Neither `Send` nor `Sync`: the armed probe state is global and belongs to
/// the thread holding the access lock.
pub struct Probe<'a> {
    _held: PhantomData<(&'a (), *const ())>,
}

impl Probe<'_> {
    /// Loads one word, catching SIGBUS.
    ///
    /// # Safety
    ///
    /// `ptr` must be aligned and lie inside a live mapping.
    #[inline]
    pub unsafe fn read_u32(&self, ptr: *const u32) -> std::result::Result<u32, Fault> {
        probe::load(ptr)
    }

    /// Stores one word, catching SIGBUS.
    ///
    /// # Safety
    ///
    /// `ptr` must be aligned and lie inside a live mapping.
    #[inline]
    pub unsafe fn write_u32(&self, ptr: *mut u32, value: u32) -> std::result::Result<(), Fault> {
        probe::store(ptr, value)
    }
}
