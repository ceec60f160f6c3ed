//! Integration tests for SIGBUS signals that do not come from a register access.
//!
//! Kept in their own test binary: the tests replace the process-wide SIGBUS
//! action, which must not race with guards held by other tests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{Fixture, FOO_ADDR, FOO_BYTES};
use uio_axi::{RegisterValue, UioError};

static CHAINED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn count_sigbus(_sig: libc::c_int) {
    CHAINED.fetch_add(1, Ordering::SeqCst);
}

fn set_sigbus(handler: libc::sighandler_t) {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        libc::sigemptyset(&mut action.sa_mask);
        assert_eq!(
            libc::sigaction(libc::SIGBUS, &action, std::ptr::null_mut()),
            0
        );
    }
}

fn current_sigbus() -> libc::sighandler_t {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        libc::sigaction(libc::SIGBUS, std::ptr::null(), &mut action);
        action.sa_sigaction
    }
}

/// Asserts that a bus fault on a protected access is still recovered.
fn assert_fault_recovered(fx: &Fixture, engine: &uio_axi::RegisterEngine) {
    fx.resize("uio3", 0);
    assert!(matches!(
        engine.read(FOO_ADDR, RegisterValue::NO_MASK),
        Err(UioError::BusFault { .. })
    ));
    fx.resize("uio3", FOO_BYTES);
    engine.write(FOO_ADDR, 7).unwrap();
    assert_eq!(engine.read(FOO_ADDR, RegisterValue::NO_MASK).unwrap().raw, 7);
}

/// Tests that a raised SIGBUS follows the saved action and leaves protection intact.
#[test]
fn test_user_sent_sigbus_keeps_guard() {
    let fx = Fixture::with_foo_symlink();

    // Saved action ignores the signal.
    set_sigbus(libc::SIG_IGN);
    let engine = fx.foo_engine();
    let ours = current_sigbus();
    assert_ne!(ours, libc::SIG_IGN);

    unsafe { libc::raise(libc::SIGBUS) };
    assert_eq!(current_sigbus(), ours);
    assert_fault_recovered(&fx, &engine);

    drop(engine);
    assert_eq!(current_sigbus(), libc::SIG_IGN);

    // Saved action is a plain handler: it runs once and ours stays installed.
    set_sigbus(count_sigbus as libc::sighandler_t);
    let engine = fx.foo_engine();
    let ours = current_sigbus();

    unsafe { libc::raise(libc::SIGBUS) };
    assert_eq!(CHAINED.load(Ordering::SeqCst), 1);
    assert_eq!(current_sigbus(), ours);
    assert_fault_recovered(&fx, &engine);
    assert_eq!(CHAINED.load(Ordering::SeqCst), 1);

    drop(engine);
    assert_eq!(current_sigbus(), count_sigbus as libc::sighandler_t);
}
