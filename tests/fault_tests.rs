//! Integration tests for bus fault recovery.
//!
//! A bus fault is produced by shrinking the file behind a live mapping:
//! touching a mapped page past end-of-file raises SIGBUS, the same signal an
//! unresponsive AXI slave produces.

mod common;

use std::thread;

use common::{Fixture, FOO_ADDR, FOO_BYTES};
use uio_axi::fault::{Fault, FaultGuard, Probe};
use uio_axi::uio::UioMapping;
use uio_axi::{BlockMode, RegisterValue, UioError};

/// Tests that a faulting read becomes a bus fault error and the engine survives.
#[test]
fn test_read_bus_fault_recovers() {
    let fx = Fixture::with_foo_symlink();
    let engine = fx.foo_engine();
    engine.write(FOO_ADDR + 2, 0x1234).unwrap();

    fx.resize("uio3", 0);
    match engine.read(FOO_ADDR + 2, RegisterValue::NO_MASK) {
        Err(UioError::BusFault { address }) => assert_eq!(address, FOO_ADDR + 2),
        other => panic!("expected BusFault, got {:?}", other),
    }
    assert_eq!(engine.stats().snapshot().bus_faults, 1);

    fx.resize("uio3", FOO_BYTES);
    engine.write(FOO_ADDR + 2, 0x5678).unwrap();
    assert_eq!(
        engine.read(FOO_ADDR + 2, RegisterValue::NO_MASK).unwrap().raw,
        0x5678
    );
}

/// Tests that every operation kind reports bus faults.
#[test]
fn test_all_operations_report_bus_fault() {
    let fx = Fixture::with_foo_symlink();
    let engine = fx.foo_engine();
    fx.resize("uio3", 0);

    assert!(matches!(
        engine.write(FOO_ADDR, 1),
        Err(UioError::BusFault { .. })
    ));
    assert!(matches!(
        engine.rmw_bits(FOO_ADDR, 0, 1),
        Err(UioError::BusFault { .. })
    ));
    assert!(matches!(
        engine.rmw_sum(FOO_ADDR, 1),
        Err(UioError::BusFault { .. })
    ));
    assert!(matches!(
        engine.write_block(FOO_ADDR + 4, &[1, 2], BlockMode::Incremental),
        Err(UioError::BusFault { address }) if address == FOO_ADDR + 4
    ));
    assert!(matches!(
        engine.read_block(FOO_ADDR + 8, 2, BlockMode::Fixed),
        Err(UioError::BusFault { address }) if address == FOO_ADDR + 8
    ));

    let stats = engine.stats().snapshot();
    assert_eq!(stats.bus_faults, 5);
    assert_eq!(stats.words_read, 0);
    assert_eq!(stats.words_written, 0);
}

/// Tests that a block stops at the first faulting word.
#[test]
fn test_block_fault_reports_first_bad_word() {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
    let fx = Fixture::new();
    fx.add_uio("uio3", 0x4120_0000, 2 * page);
    fx.add_symlink("foo", "uio3");
    let engine = fx.foo_engine();

    // Keep the first page; every word of the second one faults.
    fx.resize("uio3", page);
    let boundary = (page / 4) as u32;
    let result = engine.read_block(FOO_ADDR + boundary - 2, 4, BlockMode::Incremental);
    match result {
        Err(UioError::BusFault { address }) => assert_eq!(address, FOO_ADDR + boundary),
        other => panic!("expected BusFault, got {:?}", other),
    }
    let stats = engine.stats().snapshot();
    assert_eq!(stats.words_read, 2);
    assert_eq!(stats.bus_faults, 1);
}

/// Tests the guard and probe directly on a mapping.
#[test]
fn test_probe_on_mapping() {
    let fx = Fixture::with_foo_symlink();
    let mapping = UioMapping::open(fx.dev_dir(), "uio3", 0x400).unwrap();
    let guard = FaultGuard::install().unwrap();
    let ptr = mapping.word_ptr(0).unwrap();

    let ok = guard.protect(|probe| unsafe {
        probe.write_u32(ptr, 0xCAFE)?;
        probe.read_u32(ptr)
    });
    assert_eq!(ok, Ok(0xCAFE));

    fx.resize("uio3", 0);
    let faulted = guard.protect(|probe| unsafe { probe.read_u32(ptr) });
    assert_eq!(faulted, Err(Fault));
    let faulted = guard.protect(|probe| unsafe { probe.write_u32(ptr, 1) });
    assert_eq!(faulted, Err(Fault));

    fx.resize("uio3", FOO_BYTES);
    let ok = guard.protect(|probe| unsafe { probe.read_u32(ptr) });
    assert_eq!(ok, Ok(0));
}

// A probe must stay on the thread holding the access lock.
static_assertions::assert_not_impl_any!(Probe<'static>: Send, Sync);

/// Tests reference-counted install and idempotent restore.
#[test]
fn test_guard_restore_idempotent() {
    let mut first = FaultGuard::install().unwrap();
    let mut second = FaultGuard::install().unwrap();
    assert!(first.is_active());

    first.restore();
    first.restore();
    assert!(!first.is_active());
    assert!(second.is_active());

    second.restore();
    assert!(!second.is_active());
}

/// Tests that concurrent accesses stay isolated while faults occur.
#[test]
fn test_concurrent_access_with_faults() {
    let fx = Fixture::with_foo_symlink();
    let engine = fx.foo_engine();

    thread::scope(|s| {
        for t in 0..4u32 {
            let engine = &engine;
            s.spawn(move || {
                for i in 0..200u32 {
                    let addr = FOO_ADDR + t * 0x10 + (i % 0x10);
                    match engine.write(addr, i) {
                        Ok(()) | Err(UioError::BusFault { .. }) => {}
                        Err(e) => panic!("unexpected error {}", e),
                    }
                    match engine.read(addr, RegisterValue::NO_MASK) {
                        Ok(_) | Err(UioError::BusFault { .. }) => {}
                        Err(e) => panic!("unexpected error {}", e),
                    }
                }
            });
        }
        s.spawn(|| {
            for _ in 0..20 {
                fx.resize("uio3", 0);
                thread::yield_now();
                fx.resize("uio3", FOO_BYTES);
                thread::yield_now();
            }
        });
    });

    // Faults are contained: every thread finished and the device works again.
    fx.resize("uio3", FOO_BYTES);
    engine.write(FOO_ADDR, 0xAB).unwrap();
    assert_eq!(engine.read(FOO_ADDR, RegisterValue::NO_MASK).unwrap().raw, 0xAB);
    let stats = engine.stats().snapshot();
    assert_eq!(stats.words_written + stats.words_read + stats.bus_faults, 4 * 400 + 2);
}
