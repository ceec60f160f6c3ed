//! Register access statistics.
//!
//! Counts words moved and errors raised by the register engine. Counters are
//! atomic so the engine's `&self` operations can update them from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Running totals kept by a `RegisterEngine`.
pub struct AccessStats {
    start_time: Instant,
    words_read: AtomicU64,
    words_written: AtomicU64,
    bus_faults: AtomicU64,
    range_errors: AtomicU64,
    unmapped_errors: AtomicU64,
}

/// Point-in-time copy of [`AccessStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub words_read: u64,
    pub words_written: u64,
    pub bus_faults: u64,
    pub range_errors: u64,
    pub unmapped_errors: u64,
}

impl Default for AccessStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            words_read: AtomicU64::new(0),
            words_written: AtomicU64::new(0),
            bus_faults: AtomicU64::new(0),
            range_errors: AtomicU64::new(0),
            unmapped_errors: AtomicU64::new(0),
        }
    }
}

impl AccessStats {
    #[inline]
    pub(crate) fn record_read(&self) {
        self.words_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.words_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bus_fault(&self) {
        self.bus_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_range_error(&self) {
        self.range_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unmapped(&self) {
        self.unmapped_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            words_read: self.words_read.load(Ordering::Relaxed),
            words_written: self.words_written.load(Ordering::Relaxed),
            bus_faults: self.bus_faults.load(Ordering::Relaxed),
            range_errors: self.range_errors.load(Ordering::Relaxed),
            unmapped_errors: self.unmapped_errors.load(Ordering::Relaxed),
        }
    }

    /// Prints a formatted summary of all access statistics.
    pub fn print(&self) {
        let s = self.snapshot();
        let seconds = self.start_time.elapsed().as_secs_f64();
        let errors = s.bus_faults + s.range_errors + s.unmapped_errors;

        println!("\n==========================================================");
        println!("UIO REGISTER ACCESS STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {:.4} s", seconds);
        println!("words.read               {}", s.words_read);
        println!("words.written            {}", s.words_written);
        println!("----------------------------------------------------------");
        println!("ERRORS                   {}", errors);
        println!("  err.bus_fault          {}", s.bus_faults);
        println!("  err.out_of_range       {}", s.range_errors);
        println!("  err.unmapped           {}", s.unmapped_errors);
        println!("==========================================================");
    }
}
