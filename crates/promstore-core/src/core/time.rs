// crates/promstore-core/src/core/time.rs
// ============================================================================
// Module: Promstore Time Source
// Description: Injected wall-clock abstraction for lease and catalog timestamps.
// Purpose: Keep lease arithmetic deterministic and testable.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Runtime components never read the wall clock directly. Hosts inject a
//! [`Clock`]; production uses [`SystemClock`], tests drive a
//! [`ManualClock`] to step lease expiry without sleeping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of unix-millisecond timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time in unix milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Manually advanced time source for tests and simulations.
///
/// # Invariants
/// - Time only moves when the caller sets or advances it.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time (unix ms).
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock pinned at `start_ms`.
    #[must_use]
    pub const fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now_ms.fetch_add(duration_millis(delta), Ordering::SeqCst);
    }

    /// Sets the clock to `now_ms`.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Converts a duration into whole milliseconds, saturating at `i64::MAX`.
#[must_use]
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
