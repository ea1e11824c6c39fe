//! Time source abstraction.
//!
//! `flexcache` never reads the wall clock itself; every timestamp it
//! compares against is produced by a `Clock` the host injects. This keeps
//! TTL logic deterministic under test and lets a host reuse whatever time
//! source it already has (wall clock, a virtual clock in a simulation,
//! a monotonic counter salvaged from another subsystem).

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-like millisecond timestamp source.
///
/// Implementations must not go backwards within the lifetime of a single
/// cache instance; see the engine's reentrancy and TTL-monotonicity notes
/// for what happens if they do (stale entries may transiently appear
/// unexpired again — tolerated, not corrected).
pub trait Clock {
    /// Returns the current timestamp, in milliseconds, in whatever epoch
    /// the host chooses. The unit must stay consistent for the lifetime of
    /// a cache instance.
    fn now_ms(&self) -> u64;
}

/// Wall-clock source backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually-advanced clock for deterministic tests.
///
/// Mirrors the C test harness's `g_mock_time_ms` global, but scoped to a
/// single instance instead of shared process-wide state.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<u64>>,
}

impl MockClock {
    /// Creates a mock clock starting at the given timestamp.
    pub fn new(start_ms: u64) -> Self {
        MockClock {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Sets the clock to an absolute timestamp.
    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}
