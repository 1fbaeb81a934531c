//! Wall-clock gate.
//!
//! Until the device has synchronized its clock (NTP, RTC, ...), the system
//! time may read as 1970 or some other stale value. Storing or pruning
//! against such a time would corrupt the log's notion of "recent", so all
//! consumers go through a [`Clock`] that reports nothing until the time is
//! above a sanity floor.

use std::sync::atomic::{AtomicI64, Ordering};

use thermolog_types::{DEFAULT_EPOCH_FLOOR, Timestamp};
use time::OffsetDateTime;

/// Source of validated wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in epoch seconds, or `None` if it is not yet trustworthy.
    fn now(&self) -> Option<Timestamp>;

    /// Whether the clock currently reports a valid time.
    fn is_synced(&self) -> bool {
        self.now().is_some()
    }
}

/// System clock gated by an epoch floor.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    floor: Timestamp,
}

impl SystemClock {
    /// Create a clock that is valid strictly above `floor`.
    pub fn new(floor: Timestamp) -> Self {
        Self { floor }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(DEFAULT_EPOCH_FLOOR)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Option<Timestamp> {
        gate(OffsetDateTime::now_utc().unix_timestamp(), self.floor)
    }
}

/// A clock whose time is set by hand.
///
/// Starts unsynchronized (at epoch 0). Useful in tests and for replaying
/// scenarios where wall-clock time must be controlled.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
    floor: Timestamp,
}

impl ManualClock {
    /// Create an unsynchronized clock with the default floor.
    pub fn new() -> Self {
        Self::with_floor(DEFAULT_EPOCH_FLOOR)
    }

    /// Create an unsynchronized clock with a custom floor.
    pub fn with_floor(floor: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(0),
            floor,
        }
    }

    /// Create a clock already set to `now`.
    pub fn at(now: Timestamp) -> Self {
        let clock = Self::new();
        clock.set(now);
        clock
    }

    /// Set the raw (ungated) time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the raw time forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Option<Timestamp> {
        gate(self.now.load(Ordering::SeqCst), self.floor)
    }
}

fn gate(now: Timestamp, floor: Timestamp) -> Option<Timestamp> {
    (now > floor).then_some(now)
}
