//! Time sources.
//!
//! Every instant is expressed in UTC so that tokens issued by distinct relay
//! instances compare consistently.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    /// Current instant, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock using the OS time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen on a given instant until explicitly moved.
///
/// Stored as nanoseconds since Unix epoch so it can be shared between
/// threads without a lock.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Create a new [`ManualClock`] frozen at `at`.
    ///
    /// Instants outside of the `i64` nanosecond range (years 1677 to 2262)
    /// are clamped.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(to_nanos(at)),
        }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.nanos.store(to_nanos(at), Ordering::SeqCst);
    }

    /// Move the clock forward (or backward with a negative delta).
    pub fn advance(&self, delta: TimeDelta) {
        let saturated = if delta < TimeDelta::zero() {
            i64::MIN
        } else {
            i64::MAX
        };
        let delta = delta.num_nanoseconds().unwrap_or(saturated);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |nanos| {
                Some(nanos.saturating_add(delta))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn to_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}
