//! Monotonic server time, injectable for deterministic tests.
//!
//! The fleet table and replay engine both need "seconds since some fixed
//! point" rather than wall-clock `DateTime`s, so last-seen comparisons stay
//! monotonic even across a leap-second or NTP step. Real code uses
//! [`SystemClock`]; tests use [`FakeClock`] to control elapsed time exactly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of monotonic seconds.
pub trait Clock: Send + Sync {
    fn now_ts(&self) -> f64;
}

/// Wall-clock implementation backed by `Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    epoch: Option<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Some(Instant::now()),
        }
    }
}

impl Clock for SystemClock {
    fn now_ts(&self) -> f64 {
        match self.epoch {
            Some(epoch) => Instant::now().duration_since(epoch).as_secs_f64(),
            None => 0.0,
        }
    }
}

/// Deterministic clock for tests: starts at 0, advanced explicitly.
/// Stored as integer micros so it can be shared via `Arc` across threads
/// without interior-mutability panics.
#[derive(Debug, Default)]
pub struct FakeClock {
    micros: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            micros: AtomicU64::new(0),
        }
    }

    pub fn advance_secs(&self, secs: f64) {
        let delta = (secs * 1_000_000.0).round() as u64;
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: f64) {
        self.micros
            .store((secs * 1_000_000.0).round() as u64, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ts(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}
