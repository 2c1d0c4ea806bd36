//! Minimum-gap rate limiter
//!
//! Collapses bursts of triggers (a focus event, a connectivity edge and a
//! manual pull arriving together) into one effective call. Not a queue: a
//! caller inside the gap is refused outright and simply does nothing, because
//! the call that won the slot is doing the same work.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Refuses acquisitions arriving within `gap` of the last granted one
pub struct MinGapLimiter {
    gap: Duration,
    /// Last granted acquisition. Lock discipline: held only for the
    /// check-and-stamp, never across an await point.
    last: Mutex<Option<Instant>>,
}

impl MinGapLimiter {
    /// Creates a limiter with the given minimum gap; the first acquisition
    /// always succeeds
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            last: Mutex::new(None),
        }
    }

    /// Tries to take the slot. Returns false when the previous grant is
    /// still inside the gap.
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last.lock().expect("limiter mutex poisoned");
        match *last {
            Some(granted) if granted.elapsed() < self.gap => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    /// Forgets the last grant so the next acquisition succeeds immediately.
    /// Used when the granted call failed before doing any work.
    pub fn reset(&self) {
        *self.last.lock().expect("limiter mutex poisoned") = None;
    }
}
