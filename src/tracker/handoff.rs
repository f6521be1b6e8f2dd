//! Latest-value cross-thread handoff.
//!
//! A producer thread publishes values; the consumer only ever sees the
//! newest one. The handoff also tracks in-flight producer work so
//! shutdown can wait for callbacks to drain before the consumer goes
//! away.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::warn;

/// How many times shutdown polls the in-flight counter
const SHUTDOWN_POLLS: u32 = 250;
/// Interval between shutdown polls
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(2);

struct Shared<T> {
    slot: Mutex<Option<T>>,
    in_flight: AtomicU32,
    exiting: AtomicBool,
}

/// Single-slot handoff; cloning shares the slot.
pub struct Handoff<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                in_flight: AtomicU32::new(0),
                exiting: AtomicBool::new(false),
            }),
        }
    }

    /// Start one unit of producer work. Returns `None` once shutdown
    /// has begun or while a previous unit is still in flight; skipped
    /// invocations are dropped, never queued.
    pub fn begin(&self) -> Option<InFlight<T>> {
        if self.shared.exiting.load(Ordering::Acquire) {
            return None;
        }
        if self
            .shared
            .in_flight
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        // lost race: shutdown started between the check and the
        // increment, back out
        if self.shared.exiting.load(Ordering::Acquire) {
            self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(InFlight {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Replace the slot, discarding any unconsumed value.
    pub fn publish(&self, value: T) {
        if let Ok(mut slot) = self.shared.slot.lock() {
            *slot = Some(value);
        }
    }

    /// Take the newest value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        match self.shared.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        }
    }

    pub fn in_flight(&self) -> u32 {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn is_exiting(&self) -> bool {
        self.shared.exiting.load(Ordering::Acquire)
    }

    /// Refuse new work and wait, bounded, for in-flight work to finish.
    pub fn shutdown(&self) {
        self.shared.exiting.store(true, Ordering::Release);
        for _ in 0..SHUTDOWN_POLLS {
            if self.shared.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }
        warn!(
            "handoff shutdown timed out with {} producer(s) in flight",
            self.shared.in_flight.load(Ordering::Acquire)
        );
    }
}

/// Guard for one unit of producer work; publishing consumes it, and the
/// in-flight count drops when it goes away either way.
pub struct InFlight<T> {
    shared: Arc<Shared<T>>,
}

impl<T> InFlight<T> {
    pub fn publish(self, value: T) {
        if let Ok(mut slot) = self.shared.slot.lock() {
            *slot = Some(value);
        }
        // drop decrements in_flight
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
