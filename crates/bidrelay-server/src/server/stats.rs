//! In-process counters for the relay.
//!
//! Every recording method also forwards to the matching
//! [`telemetry`](crate::server::telemetry) instrument, which is a no-op unless
//! the `metrics` feature is enabled. The counters themselves are always
//! available, so vendor failures and dropped completions stay observable
//! without an exporter.

use crate::server::telemetry::{
    decrement_calls_inflight, increment_calls_inflight, increment_dispatch_failures,
    increment_registry_errors, increment_requests, increment_vendor_failures,
    record_bids_per_request, record_request_duration,
};
use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StoreStats {
    requests: AtomicU64,
    released: AtomicU64,
    vendor_failures: AtomicU64,
    registry_errors: AtomicU64,
    dispatch_failures: AtomicU64,
    bids: AtomicU64,
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls accepted by the event loop.
    pub requests: u64,
    /// Accepted calls whose lifecycle has ended.
    pub released: u64,
    pub vendor_failures: u64,
    pub registry_errors: u64,
    pub dispatch_failures: u64,
    /// Bids returned across all replies.
    pub bids: u64,
}

impl StatsSnapshot {
    pub const fn inflight(&self) -> u64 {
        self.requests.saturating_sub(self.released)
    }
}

impl StoreStats {
    pub fn call_accepted(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        increment_requests();
        increment_calls_inflight();
    }

    pub fn call_released(&self, elapsed: Duration) {
        self.released.fetch_add(1, Ordering::Relaxed);
        decrement_calls_inflight();
        record_request_duration(elapsed.as_secs_f64() * 1_000.0);
    }

    pub fn vendor_failure(&self) {
        self.vendor_failures.fetch_add(1, Ordering::Relaxed);
        increment_vendor_failures();
    }

    pub fn registry_error(&self) {
        self.registry_errors.fetch_add(1, Ordering::Relaxed);
        increment_registry_errors();
    }

    pub fn dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        increment_dispatch_failures();
    }

    pub fn bids_returned(&self, count: usize) {
        self.bids.fetch_add(count as u64, Ordering::Relaxed);
        record_bids_per_request(count as f64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            vendor_failures: self.vendor_failures.load(Ordering::Relaxed),
            registry_errors: self.registry_errors.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            bids: self.bids.load(Ordering::Relaxed),
        }
    }
}
