//! # Diagnostic Telemetry
//!
//! Counters describing what a queue has done. Nothing here is exported to a
//! metrics backend; callers read [`SyncTelemetry::snapshot`] directly.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a queue.
#[derive(Debug, Default)]
pub struct SyncTelemetry {
    sync_request_count: AtomicU64,
    loops_started: AtomicU64,
    work_invocations: AtomicU64,
    work_failures: AtomicU64,
    cancellations: AtomicU64,
}

/// Point-in-time copy of [`SyncTelemetry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Calls to `request_sync`, in every mode.
    pub sync_request_count: u64,
    /// Loop generations spawned.
    pub loops_started: u64,
    /// Calls into the work hook.
    pub work_invocations: u64,
    /// Work hook calls that returned an error or panicked.
    pub work_failures: u64,
    /// Cancellations delivered to a live loop.
    pub cancellations: u64,
}

impl SyncTelemetry {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `request_sync` calls seen so far.
    pub fn sync_request_count(&self) -> u64 {
        self.sync_request_count.load(Ordering::Relaxed)
    }

    /// Number of work hook invocations so far.
    pub fn work_invocations(&self) -> u64 {
        self.work_invocations.load(Ordering::Relaxed)
    }

    /// Returns a copy of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            sync_request_count: self.sync_request_count.load(Ordering::Relaxed),
            loops_started: self.loops_started.load(Ordering::Relaxed),
            work_invocations: self.work_invocations.load(Ordering::Relaxed),
            work_failures: self.work_failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_request(&self) {
        self.sync_request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_loop_started(&self) {
        self.loops_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invocation(&self) {
        self.work_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.work_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }
}
