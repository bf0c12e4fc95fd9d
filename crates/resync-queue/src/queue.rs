//! # Sync Queue
//!
//! The owner-facing half of the coalescing loop: records demand, starts the
//! loop driver when the mode allows it, and exposes cancel / await / clear.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncQueue Lifecycle                             │
//! │                                                                         │
//! │  ┌────────┐ request_sync() ┌────────┐  flag stays clear ┌────────────┐ │
//! │  │  Idle  │ ─────────────► │ Active │ ────────────────► │ Terminated │ │
//! │  │ no ref │                │  ref   │  or cancel_loop() │  ref kept  │ │
//! │  └────────┘                └────────┘                   └─────┬──────┘ │
//! │      ▲                         ▲                              │        │
//! │      │   clear_loop_reference()│      request_sync()          │        │
//! │      └─────────────────────────┼──────────────────────────────┤        │
//! │                                └──────────────────────────────┘        │
//! │                                   (new generation replaces ref)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop reference is never cleared automatically. It survives
//! termination until [`SyncQueue::clear_loop_reference`] is called or a
//! later request starts a new generation.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{QueueConfig, QueueMode};
use crate::driver::{LoopDriver, LoopState, Shared};
use crate::error::{QueueError, QueueResult};
use crate::events::{NoOpEmitter, QueueEventEmitter};
use crate::telemetry::{SyncTelemetry, TelemetrySnapshot};
use crate::work::{work_fn, WorkFn};

// =============================================================================
// Queue Status
// =============================================================================

/// Snapshot of a queue for external queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queue label.
    pub name: String,

    /// Operating mode.
    pub mode: QueueMode,

    /// Whether a loop generation is running.
    pub is_loop_active: bool,

    /// Whether a loop reference is retained.
    pub has_loop_reference: bool,

    /// Whether an undrained request exists.
    pub pending_demand: bool,

    /// Number of loop generations started so far.
    pub generation: u64,

    /// Diagnostic simulation flag.
    pub simulate_coalescing_in_test: bool,

    /// When the work hook last started.
    pub last_work_started_at: Option<DateTime<Utc>>,

    /// When the work hook last returned.
    pub last_work_finished_at: Option<DateTime<Utc>>,

    /// Diagnostic counters.
    pub telemetry: TelemetrySnapshot,
}

// =============================================================================
// Sync Queue
// =============================================================================

/// Coalescing, single-flight execution loop.
///
/// Any number of [`request_sync`](Self::request_sync) calls made while the
/// work hook runs collapse into one trailing run. At most one run executes
/// at a time and no accepted request is lost.
///
/// Requires a tokio runtime to host the loop: either the one passed to
/// [`SyncQueueBuilder::with_runtime`] or the one current when
/// `request_sync` is called.
///
/// ## Usage
/// ```rust,ignore
/// let queue = SyncQueue::new(QueueMode::Live);
/// queue.set_on_work_requested(move || {
///     let library = library.clone();
///     async move { library.sync().await.map_err(QueueError::work) }
/// });
///
/// queue.request_sync();
/// queue.request_sync(); // merged into the same or the trailing run
///
/// queue.cancel_loop();
/// queue.await_loop().await;
/// queue.clear_loop_reference();
/// ```
pub struct SyncQueue {
    mode: QueueMode,
    simulate_coalescing_in_test: AtomicBool,
    runtime: Option<Handle>,
    shared: Arc<Shared>,
}

impl SyncQueue {
    /// Creates a queue in the given mode with default settings.
    pub fn new(mode: QueueMode) -> Self {
        SyncQueueBuilder::new(mode).build()
    }

    /// Creates a queue from loaded configuration.
    pub fn from_config(config: &QueueConfig) -> Self {
        SyncQueueBuilder::new(config.mode())
            .with_name(config.name())
            .simulate_coalescing_in_test(config.simulate_coalescing_in_test())
            .build()
    }

    /// Returns a builder for a queue in the given mode.
    pub fn builder(mode: QueueMode) -> SyncQueueBuilder {
        SyncQueueBuilder::new(mode)
    }

    /// Returns the operating mode.
    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Returns the queue label.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    // =========================================================================
    // Work Hook
    // =========================================================================

    /// Installs the work hook from an async closure.
    pub fn set_on_work_requested<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        self.set_work_fn(work_fn(f));
    }

    /// Installs an already boxed work hook.
    ///
    /// Takes effect from the next loop iteration; a run in flight finishes
    /// with the previous hook.
    pub fn set_work_fn(&self, work: WorkFn) {
        *self.shared.work.write() = Some(work);
    }

    /// Removes the work hook. Demand drained without a hook is dropped.
    pub fn clear_on_work_requested(&self) {
        *self.shared.work.write() = None;
    }

    /// Returns true if a work hook is installed.
    pub fn has_work_hook(&self) -> bool {
        self.shared.work.read().is_some()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Returns the coalescing simulation flag.
    pub fn simulate_coalescing_in_test(&self) -> bool {
        self.simulate_coalescing_in_test.load(Ordering::SeqCst)
    }

    /// Lets a [`QueueMode::Test`] queue run the real loop. No effect in other modes.
    pub fn set_simulate_coalescing_in_test(&self, enabled: bool) {
        if self.mode != QueueMode::Test {
            debug!(queue = %self.shared.name, mode = %self.mode, "Coalescing simulation ignored outside test mode");
        }
        self.simulate_coalescing_in_test.store(enabled, Ordering::SeqCst);
    }

    /// Returns the diagnostic counters.
    pub fn telemetry(&self) -> &SyncTelemetry {
        &self.shared.telemetry
    }

    // =========================================================================
    // Demand Tracker
    // =========================================================================

    /// Records that a sync is wanted and starts the loop if the mode allows
    /// it and no loop is running.
    ///
    /// Never blocks on the work hook.
    pub fn request_sync(&self) {
        self.shared.telemetry.record_request();

        let mut state = self.shared.state.lock();
        state.pending_demand = true;

        if !self.mode.runs_loop(self.simulate_coalescing_in_test()) {
            trace!(queue = %self.shared.name, mode = %self.mode, "Sync request recorded, loop disabled in this mode");
            return;
        }

        if state.is_loop_active {
            trace!(queue = %self.shared.name, generation = state.generation, "Sync request merged into running loop");
            return;
        }

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            error!(queue = %self.shared.name, error = %QueueError::NoRuntime, "Sync request left pending");
            return;
        };

        let driver = LoopDriver::register(&self.shared, &mut state);
        let generation = state.generation;

        // A runtime that is shutting down drops the task in place, and the
        // driver's termination needs this lock.
        drop(state);

        debug!(queue = %self.shared.name, generation, "Spawning sync loop");
        runtime.spawn(driver.run());
    }

    // =========================================================================
    // Lifecycle Controller
    // =========================================================================

    /// Signals cooperative cancellation to the running loop. Does not block.
    ///
    /// The work hook is never interrupted; the loop stops at the next
    /// iteration boundary. No-op when no loop is active.
    pub fn cancel_loop(&self) {
        let state = self.shared.state.lock();

        match state.handle.as_ref() {
            Some(handle) if state.is_loop_active => {
                if !handle.cancel.is_cancelled() {
                    handle.cancel.cancel();
                    self.shared.telemetry.record_cancellation();
                    info!(queue = %self.shared.name, generation = handle.generation, "Sync loop cancellation requested");
                }
            }
            _ => debug!(queue = %self.shared.name, "cancel_loop called with no active loop"),
        }
    }

    /// Waits until the most recent loop generation has terminated.
    ///
    /// Returns immediately if no loop reference is held. Safe to call any
    /// number of times.
    pub async fn await_loop(&self) {
        let finished = {
            let state = self.shared.state.lock();
            state.handle.as_ref().map(|handle| handle.finished.clone())
        };

        let Some(mut finished) = finished else {
            return;
        };

        // A closed channel means the loop task is gone, which is also terminal.
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Drops the retained loop reference after termination.
    ///
    /// Ignored with a warning while the loop is still active.
    pub fn clear_loop_reference(&self) {
        let mut state = self.shared.state.lock();

        if state.is_loop_active {
            warn!(
                queue = %self.shared.name,
                generation = state.generation,
                "clear_loop_reference called while the loop is active, ignoring"
            );
            return;
        }

        match state.handle.take() {
            Some(handle) => debug!(queue = %self.shared.name, generation = handle.generation, "Loop reference cleared"),
            None => trace!(queue = %self.shared.name, "No loop reference to clear"),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True iff a loop generation is between start and termination.
    pub fn is_loop_active(&self) -> bool {
        self.shared.state.lock().is_loop_active
    }

    /// True iff a loop reference is retained.
    pub fn has_loop_reference(&self) -> bool {
        self.shared.state.lock().handle.is_some()
    }

    /// True iff an undrained request exists.
    pub fn has_pending_demand(&self) -> bool {
        self.shared.state.lock().pending_demand
    }

    /// Returns a consistent snapshot of the queue.
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        snapshot(self, &state)
    }
}

fn snapshot(queue: &SyncQueue, state: &LoopState) -> QueueStatus {
    QueueStatus {
        name: queue.shared.name.clone(),
        mode: queue.mode,
        is_loop_active: state.is_loop_active,
        has_loop_reference: state.handle.is_some(),
        pending_demand: state.pending_demand,
        generation: state.generation,
        simulate_coalescing_in_test: queue.simulate_coalescing_in_test(),
        last_work_started_at: state.last_work_started_at,
        last_work_finished_at: state.last_work_finished_at,
        telemetry: queue.shared.telemetry.snapshot(),
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("name", &self.shared.name)
            .field("mode", &self.mode)
            .field("is_loop_active", &self.is_loop_active())
            .finish()
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        let state = self.shared.state.lock();
        if let Some(handle) = state.handle.as_ref() {
            if state.is_loop_active {
                debug!(queue = %self.shared.name, generation = handle.generation, "Queue dropped, cancelling loop");
                handle.cancel.cancel();
            }
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a [`SyncQueue`] with options.
pub struct SyncQueueBuilder {
    mode: QueueMode,
    name: String,
    emitter: Option<Arc<dyn QueueEventEmitter>>,
    runtime: Option<Handle>,
    simulate_coalescing_in_test: bool,
    work: Option<WorkFn>,
}

impl SyncQueueBuilder {
    /// Creates a new builder for the given mode.
    pub fn new(mode: QueueMode) -> Self {
        SyncQueueBuilder {
            mode,
            name: "sync".to_string(),
            emitter: None,
            runtime: None,
            simulate_coalescing_in_test: false,
            work: None,
        }
    }

    /// Sets the label used in log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn QueueEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Pins the runtime that hosts the loop task.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets the initial coalescing simulation flag.
    pub fn simulate_coalescing_in_test(mut self, enabled: bool) -> Self {
        self.simulate_coalescing_in_test = enabled;
        self
    }

    /// Installs the work hook up front.
    pub fn with_work(mut self, work: WorkFn) -> Self {
        self.work = Some(work);
        self
    }

    /// Builds the queue.
    pub fn build(self) -> SyncQueue {
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        SyncQueue {
            mode: self.mode,
            simulate_coalescing_in_test: AtomicBool::new(self.simulate_coalescing_in_test),
            runtime: self.runtime,
            shared: Arc::new(Shared {
                name: self.name,
                state: Mutex::new(LoopState::default()),
                work: RwLock::new(self.work),
                telemetry: SyncTelemetry::new(),
                emitter,
            }),
        }
    }
}
