//! # resync-queue: Coalescing Execution Loop
//!
//! Turns an unbounded stream of parameterless "please resync" signals into
//! a single-flight loop: at most one run of the caller's work executes at a
//! time, and every request received before or during a run is followed by
//! at most one more run.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Coalescing Queue Architecture                     │
//! │                                                                         │
//! │  owner context                         worker context                   │
//! │  ─────────────                         ──────────────                   │
//! │                                                                         │
//! │  request_sync() ──┐                                                     │
//! │  request_sync() ──┼──► pending_demand ◄──── take() ── LoopDriver        │
//! │  request_sync() ──┘         │                            │              │
//! │                             │ start if idle              ▼              │
//! │                             └──────────────────► work hook (async)      │
//! │                                                                         │
//! │  cancel_loop()  ─────────► CancellationToken ──► checked per iteration  │
//! │  await_loop()   ◄───────── watch<finished>   ◄── set on termination     │
//! │  clear_loop_reference()                                                 │
//! │                                                                         │
//! │  EVENTS (QueueEventEmitter):                                            │
//! │  • loop state   - active / inactive, once each per generation          │
//! │  • work error   - every failed or panicking run                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modes
//! - [`QueueMode::Live`] runs the loop.
//! - [`QueueMode::Preview`] counts requests and never runs anything.
//! - [`QueueMode::Test`] is inert unless `simulate_coalescing_in_test` is set.
//!
//! ## Module Organization
//! - [`queue`] - `SyncQueue`: demand tracker and lifecycle controller
//! - [`config`] - Queue mode and TOML/env configuration
//! - [`error`] - Queue error types
//! - [`events`] - Event emitter trait for UI and error reporting
//! - [`telemetry`] - Diagnostic counters
//! - [`work`] - Work hook type
//!
//! ## Usage
//!
//! ```rust,ignore
//! use resync_queue::{QueueConfig, QueueError, SyncQueue};
//!
//! let config = QueueConfig::load_or_default(None);
//! let queue = SyncQueue::from_config(&config);
//!
//! queue.set_on_work_requested(move || {
//!     let store = store.clone();
//!     async move { store.sync().await.map_err(QueueError::work) }
//! });
//!
//! // Fire as often as you like.
//! queue.request_sync();
//!
//! // Teardown.
//! queue.cancel_loop();
//! queue.await_loop().await;
//! queue.clear_loop_reference();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod telemetry;
pub mod work;

mod driver;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DiagnosticsSettings, QueueConfig, QueueMode, QueueSettings};
pub use error::{QueueError, QueueResult};
pub use events::{NoOpEmitter, QueueEventEmitter, TracingEmitter};
pub use queue::{QueueStatus, SyncQueue, SyncQueueBuilder};
pub use telemetry::{SyncTelemetry, TelemetrySnapshot};
pub use work::{work_fn, WorkFn};
