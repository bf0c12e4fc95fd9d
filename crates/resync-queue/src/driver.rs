//! # Loop Driver
//!
//! The background half of the queue: one task per loop generation that
//! drains the demand flag until it stays clear.
//!
//! ## Iteration
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Loop Driver Iteration                            │
//! │                                                                         │
//! │   ┌──────────────────────────────── state lock ───────────────────┐    │
//! │   │  cancelled?            ──yes──► is_loop_active = false ──► exit│    │
//! │   │  take(pending_demand)  ──false─► is_loop_active = false ──► exit│   │
//! │   └───────────────────────────────┬────────────────────────────────┘    │
//! │                                   │ true                                │
//! │                                   ▼                                     │
//! │                  invoke work hook (lock released)                       │
//! │                  request_sync() may set the flag again                  │
//! │                                   │                                     │
//! │                                   └──────────► next iteration           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The idle check and the inactive transition happen in one critical
//! section. A request either lands before it (and is drained by this
//! generation) or sees `is_loop_active == false` and starts a new one.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::QueueEventEmitter;
use crate::telemetry::SyncTelemetry;
use crate::work::{self, WorkFn};

// =============================================================================
// Shared State
// =============================================================================

/// Mutable state shared by the owner and the loop task. One lock guards all
/// of it.
#[derive(Default)]
pub(crate) struct LoopState {
    /// At least one request has not been drained yet.
    pub pending_demand: bool,

    /// A generation is between registration and termination.
    pub is_loop_active: bool,

    /// Monotonic loop generation counter.
    pub generation: u64,

    /// Reference to the most recent generation until cleared or replaced.
    pub handle: Option<LoopHandle>,

    pub last_work_started_at: Option<DateTime<Utc>>,
    pub last_work_finished_at: Option<DateTime<Utc>>,

    /// Finish signal of the most recent generation. Unlike `handle` it is
    /// never cleared, so the next generation can always wait on it.
    pub last_finished: Option<watch::Receiver<bool>>,
}

/// Owner-side reference to one loop generation.
pub(crate) struct LoopHandle {
    pub generation: u64,
    pub cancel: CancellationToken,
    pub finished: watch::Receiver<bool>,
}

/// Everything the loop task needs, behind one `Arc`.
pub(crate) struct Shared {
    pub name: String,
    pub state: Mutex<LoopState>,
    pub work: RwLock<Option<WorkFn>>,
    pub telemetry: SyncTelemetry,
    pub emitter: Arc<dyn QueueEventEmitter>,
}

// =============================================================================
// Loop Driver
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Idle,
    Cancelled,
}

/// One loop generation, ready to be spawned.
pub(crate) struct LoopDriver {
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
    predecessor: Option<watch::Receiver<bool>>,
    termination: Termination,
}

impl LoopDriver {
    /// Registers a new generation. Must be called with the state lock held
    /// and `is_loop_active == false`.
    pub(crate) fn register(shared: &Arc<Shared>, state: &mut LoopState) -> Self {
        debug_assert!(!state.is_loop_active);

        state.generation += 1;
        state.is_loop_active = true;

        let generation = state.generation;
        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(false);
        let predecessor = state.last_finished.replace(finished_rx.clone());

        if let Some(stale) = state.handle.replace(LoopHandle {
            generation,
            cancel: cancel.clone(),
            finished: finished_rx,
        }) {
            debug!(
                queue = %shared.name,
                stale_generation = stale.generation,
                "Replacing uncleared loop reference"
            );
        }

        shared.telemetry.record_loop_started();

        LoopDriver {
            shared: shared.clone(),
            generation,
            cancel,
            predecessor,
            termination: Termination {
                shared: shared.clone(),
                generation,
                finished: finished_tx,
                announced: false,
            },
        }
    }

    /// Runs until the demand flag stays clear or cancellation is observed.
    pub(crate) async fn run(mut self) {
        // The previous generation marks itself inactive before it emits
        // `false`, so this one may already be running. Its `true` must not
        // overtake that `false`.
        if let Some(mut predecessor) = self.predecessor.take() {
            let _ = predecessor.wait_for(|done| *done).await;
        }

        self.termination.announced = true;
        self.shared.emitter.emit_loop_state(true);
        debug!(queue = %self.shared.name, generation = self.generation, "Sync loop started");

        let mut iterations: u64 = 0;

        let reason = loop {
            if let Some(reason) = self.take_demand() {
                break reason;
            }

            // Bind first: the read guard must not live across the await.
            let work = self.shared.work.read().clone();

            match work {
                Some(work) => {
                    self.shared.telemetry.record_invocation();
                    if let Err(e) = work::invoke(&work).await {
                        self.shared.telemetry.record_failure();
                        error!(
                            queue = %self.shared.name,
                            generation = self.generation,
                            error = %e,
                            "Sync work failed"
                        );
                        self.shared.emitter.emit_work_error(&e);
                    }
                }
                None => {
                    debug!(queue = %self.shared.name, "No work hook installed, demand dropped");
                }
            }

            self.shared.state.lock().last_work_finished_at = Some(Utc::now());
            iterations += 1;
        };

        match reason {
            ExitReason::Idle => debug!(
                queue = %self.shared.name,
                generation = self.generation,
                iterations,
                "Sync loop idle, exiting"
            ),
            ExitReason::Cancelled => info!(
                queue = %self.shared.name,
                generation = self.generation,
                iterations,
                "Sync loop cancelled"
            ),
        }
        // `self.termination` drops here and signals waiters.
    }

    /// Step (a): read-and-clear the demand flag. On exit the generation is
    /// marked inactive inside the same critical section.
    fn take_demand(&self) -> Option<ExitReason> {
        let mut state = self.shared.state.lock();

        if self.cancel.is_cancelled() {
            state.is_loop_active = false;
            return Some(ExitReason::Cancelled);
        }

        if !std::mem::take(&mut state.pending_demand) {
            state.is_loop_active = false;
            return Some(ExitReason::Idle);
        }

        state.last_work_started_at = Some(Utc::now());
        None
    }
}

// =============================================================================
// Termination
// =============================================================================

/// Finalises a generation when the driver is dropped, whether it finished,
/// unwound, or was never polled because the runtime shut down.
struct Termination {
    shared: Arc<Shared>,
    generation: u64,
    finished: watch::Sender<bool>,
    announced: bool,
}

impl Drop for Termination {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if state.generation == self.generation && state.is_loop_active {
                state.is_loop_active = false;
            }
        }

        if self.announced {
            self.shared.emitter.emit_loop_state(false);
        }

        self.finished.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEmitter;

    fn shared() -> Arc<Shared> {
        Arc::new(Shared {
            name: "test".into(),
            state: Mutex::new(LoopState::default()),
            work: RwLock::new(None),
            telemetry: SyncTelemetry::new(),
            emitter: Arc::new(NoOpEmitter),
        })
    }

    #[test]
    fn test_register_marks_active_and_stores_handle() {
        let shared = shared();
        let driver = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };

        {
            let state = shared.state.lock();
            assert!(state.is_loop_active);
            assert_eq!(state.generation, 1);
            assert_eq!(state.handle.as_ref().map(|h| h.generation), Some(1));
        }

        drop(driver);
        let state = shared.state.lock();
        assert!(!state.is_loop_active);
        assert!(state.handle.is_some());
        assert!(*state.handle.as_ref().unwrap().finished.borrow());
    }

    #[test]
    fn test_take_demand_exits_when_idle() {
        let shared = shared();
        let driver = {
            let mut state = shared.state.lock();
            state.pending_demand = true;
            LoopDriver::register(&shared, &mut state)
        };

        assert_eq!(driver.take_demand(), None);
        assert!(!shared.state.lock().pending_demand);
        assert_eq!(driver.take_demand(), Some(ExitReason::Idle));
        assert!(!shared.state.lock().is_loop_active);
    }

    #[test]
    fn test_take_demand_prefers_cancellation() {
        let shared = shared();
        let driver = {
            let mut state = shared.state.lock();
            state.pending_demand = true;
            LoopDriver::register(&shared, &mut state)
        };

        driver.cancel.cancel();
        assert_eq!(driver.take_demand(), Some(ExitReason::Cancelled));

        let state = shared.state.lock();
        assert!(!state.is_loop_active);
        assert!(state.pending_demand, "cancellation must not swallow demand");
    }

    #[derive(Default)]
    struct RecordingEmitter {
        states: Mutex<Vec<bool>>,
    }

    impl QueueEventEmitter for RecordingEmitter {
        fn emit_loop_state(&self, active: bool) {
            self.states.lock().push(active);
        }

        fn emit_work_error(&self, _error: &crate::error::QueueError) {}
    }

    #[tokio::test]
    async fn test_next_generation_announces_after_predecessor_finishes() {
        let emitter = Arc::new(RecordingEmitter::default());
        let shared = Arc::new(Shared {
            name: "test".into(),
            state: Mutex::new(LoopState::default()),
            work: RwLock::new(None),
            telemetry: SyncTelemetry::new(),
            emitter: emitter.clone(),
        });

        let mut first = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };
        first.termination.announced = true;
        assert_eq!(first.take_demand(), Some(ExitReason::Idle));

        // First is inactive but has not emitted `false` yet.
        let second = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };
        let task = tokio::spawn(second.run());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(emitter.states.lock().is_empty());

        drop(first);
        task.await.unwrap();
        assert_eq!(*emitter.states.lock(), vec![false, true, false]);
    }

    #[test]
    fn test_last_finished_survives_handle_clear() {
        let shared = shared();
        let first = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };
        assert_eq!(first.take_demand(), Some(ExitReason::Idle));
        shared.state.lock().handle = None;

        let second = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };
        let predecessor = second.predecessor.as_ref().map(|rx| *rx.borrow());
        assert_eq!(predecessor, Some(false));

        drop(first);
        assert_eq!(second.predecessor.as_ref().map(|rx| *rx.borrow()), Some(true));
    }

    #[test]
    fn test_stale_termination_leaves_newer_generation_alone() {
        let shared = shared();
        let first = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };
        assert_eq!(first.take_demand(), Some(ExitReason::Idle));

        let second = {
            let mut state = shared.state.lock();
            LoopDriver::register(&shared, &mut state)
        };

        drop(first);
        assert!(shared.state.lock().is_loop_active);

        drop(second);
        assert!(!shared.state.lock().is_loop_active);
    }
}
