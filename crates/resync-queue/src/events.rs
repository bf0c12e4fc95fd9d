//! # Queue Events
//!
//! Outbound notifications from the loop driver. A UI layer implements
//! [`QueueEventEmitter`] to mirror `is_loop_active`, and the owner of the
//! work hook uses it to surface failures to its own error reporting.

use tracing::{error, info};

use crate::error::QueueError;

/// Trait for emitting queue events.
///
/// Called from the loop task, never while the queue's state lock is held.
/// For a given loop generation, `emit_loop_state(true)` always precedes
/// any `emit_work_error` and the final `emit_loop_state(false)`. A new
/// generation announces itself only after the previous one has emitted its
/// `false`, so loop state events strictly alternate across generations.
pub trait QueueEventEmitter: Send + Sync {
    /// Emits a loop activity change.
    fn emit_loop_state(&self, active: bool);

    /// Emits a failure of the work hook.
    fn emit_work_error(&self, error: &QueueError);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl QueueEventEmitter for NoOpEmitter {
    fn emit_loop_state(&self, _active: bool) {}
    fn emit_work_error(&self, _error: &QueueError) {}
}

/// Emitter that writes every event to the tracing subscriber.
pub struct TracingEmitter {
    name: String,
}

impl TracingEmitter {
    /// Creates an emitter that tags events with the given queue name.
    pub fn new(name: impl Into<String>) -> Self {
        TracingEmitter { name: name.into() }
    }
}

impl QueueEventEmitter for TracingEmitter {
    fn emit_loop_state(&self, active: bool) {
        info!(queue = %self.name, active, "Sync loop state changed");
    }

    fn emit_work_error(&self, error: &QueueError) {
        error!(queue = %self.name, %error, "Sync work reported failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_accept_every_event() {
        let error = QueueError::work("upstream unavailable");
        let emitters: Vec<Box<dyn QueueEventEmitter>> =
            vec![Box::new(NoOpEmitter), Box::new(TracingEmitter::new("photos"))];

        for emitter in &emitters {
            emitter.emit_loop_state(true);
            emitter.emit_work_error(&error);
            emitter.emit_loop_state(false);
        }
    }

    #[test]
    fn test_tracing_emitter_keeps_queue_name() {
        let emitter = TracingEmitter::new(String::from("contacts"));
        assert_eq!(emitter.name, "contacts");
    }
}
