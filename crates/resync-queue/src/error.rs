//! # Queue Error Types
//!
//! Error types for the coalescing queue.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Queue Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │      Work       │  │       Runtime           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  WorkFailed     │  │  NoRuntime              │ │
//! │  │  ConfigLoad...  │  │  WorkPanicked   │  │                         │ │
//! │  │  ConfigSave...  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage errors (clearing a live loop reference, cancelling an idle queue)
//! are not represented here. They are logged and ignored.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue error type.
///
/// Work errors never escape the loop driver; they are handed to the
/// [`QueueEventEmitter`](crate::events::QueueEventEmitter) instead.
#[derive(Debug, Error)]
pub enum QueueError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid queue configuration.
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Work Errors
    // =========================================================================
    /// The work hook returned an error.
    #[error("Sync work failed: {0}")]
    WorkFailed(String),

    /// The work hook panicked.
    #[error("Sync work panicked: {0}")]
    WorkPanicked(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// No tokio runtime was reachable to host the loop.
    #[error("No tokio runtime available to run the sync loop")]
    NoRuntime,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for QueueError {
    fn from(err: toml::de::Error) -> Self {
        QueueError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for QueueError {
    fn from(err: toml::ser::Error) -> Self {
        QueueError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl QueueError {
    /// Creates a work failure from anything printable.
    pub fn work(message: impl std::fmt::Display) -> Self {
        QueueError::WorkFailed(message.to_string())
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            QueueError::InvalidConfig(_)
                | QueueError::ConfigLoadFailed(_)
                | QueueError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error came out of the work hook.
    pub fn is_work_error(&self) -> bool {
        matches!(self, QueueError::WorkFailed(_) | QueueError::WorkPanicked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(QueueError::InvalidConfig("bad".into()).is_config_error());
        assert!(QueueError::ConfigSaveFailed("disk".into()).is_config_error());
        assert!(!QueueError::NoRuntime.is_config_error());

        assert!(QueueError::work("timeout").is_work_error());
        assert!(QueueError::WorkPanicked("boom".into()).is_work_error());
        assert!(!QueueError::NoRuntime.is_work_error());
    }

    #[test]
    fn test_error_display() {
        let err = QueueError::work("remote unreachable");
        assert_eq!(err.to_string(), "Sync work failed: remote unreachable");
    }

    #[test]
    fn test_toml_error_is_load_failure() {
        let err: QueueError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(matches!(err, QueueError::ConfigLoadFailed(_)));
    }
}
