//! Error types for the polling scheduler.

use crate::scheduler::RequestKind;

/// Top-level error type for the poller.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// A request was submitted before a fetcher was registered for its kind.
    #[error("fetcher for request kind `{kind}` must be registered before submitting requests")]
    UnregisteredHandler {
        /// Kind that has no registered fetcher.
        kind: RequestKind,
    },

    /// The tick clock could not report elapsed time.
    #[error("clock error: {0}")]
    Clock(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PollError>;
