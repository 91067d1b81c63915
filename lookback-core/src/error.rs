//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum LookbackError {
    /// A pipeline was assembled from incompatible parts, e.g. an agent-count
    /// mismatch or a victim that does not expose its internal signals.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Lane index out of range.
    #[error("Lane {lane} is out of range for {num_lanes} lanes")]
    LaneOutOfRange {
        /// Requested lane.
        lane: usize,
        /// Number of lanes of the environment.
        num_lanes: usize,
    },

    /// The environment was stepped before the first reset.
    #[error("Environment must be reset before stepping")]
    NotReset,

    /// `step_wait` was called without a preceding `step_async`.
    #[error("step_wait called without a pending step_async")]
    NoPendingStep,

    /// A lane worker hung up.
    #[error("Worker of lane {0} disconnected")]
    WorkerDisconnected(usize),
}

impl LookbackError {
    /// Shorthand for a boxed [`LookbackError::ConfigurationError`].
    pub fn config(msg: impl Into<String>) -> anyhow::Error {
        LookbackError::ConfigurationError(msg.into()).into()
    }
}
