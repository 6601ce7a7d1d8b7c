//! Error types for query construction and reconstruction

use thiserror::Error;

/// Errors raised by the validation core
#[derive(Debug, Error)]
pub enum CostvalError {
    /// A query specification violates builder preconditions
    #[error("invalid query spec: {0}")]
    InvalidSpec(String),

    /// A duration string could not be parsed
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    /// The metrics or allocation endpoint was unreachable or returned a non-success status
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected envelope
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The metrics engine reported a query failure
    #[error("query failed ({error_type}): {message}")]
    QueryFailed { error_type: String, message: String },

    /// A sample value could not be parsed as a float
    #[error("malformed sample value {value:?} at {timestamp}")]
    MalformedSample { timestamp: f64, value: String },

    /// A reconstructed interval has no duration
    #[error("degenerate interval for {unit}: {minutes} minutes")]
    DegenerateInterval { unit: String, minutes: f64 },

    /// Interval reconstruction was invoked on a unit without samples
    #[error("cannot reconstruct an interval from an empty sample sequence")]
    EmptySeries,

    /// A window's start lies after its end
    #[error("invalid window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },
}

impl From<reqwest::Error> for CostvalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for CostvalError {
    fn from(err: url::ParseError) -> Self {
        Self::Transport(format!("invalid url: {err}"))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CostvalError>;
