//! Error types for picompute.
//!
//! Three layers:
//! - `InvokeError`: one worker call went wrong (always a value, never a panic)
//! - `AbortReason`: why a run ended without an estimate
//! - `PiError`: setup and infrastructure failures around a run

use thiserror::Error;

/// Top-level error type for picompute.
#[derive(Debug, Error)]
pub enum PiError {
    // ═══════════════════════════════════════════════════════════════════
    // Rejected input
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    // ═══════════════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════════════

    #[error("Not enough workers for service '{service}': requested {requested}, available {available}")]
    InsufficientCapacity {
        service: String,
        requested: usize,
        available: usize,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PiError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failure of a single worker invocation.
///
/// Produced by the invoker and the dispatcher; the controller turns it into a
/// retry or an abort.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    /// The worker could not be reached (connect, timeout, broken body).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The worker answered but reported a failed computation.
    #[error("Worker error: {message}")]
    Worker { message: String },

    /// The worker answered with something that does not fit the contract.
    #[error("Bad response: {0}")]
    BadResponse(String),

    /// The task running the invocation died before producing a value.
    #[error("Invocation task failed: {0}")]
    TaskFailed(String),
}

impl InvokeError {
    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Worker { .. } => "worker",
            Self::BadResponse(_) => "bad_response",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}

/// Why a run terminated without producing a `RunResult`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbortReason {
    #[error("Insufficient resources: requested {requested} workers, {available} available")]
    InsufficientResources { requested: usize, available: usize },

    #[error("Precision not reached after {rounds} rounds (last estimate: {last_estimate:?}, last failure: {last_failure:?})")]
    ExhaustedRetries {
        rounds: u32,
        last_estimate: Option<f64>,
        last_failure: Option<InvokeError>,
    },

    #[error("Invalid run request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for picompute.
pub type Result<T> = std::result::Result<T, PiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_error_kinds() {
        assert_eq!(InvokeError::Transport("refused".into()).kind(), "transport");
        assert_eq!(
            InvokeError::Worker {
                message: "boom".into()
            }
            .kind(),
            "worker"
        );
        assert_eq!(InvokeError::BadResponse("x".into()).kind(), "bad_response");
    }

    #[test]
    fn test_abort_reason_display() {
        let reason = AbortReason::InsufficientResources {
            requested: 5,
            available: 3,
        };
        assert_eq!(
            reason.to_string(),
            "Insufficient resources: requested 5 workers, 3 available"
        );
    }
}
