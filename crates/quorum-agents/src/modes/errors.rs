//! Orchestration error taxonomy with retry classification.
//!
//! Every error a refinement stage can surface is represented here. Callers
//! query `is_retriable()` / `retry_category()` without string matching.
//!
//! ## Retry categories
//!
//! | Category      | Retriable | Raised by                                  |
//! |---------------|-----------|--------------------------------------------|
//! | Transient     | yes       | transport failures, per-call timeouts      |
//! | ParseFailure  | yes       | no JSON object in reply, missing keys      |
//! | Fatal         | no        | configuration, aborted tasks, bad phases   |
//!
//! Retriable categories share one attempt budget inside the structured call
//! contract. An invalid selection index is not an error at all; it resolves
//! to the last iteration and is flagged on the selection result.

use std::fmt;
use std::time::Duration;

use coordination::state::LogError;
use coordination::TransitionError;
use thiserror::Error;

/// Classification used by the structured call contract to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Backend unreachable, erroring, or slow.
    Transient,
    /// Backend replied but the reply failed extraction or validation.
    ParseFailure,
    /// Never retried.
    Fatal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::ParseFailure)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Unified error type for backend calls, stages, and pipeline runs.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    // ── Retriable ─────────────────────────────────────────────────────────
    /// Backend request failed (connection, HTTP status, body decode).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Backend did not answer within the per-call timeout.
    #[error("Timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// No JSON object could be extracted, or a required key was missing.
    /// `raw` holds the original reply text for diagnosis.
    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    // ── Non-retriable ─────────────────────────────────────────────────────
    /// Invalid run configuration or missing credentials.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A fan-out worker panicked or was cancelled.
    #[error("Task aborted: {0}")]
    TaskAborted(String),

    /// A stage was sequenced out of order.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// An iteration record was appended out of order.
    #[error(transparent)]
    Log(#[from] LogError),
}

impl OrchestrationError {
    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Transport(_) | Self::Timeout(_) => RetryCategory::Transient,
            Self::MalformedResponse { .. } => RetryCategory::ParseFailure,
            Self::Configuration(_)
            | Self::TaskAborted(_)
            | Self::Transition(_)
            | Self::Log(_) => {
                RetryCategory::Fatal
            }
        }
    }

    /// Returns `true` if the structured call contract may retry after this error.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Build a `MalformedResponse` variant conveniently.
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Original reply text, when the error carries one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::RefinementPhase;

    #[test]
    fn transport_failure_is_retriable() {
        let err = OrchestrationError::Transport("connection reset".into());
        assert!(err.is_retriable());
        assert_eq!(err.retry_category(), RetryCategory::Transient);
    }

    #[test]
    fn timeout_is_transient() {
        let err = OrchestrationError::Timeout(Duration::from_secs(120));
        assert_eq!(err.retry_category(), RetryCategory::Transient);
        assert_eq!(err.to_string(), "Timed out after 120s");
    }

    #[test]
    fn malformed_response_keeps_raw_text() {
        let err = OrchestrationError::malformed("no JSON object found", "not json at all");
        assert!(err.is_retriable());
        assert_eq!(err.retry_category(), RetryCategory::ParseFailure);
        assert_eq!(err.raw_response(), Some("not json at all"));
    }

    #[test]
    fn configuration_not_retriable() {
        let err = OrchestrationError::Configuration("iterations must be >= 1".into());
        assert!(!err.is_retriable());
        assert_eq!(err.raw_response(), None);
    }

    #[test]
    fn transition_error_is_fatal() {
        let err: OrchestrationError = TransitionError {
            from: RefinementPhase::Start,
            to: RefinementPhase::Done,
            reason: "skipped".into(),
        }
        .into();
        assert_eq!(err.retry_category(), RetryCategory::Fatal);
    }
}
