//! Result vocabulary shared by polled checks and the poller.

use thiserror::Error;

/// What a single attempt of a polled check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome<T = ()> {
    Success(T),
    /// Still converging; try again after the retry interval.
    Retryable(String),
    /// Can never succeed; stop polling now.
    Fatal(String),
}

impl<T> StageOutcome<T> {
    pub fn retryable(cause: impl Into<String>) -> Self {
        StageOutcome::Retryable(cause.into())
    }

    pub fn fatal(cause: impl Into<String>) -> Self {
        StageOutcome::Fatal(cause.into())
    }

    /// Turn an error into a retryable outcome, keeping its full context chain.
    pub fn retry_on_err(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => StageOutcome::Success(value),
            Err(err) => StageOutcome::Retryable(format!("{err:#}")),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }
}

/// Why a poll ended without success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollFailure {
    #[error("{0}")]
    Fatal(String),
    #[error("timed out waiting for {what}")]
    TimedOut { what: String, last_cause: Option<String> },
    #[error("interrupted while waiting for {what}")]
    Interrupted { what: String },
}

impl PollFailure {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, PollFailure::Interrupted { .. })
    }
}
