use thiserror::Error;

use crate::config::PredictionMode;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Other(String),
}

/// Classified outcome of one upstream attempt that did not yield data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamFailure {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("plan limitation: {0}")]
    PlanLimited(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transient failure: {0}")]
    Transient(String),
}

impl UpstreamFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamFailure::Transient(_))
    }

    /// Rate and plan limits are policy answers from a healthy service.
    pub fn is_policy_limit(&self) -> bool {
        matches!(
            self,
            UpstreamFailure::RateLimited(_) | UpstreamFailure::PlanLimited(_)
        )
    }
}

impl From<TransportError> for UpstreamFailure {
    fn from(err: TransportError) -> Self {
        UpstreamFailure::Transient(err.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScorerError {
    #[error("scorer timed out")]
    Timeout,
    #[error("scorer returned http {0}")]
    Status(u16),
    #[error("scorer payload malformed: {0}")]
    Malformed(String),
    #[error("scorer request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PredictionError {
    #[error("scorer unavailable in {mode} mode: {reason}")]
    ScorerUnavailable {
        mode: PredictionMode,
        reason: String,
    },
}
