//! Error taxonomy for the relay pipeline.
//!
//! Collaborators (queue backend, correlation store, HTTP forwarder) have their
//! own error types which fold into [`RelayError`] at the component boundary.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the relay components.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required field was missing or empty.
    #[error("missing required field: {0}")]
    Validation(String),

    /// A field was present but unusable, or the body could not be read.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Identity check failed or the internal token did not match.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Correlation record missing/expired, or queue unknown to the backend.
    #[error("not found: {0}")]
    NotFound(String),

    /// A destination needed by this operation is not configured.
    #[error("destination not configured: {0}")]
    Config(String),

    /// A collaborator call failed.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

/// Errors reported by a [`crate::queue::QueueBackend`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {0} already exists")]
    AlreadyExists(String),

    #[error("queue {0} does not exist")]
    NotFound(String),

    #[error("queue backend error: {0}")]
    Backend(String),
}

/// Errors reported by a [`crate::store::CorrelationStore`].
#[derive(Debug, Error)]
#[error("correlation store error: {0}")]
pub struct StoreError(pub String);

/// Errors reported by a [`crate::forward::Forwarder`].
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The destination answered with a non-2xx status.
    #[error("destination responded with status {status}: {body}")]
    Status { status: u16, body: Value },
}

impl From<QueueError> for RelayError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(name) => RelayError::NotFound(format!("queue {name}")),
            other => RelayError::Upstream(other.to_string()),
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        RelayError::Upstream(err.to_string())
    }
}

impl From<ForwardError> for RelayError {
    fn from(err: ForwardError) -> Self {
        RelayError::Upstream(err.to_string())
    }
}
