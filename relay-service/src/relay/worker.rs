//! Delivery handler invoked by the queue backend for each item.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::forward::Forwarder;
use crate::queue::QueueItem;

/// Header carrying the shared secret to the processing endpoint.
pub const PROCESSING_KEY_HEADER: &str = "X-Vgai-Key";

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Forwards delivered items to the processing endpoint.
///
/// Never retries; a failed forward is reported back to the queue backend,
/// which owns redelivery.
#[derive(Clone)]
pub struct RelayWorker {
    forwarder: Arc<dyn Forwarder>,
    config: Arc<Config>,
}

impl RelayWorker {
    pub fn new(forwarder: Arc<dyn Forwarder>, config: Arc<Config>) -> Self {
        Self { forwarder, config }
    }

    /// Whether `token` is the configured shared secret.
    ///
    /// With no secret configured nothing is trusted.
    pub fn is_trusted(&self, token: &str) -> bool {
        match self.config.internal_token.as_deref() {
            Some(secret) if !secret.is_empty() => constant_time_compare(secret, token),
            _ => false,
        }
    }

    /// Authenticate one delivery and forward its payload.
    pub async fn handle(&self, queue_name: &str, item: QueueItem) -> Result<Value, RelayError> {
        if !self.is_trusted(&item.internal_auth_token) {
            warn!(queue = %queue_name, "delivery_token_rejected");
            return Err(RelayError::Auth("internal token mismatch".to_string()));
        }

        let url = self
            .config
            .processing_url
            .as_deref()
            .ok_or_else(|| RelayError::Config("processing endpoint".to_string()))?;

        let response = self
            .forwarder
            .post_json(
                url,
                &item.payload,
                &[(PROCESSING_KEY_HEADER, item.internal_auth_token.as_str())],
            )
            .await
            .map_err(|e| {
                error!(queue = %queue_name, error = %e, "processing_forward_failed");
                RelayError::from(e)
            })?;

        info!(queue = %queue_name, response = %response, "processing_forward_complete");
        Ok(response)
    }
}
