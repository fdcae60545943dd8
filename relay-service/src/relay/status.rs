//! Status callback relay.
//!
//! The processing endpoint reports completion asynchronously. The callback is
//! matched to its originating request through the correlation store, the
//! stored client reference is re-attached, and the result is forwarded.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::forward::Forwarder;
use crate::store::{sanitize, CorrelationStore, CLIENT_REF_FIELD};

/// Field carrying the recipient identifier.
pub const RECIPIENT_FIELD: &str = "to";

/// Optional field carrying a reply for the recipient.
pub const REPLY_TEXT_FIELD: &str = "replyText";

/// Result of a relayed status callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutcome {
    /// Payload forwarded to the status destination
    pub forwarded: Value,
    pub status_response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_response: Option<Value>,
}

/// Re-attaches correlation context to status callbacks and forwards them.
#[derive(Clone)]
pub struct StatusRelay {
    store: Arc<dyn CorrelationStore>,
    forwarder: Arc<dyn Forwarder>,
    config: Arc<Config>,
}

impl StatusRelay {
    pub fn new(
        store: Arc<dyn CorrelationStore>,
        forwarder: Arc<dyn Forwarder>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            forwarder,
            config,
        }
    }

    pub async fn relay(&self, status: Map<String, Value>) -> Result<StatusOutcome, RelayError> {
        let recipient = status
            .get(RECIPIENT_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Validation(RECIPIENT_FIELD.to_string()))?
            .to_string();

        let key = sanitize(&recipient);
        let record = self.store.get(&key).await?.ok_or_else(|| {
            warn!(recipient_key = %key, "status_correlation_missing");
            RelayError::NotFound(format!("no correlation for {}", key))
        })?;

        let destination = self
            .config
            .status_forward_url
            .as_deref()
            .or_else(|| record.status_url())
            .ok_or_else(|| RelayError::Config("status destination".to_string()))?
            .to_string();

        let reply_text = status
            .get(REPLY_TEXT_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut merged = status;
        match &record.client_ref {
            Some(client_ref) => {
                merged.insert(CLIENT_REF_FIELD.to_string(), Value::String(client_ref.clone()));
            }
            None => {
                merged.remove(CLIENT_REF_FIELD);
            }
        }
        let merged = Value::Object(merged);

        let status_response = self.forwarder.post_json(&destination, &merged, &[]).await?;
        info!(
            recipient_key = %key,
            has_client_ref = record.client_ref.is_some(),
            "status_relayed"
        );

        let reply_response = match reply_text {
            Some(text) => Some(self.forward_reply(&recipient, &text).await?),
            None => None,
        };

        Ok(StatusOutcome {
            forwarded: merged,
            status_response,
            reply_response,
        })
    }

    /// Runs only after the status forward has completed.
    async fn forward_reply(&self, recipient: &str, text: &str) -> Result<Value, RelayError> {
        let url = self.config.reply_forward_url.as_deref().ok_or_else(|| {
            warn!("reply_destination_not_configured");
            RelayError::Config("reply destination".to_string())
        })?;

        let body = json!({ RECIPIENT_FIELD: recipient, REPLY_TEXT_FIELD: text });
        let response = self.forwarder.post_json(url, &body, &[]).await?;
        info!(recipient_key = %sanitize(recipient), "reply_relayed");
        Ok(response)
    }
}
