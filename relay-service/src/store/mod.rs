//! Correlation store for in-flight request context.
//!
//! A record is written when an item is enqueued and read back when the
//! processing endpoint calls the status webhook, keyed by the sanitized
//! recipient identifier.

pub mod memory;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

pub use memory::{spawn_sweeper, MemoryCorrelationStore};

/// Lifetime of a correlation record.
pub const CORRELATION_TTL: Duration = Duration::from_secs(7200);

/// Field of the original payload carried back on status callbacks.
pub const CLIENT_REF_FIELD: &str = "client_ref";

/// Canonical storage key for a recipient identifier.
///
/// Phone numbers may arrive with or without a leading `+`, so every `+` is
/// stripped. Applying it twice yields the same key.
pub fn sanitize(recipient: &str) -> String {
    recipient.trim().replace('+', "")
}

/// Context stored for one in-flight request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationRecord {
    /// Sanitized recipient identifier
    pub key: String,
    /// Body of the enqueue request, as received
    pub original_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
    /// Unix epoch seconds
    pub created_at: u64,
}

impl CorrelationRecord {
    /// Build a record for `recipient`, lifting `client_ref` out of the payload.
    pub fn new(recipient: &str, original_payload: Value) -> Self {
        let client_ref = original_payload
            .get(CLIENT_REF_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            key: sanitize(recipient),
            original_payload,
            client_ref,
            created_at,
        }
    }

    /// The `status_url` the producer supplied, if any.
    pub fn status_url(&self) -> Option<&str> {
        self.original_payload
            .get("status_url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Keyed, TTL-bound storage.
///
/// Last write wins per key. An absent or expired key reads as `None`.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn set(&self, key: &str, record: CorrelationRecord, ttl: Duration)
        -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<CorrelationRecord>, StoreError>;

    /// Reset the TTL of a live key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
}
