//! Queue provisioning and enqueueing.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::queue::{queue_name_problem, QueueBackend, QueueDefinition, QueueItem};
use crate::store::{sanitize, CorrelationRecord, CorrelationStore, CORRELATION_TTL};

/// Submits and withdraws queue definitions and enqueues work items.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn QueueBackend>,
    store: Arc<dyn CorrelationStore>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        store: Arc<dyn CorrelationStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    /// Register a queue bound to the internal callback route.
    ///
    /// Missing or zero limits take the configured defaults. The name must
    /// be usable as the last segment of the callback route.
    pub async fn create_queue(
        &self,
        name: &str,
        max_inflight: Option<u32>,
        msg_per_second: Option<u32>,
    ) -> Result<QueueDefinition, RelayError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::Validation("name".to_string()));
        }
        if let Some(problem) = queue_name_problem(name) {
            return Err(RelayError::Invalid(problem));
        }

        let definition = QueueDefinition::new(
            name,
            max_inflight
                .filter(|v| *v > 0)
                .unwrap_or(self.config.default_max_inflight),
            msg_per_second
                .filter(|v| *v > 0)
                .unwrap_or(self.config.default_msg_per_second),
        );

        self.backend.create(definition.clone()).await?;

        info!(
            queue = %definition.name,
            max_inflight = definition.max_inflight,
            msg_per_second = definition.msg_per_second,
            "queue_created"
        );

        Ok(definition)
    }

    pub async fn delete_queue(&self, name: &str) -> Result<(), RelayError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::Validation("name".to_string()));
        }

        self.backend.delete(name).await?;
        info!(queue = %name, "queue_deleted");
        Ok(())
    }

    /// Store correlation context for `recipient_key`, then enqueue `payload`.
    ///
    /// The correlation write always precedes the enqueue. If the enqueue
    /// fails the record stays behind until it expires.
    pub async fn enqueue_item(
        &self,
        queue_name: &str,
        recipient_key: &str,
        status_url: &str,
        payload: Value,
    ) -> Result<(), RelayError> {
        let key = sanitize(recipient_key);
        let missing: Vec<&str> = [
            ("name", queue_name),
            ("to", key.as_str()),
            ("status_url", status_url),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();

        if !missing.is_empty() {
            return Err(RelayError::Validation(missing.join(", ")));
        }

        let token = self
            .config
            .internal_token
            .clone()
            .ok_or_else(|| RelayError::Config("internal token".to_string()))?;

        let record = CorrelationRecord::new(recipient_key, payload.clone());
        self.store.set(&key, record, CORRELATION_TTL).await?;

        info!(queue = %queue_name, recipient_key = %key, "correlation_stored");

        if let Err(e) = self
            .backend
            .enqueue(queue_name, QueueItem::new(payload, token))
            .await
        {
            warn!(
                queue = %queue_name,
                recipient_key = %key,
                error = %e,
                "enqueue_failed_correlation_orphaned"
            );
            return Err(e.into());
        }

        info!(queue = %queue_name, recipient_key = %key, "item_enqueued");
        Ok(())
    }
}
