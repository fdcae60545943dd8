//! Queue Relay - rate-limited relay between producers, an AI processing
//! endpoint and status webhooks.
//!
//! ## Architecture
//!
//! ```text
//! client → /queues/additem → correlation store + queue backend
//!        → /queues/{name} (delivery) → processing endpoint
//!        → /webhooks/status → status destination (+ reply destination)
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod queue;
pub mod relay;
pub mod store;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{Config, InboundFailurePolicy};
pub use error::{ForwardError, QueueError, RelayError, StoreError};
pub use forward::{Forwarder, HttpForwarder};
pub use queue::{QueueBackend, QueueDefinition, QueueItem, RabbitQueueBackend};
pub use relay::{Dispatcher, InboundGateway, RelayWorker, StatusRelay};
pub use store::{sanitize, CorrelationRecord, CorrelationStore, MemoryCorrelationStore};
pub use web::AppState;
