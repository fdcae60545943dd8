//! Queue backend interface and its RabbitMQ implementation.
//!
//! ## Flow
//!
//! ```text
//! Dispatcher → QueueBackend (rate-limited) → POST /queues/{name} → RelayWorker
//! ```

pub mod rabbit;
pub mod types;

use async_trait::async_trait;

use crate::error::QueueError;

pub use rabbit::RabbitQueueBackend;
pub use types::{
    callback_path, queue_name_problem, QueueDefinition, QueueItem, CALLBACK_PREFIX,
    RESERVED_QUEUE_NAMES,
};

/// Rate-limited, at-least-once delivery queue.
///
/// Each delivery invokes the definition's callback route once per attempt;
/// redelivery policy belongs to the implementation.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Register a definition. Duplicate names are rejected.
    async fn create(&self, definition: QueueDefinition) -> Result<(), QueueError>;

    async fn enqueue(&self, queue_name: &str, item: QueueItem) -> Result<(), QueueError>;

    async fn delete(&self, queue_name: &str) -> Result<(), QueueError>;
}
