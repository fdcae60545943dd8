//! RabbitMQ-backed [`QueueBackend`].
//!
//! Each created queue gets its own consumer channel with a prefetch of
//! `max_inflight`, and deliveries are paced to `msg_per_second`. A delivery
//! is POSTed to the definition's callback route and settled from the answer:
//!
//! - 2xx acks it.
//! - A permanent 4xx rejects it without requeue.
//! - Anything else requeues it until the broker has delivered it
//!   [`MAX_DELIVERY_ATTEMPTS`] times, then rejects it.
//!
//! Rejected deliveries go to the dead-letter exchange when one is configured
//! and are dropped otherwise. If a consumer stream ends underneath a queue,
//! the consumer is re-opened; when that keeps failing the queue is retired
//! from the registry so that `enqueue` stops accepting items for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions, QueueDeleteOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use reqwest::{header::CONTENT_TYPE, Client};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use url::Url;

use super::{QueueBackend, QueueDefinition, QueueItem};
use crate::error::QueueError;

/// Deliveries are rejected once the broker has handed them out this often.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 10;

/// Consumer re-open attempts before a queue is retired.
const REOPEN_ATTEMPTS: u32 = 5;

/// Header quorum queues use to count earlier deliveries of a message.
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

const DEAD_LETTER_ARGUMENT: &str = "x-dead-letter-exchange";

/// RabbitMQ queue backend with lazy connection management.
#[derive(Clone)]
pub struct RabbitQueueBackend {
    inner: Arc<BackendInner>,
}

struct BackendInner {
    url: String,
    callback_base: Url,
    dead_letter_exchange: Option<String>,
    client: Client,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
    queues: RwLock<HashMap<String, RunningQueue>>,
    generation: AtomicU64,
}

struct RunningQueue {
    definition: QueueDefinition,
    /// Distinguishes this registration from a later one under the same name.
    generation: u64,
    /// `None` while the consumer is being re-opened.
    channel: Option<Channel>,
    consumer: JoinHandle<()>,
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Ack,
    Requeue,
    Reject,
}

fn backend_err(context: &'static str) -> impl Fn(lapin::Error) -> QueueError {
    move |e| QueueError::Backend(format!("{}: {}", context, e))
}

/// Spacing between deliveries for a given rate.
fn delivery_period(msg_per_second: u32) -> Duration {
    Duration::from_secs(1) / msg_per_second.max(1)
}

/// Back-off before the given consumer re-open attempt (1-based).
fn reopen_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5);
    Duration::from_secs(1 << exp).min(Duration::from_secs(30))
}

/// 4xx answers that a retry cannot change.
fn is_permanent(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

/// Settle a delivery from the callback status (`None` when the callback was
/// unreachable) and the number of earlier deliveries of the same message.
fn settle_decision(status: Option<u16>, prior_deliveries: u32) -> Settle {
    match status {
        Some(code) if (200..300).contains(&code) => Settle::Ack,
        Some(code) if is_permanent(code) => Settle::Reject,
        _ if prior_deliveries.saturating_add(1) >= MAX_DELIVERY_ATTEMPTS => Settle::Reject,
        _ => Settle::Requeue,
    }
}

/// Earlier deliveries of a message, as counted by the broker. Zero when the
/// queue type does not track it.
fn delivery_count(properties: &BasicProperties) -> u32 {
    let Some(headers) = properties.headers().as_ref() else {
        return 0;
    };
    let count = headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)
        .and_then(|(_, value)| match value {
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
            _ => None,
        });
    count.unwrap_or(0)
}

/// Declaration arguments for every queue this backend creates.
fn queue_arguments(dead_letter_exchange: Option<&str>) -> FieldTable {
    let mut arguments = FieldTable::default();
    if let Some(exchange) = dead_letter_exchange {
        arguments.insert(
            DEAD_LETTER_ARGUMENT.into(),
            AMQPValue::LongString(exchange.to_string().into()),
        );
    }
    arguments
}

async fn close_channel(queue: &str, channel: &Channel, reason: &str) {
    if let Err(e) = channel.close(200, reason).await {
        warn!(queue = %queue, error = %e, "rabbitmq_consumer_channel_close_error");
    }
}

impl RabbitQueueBackend {
    /// Create a backend that calls deliveries back under `callback_base_url`.
    ///
    /// Rejected deliveries are routed to `dead_letter_exchange` when given.
    pub fn new(
        url: String,
        callback_base_url: &str,
        dead_letter_exchange: Option<String>,
        client: Client,
    ) -> Result<Self, url::ParseError> {
        let callback_base = Url::parse(callback_base_url)?;
        Ok(Self {
            inner: Arc::new(BackendInner {
                url,
                callback_base,
                dead_letter_exchange,
                client,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
                queues: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Ensure we have a valid connection and publishing channel.
    async fn ensure_connected(&self) -> Result<Channel, QueueError> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_backend_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .map_err(backend_err("Failed to connect to RabbitMQ"))?;

        let ch = conn
            .create_channel()
            .await
            .map_err(backend_err("Failed to create channel"))?;

        info!("rabbitmq_backend_connected");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    async fn open_consumer_channel(&self) -> Result<Channel, QueueError> {
        self.ensure_connected().await?;
        let connection = self.inner.connection.read().await;
        let conn = connection
            .as_ref()
            .ok_or_else(|| QueueError::Backend("connection unavailable".to_string()))?;
        conn.create_channel()
            .await
            .map_err(backend_err("Failed to create consumer channel"))
    }

    /// Open a channel, declare the queue and start consuming it.
    ///
    /// The channel is closed again if any step after opening it fails.
    async fn open_consumer(
        &self,
        definition: &QueueDefinition,
    ) -> Result<(Channel, Consumer), QueueError> {
        let channel = self.open_consumer_channel().await?;
        match self.declare_and_consume(&channel, definition).await {
            Ok(consumer) => Ok((channel, consumer)),
            Err(e) => {
                close_channel(&definition.name, &channel, "Queue setup failed").await;
                Err(e)
            }
        }
    }

    async fn declare_and_consume(
        &self,
        channel: &Channel,
        definition: &QueueDefinition,
    ) -> Result<Consumer, QueueError> {
        channel
            .queue_declare(
                &definition.name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_arguments(self.inner.dead_letter_exchange.as_deref()),
            )
            .await
            .map_err(backend_err("Failed to declare queue"))?;

        let prefetch = u16::try_from(definition.max_inflight).unwrap_or(u16::MAX);
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(backend_err("Failed to set QoS"))?;

        channel
            .basic_consume(
                &definition.name,
                &format!("queue-relay-{}", definition.name),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(backend_err("Failed to start consumer"))
    }

    /// Whether `generation` is still the live registration for `name`.
    async fn is_current(&self, name: &str, generation: u64) -> bool {
        self.inner
            .queues
            .read()
            .await
            .get(name)
            .is_some_and(|running| running.generation == generation)
    }

    /// Install a re-opened consumer channel. False if the queue was deleted
    /// or re-created meanwhile.
    async fn replace_channel(&self, name: &str, generation: u64, channel: Channel) -> bool {
        match self.inner.queues.write().await.get_mut(name) {
            Some(running) if running.generation == generation => {
                running.channel = Some(channel);
                true
            }
            _ => false,
        }
    }

    /// Drop the registration for `name` if it is still `generation`.
    async fn retire(&self, name: &str, generation: u64) -> bool {
        let mut queues = self.inner.queues.write().await;
        if !queues
            .get(name)
            .is_some_and(|running| running.generation == generation)
        {
            return false;
        }
        queues.remove(name);
        true
    }

    /// Consume `definition` until it is deleted or can no longer be consumed.
    async fn supervise(
        self,
        definition: QueueDefinition,
        callback_url: Url,
        generation: u64,
        mut consumer: Consumer,
    ) {
        let period = delivery_period(definition.msg_per_second);

        loop {
            let client = self.inner.client.clone();
            let callback = callback_url.clone();
            let queue = definition.name.clone();
            let dispatched = run_consumer(&definition.name, consumer, period, |delivery| {
                let client = client.clone();
                let callback = callback.clone();
                let queue = queue.clone();
                tokio::spawn(async move {
                    deliver(&client, &callback, &queue, delivery).await;
                });
            })
            .await;

            warn!(queue = %definition.name, dispatched = dispatched, "rabbitmq_consumer_closed");

            match self.reopen(&definition, generation).await {
                Some(next) => consumer = next,
                None => return,
            }
        }
    }

    async fn reopen(&self, definition: &QueueDefinition, generation: u64) -> Option<Consumer> {
        let name = definition.name.as_str();

        for attempt in 1..=REOPEN_ATTEMPTS {
            tokio::time::sleep(reopen_delay(attempt)).await;

            if !self.is_current(name, generation).await {
                return None;
            }

            match self.open_consumer(definition).await {
                Ok((channel, consumer)) => {
                    if self.replace_channel(name, generation, channel.clone()).await {
                        info!(queue = %name, attempt = attempt, "rabbitmq_consumer_reopened");
                        return Some(consumer);
                    }
                    close_channel(name, &channel, "Queue deleted").await;
                    return None;
                }
                Err(e) => {
                    warn!(
                        queue = %name,
                        attempt = attempt,
                        error = %e,
                        "rabbitmq_consumer_reopen_failed"
                    );
                }
            }
        }

        if self.retire(name, generation).await {
            error!(queue = %name, attempts = REOPEN_ATTEMPTS, "rabbitmq_queue_retired");
        }
        None
    }

    /// Names of the queues this process is consuming.
    pub async fn queue_names(&self) -> Vec<String> {
        self.inner.queues.read().await.keys().cloned().collect()
    }

    /// Stop all consumers and close the connection gracefully.
    pub async fn close(&self) {
        let mut queues = self.inner.queues.write().await;
        for (name, running) in queues.drain() {
            running.consumer.abort();
            if let Some(channel) = running.channel {
                close_channel(&name, &channel, "Normal shutdown").await;
            }
        }
        drop(queues);

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_backend_closed");
    }
}

#[async_trait]
impl QueueBackend for RabbitQueueBackend {
    async fn create(&self, definition: QueueDefinition) -> Result<(), QueueError> {
        if self.inner.queues.read().await.contains_key(&definition.name) {
            return Err(QueueError::AlreadyExists(definition.name));
        }

        let callback_url = self
            .inner
            .callback_base
            .join(&definition.callback_path)
            .map_err(|e| QueueError::Backend(format!("Invalid callback route: {}", e)))?;

        let (channel, consumer) = self.open_consumer(&definition).await?;

        let mut queues = self.inner.queues.write().await;
        if queues.contains_key(&definition.name) {
            drop(queues);
            close_channel(&definition.name, &channel, "Duplicate queue").await;
            return Err(QueueError::AlreadyExists(definition.name));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            queue = %definition.name,
            max_inflight = definition.max_inflight,
            msg_per_second = definition.msg_per_second,
            callback_url = %callback_url,
            "rabbitmq_queue_created"
        );

        let task = tokio::spawn(self.clone().supervise(
            definition.clone(),
            callback_url,
            generation,
            consumer,
        ));

        queues.insert(
            definition.name.clone(),
            RunningQueue {
                definition,
                generation,
                channel: Some(channel),
                consumer: task,
            },
        );

        Ok(())
    }

    async fn enqueue(&self, queue_name: &str, item: QueueItem) -> Result<(), QueueError> {
        if !self.inner.queues.read().await.contains_key(queue_name) {
            return Err(QueueError::NotFound(queue_name.to_string()));
        }

        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(&item)
            .map_err(|e| QueueError::Backend(format!("Failed to serialize item: {}", e)))?;

        channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(backend_err("Failed to publish item"))?
            .await
            .map_err(backend_err("Failed to confirm publish"))?;

        info!(
            queue = %queue_name,
            body_length = body.len(),
            "rabbitmq_item_published"
        );

        Ok(())
    }

    async fn delete(&self, queue_name: &str) -> Result<(), QueueError> {
        let running = self
            .inner
            .queues
            .write()
            .await
            .remove(queue_name)
            .ok_or_else(|| QueueError::NotFound(queue_name.to_string()))?;

        running.consumer.abort();
        if let Some(channel) = &running.channel {
            close_channel(queue_name, channel, "Queue deleted").await;
        }

        let channel = self.ensure_connected().await?;
        let purged = channel
            .queue_delete(queue_name, QueueDeleteOptions::default())
            .await
            .map_err(backend_err("Failed to delete queue"))?;

        info!(
            queue = %queue_name,
            max_inflight = running.definition.max_inflight,
            discarded_messages = purged,
            "rabbitmq_queue_deleted"
        );

        Ok(())
    }
}

/// Hand each delivery to `dispatch`, at most one per `period`, until the
/// stream ends. Returns how many deliveries were dispatched.
async fn run_consumer<S, D, E, F>(
    queue: &str,
    mut deliveries: S,
    period: Duration,
    mut dispatch: F,
) -> usize
where
    S: Stream<Item = Result<D, E>> + Unpin,
    E: std::fmt::Display,
    F: FnMut(D),
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut dispatched = 0;

    while let Some(delivery) = deliveries.next().await {
        match delivery {
            Ok(delivery) => {
                ticker.tick().await;
                dispatch(delivery);
                dispatched += 1;
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "rabbitmq_delivery_error");
            }
        }
    }

    dispatched
}

/// POST one delivery to the callback route and settle it.
async fn deliver(client: &Client, callback_url: &Url, queue: &str, delivery: Delivery) {
    let delivery_tag = delivery.delivery_tag;
    let prior_deliveries = delivery_count(&delivery.properties);

    let status = match client
        .post(callback_url.clone())
        .header(CONTENT_TYPE, "application/json")
        .body(delivery.data.clone())
        .send()
        .await
    {
        Ok(resp) => {
            let status = resp.status();
            info!(
                queue = %queue,
                delivery_tag = delivery_tag,
                redelivered = delivery.redelivered,
                status_code = status.as_u16(),
                "queue_delivery_complete"
            );
            Some(status.as_u16())
        }
        Err(e) => {
            error!(queue = %queue, delivery_tag = delivery_tag, error = %e, "queue_delivery_failed");
            None
        }
    };

    let decision = settle_decision(status, prior_deliveries);
    let settled = match decision {
        Settle::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
        Settle::Requeue => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        Settle::Reject => {
            error!(
                queue = %queue,
                delivery_tag = delivery_tag,
                status_code = ?status,
                prior_deliveries = prior_deliveries,
                "queue_delivery_abandoned"
            );
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
        }
    };

    if let Err(e) = settled {
        error!(
            queue = %queue,
            delivery_tag = delivery_tag,
            decision = ?decision,
            error = %e,
            "rabbitmq_settle_failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn backend() -> RabbitQueueBackend {
        RabbitQueueBackend::new(
            "amqp://localhost:5672".to_string(),
            "http://127.0.0.1:3000",
            None,
            Client::new(),
        )
        .unwrap()
    }

    async fn register(backend: &RabbitQueueBackend, name: &str, generation: u64) {
        backend.inner.queues.write().await.insert(
            name.to_string(),
            RunningQueue {
                definition: QueueDefinition::new(name, 30, 1),
                generation,
                channel: None,
                consumer: tokio::spawn(async {}),
            },
        );
    }

    #[test]
    fn test_backend_creation() {
        let backend = backend();
        assert!(Arc::strong_count(&backend.inner) == 1);
    }

    #[test]
    fn test_backend_rejects_bad_callback_base() {
        let result = RabbitQueueBackend::new(
            "amqp://localhost:5672".to_string(),
            "not a url",
            None,
            Client::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_delivery_period() {
        assert_eq!(delivery_period(1), Duration::from_secs(1));
        assert_eq!(delivery_period(4), Duration::from_millis(250));
        assert_eq!(delivery_period(0), Duration::from_secs(1));
    }

    #[test]
    fn test_reopen_delay_backs_off_with_cap() {
        assert_eq!(reopen_delay(1), Duration::from_secs(1));
        assert_eq!(reopen_delay(2), Duration::from_secs(2));
        assert_eq!(reopen_delay(4), Duration::from_secs(8));
        assert_eq!(reopen_delay(9), Duration::from_secs(30));
    }

    #[test]
    fn test_settle_acks_success() {
        assert_eq!(settle_decision(Some(200), 0), Settle::Ack);
        assert_eq!(settle_decision(Some(204), MAX_DELIVERY_ATTEMPTS), Settle::Ack);
    }

    #[test]
    fn test_settle_rejects_permanent_failures_immediately() {
        for code in [400, 401, 403, 404, 422] {
            assert_eq!(settle_decision(Some(code), 0), Settle::Reject, "{code}");
        }
    }

    #[test]
    fn test_settle_requeues_transient_failures() {
        for status in [Some(500), Some(503), Some(408), Some(429), None] {
            assert_eq!(settle_decision(status, 0), Settle::Requeue, "{status:?}");
        }
        assert_eq!(
            settle_decision(Some(503), MAX_DELIVERY_ATTEMPTS - 2),
            Settle::Requeue
        );
    }

    #[test]
    fn test_settle_rejects_after_delivery_cap() {
        assert_eq!(
            settle_decision(Some(503), MAX_DELIVERY_ATTEMPTS - 1),
            Settle::Reject
        );
        assert_eq!(settle_decision(None, MAX_DELIVERY_ATTEMPTS + 5), Settle::Reject);
    }

    #[test]
    fn test_delivery_count_header() {
        let with = |value: AMQPValue| {
            let mut headers = FieldTable::default();
            headers.insert(DELIVERY_COUNT_HEADER.into(), value);
            BasicProperties::default().with_headers(headers)
        };

        assert_eq!(delivery_count(&BasicProperties::default()), 0);
        assert_eq!(delivery_count(&with(AMQPValue::LongLongInt(3))), 3);
        assert_eq!(delivery_count(&with(AMQPValue::LongInt(2))), 2);
        assert_eq!(delivery_count(&with(AMQPValue::LongLongInt(-1))), 0);
        assert_eq!(
            delivery_count(&with(AMQPValue::LongString("7".to_string().into()))),
            0
        );
    }

    #[test]
    fn test_queue_arguments_carry_dead_letter_exchange() {
        assert!(queue_arguments(None).inner().is_empty());

        let arguments = queue_arguments(Some("relay.dead"));
        let (key, value) = arguments.inner().iter().next().unwrap();
        assert_eq!(key.as_str(), DEAD_LETTER_ARGUMENT);
        assert_eq!(
            value,
            &AMQPValue::LongString("relay.dead".to_string().into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_paces_deliveries_until_stream_ends() {
        let period = Duration::from_millis(250);
        let start = Instant::now();
        let deliveries: Vec<Result<u32, String>> =
            vec![Ok(1), Err("frame error".to_string()), Ok(2), Ok(3)];
        let mut seen = Vec::new();

        let dispatched = run_consumer("q1", futures::stream::iter(deliveries), period, |n| {
            seen.push((n, start.elapsed()));
        })
        .await;

        assert_eq!(dispatched, 3);
        assert_eq!(seen.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(seen[0].1 < period);
        for pair in seen.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= period, "{pair:?}");
        }
    }

    #[tokio::test]
    async fn test_consumer_returns_on_empty_stream() {
        let deliveries = futures::stream::empty::<Result<u32, String>>();
        let dispatched = run_consumer("q1", deliveries, Duration::from_secs(1), |_| {
            panic!("nothing to dispatch");
        })
        .await;
        assert_eq!(dispatched, 0);
    }

    #[tokio::test]
    async fn test_retired_queue_stops_accepting_items() {
        let backend = backend();
        register(&backend, "q1", 1).await;

        assert!(backend.is_current("q1", 1).await);
        assert!(backend.retire("q1", 1).await);
        assert!(!backend.is_current("q1", 1).await);
        assert!(backend.queue_names().await.is_empty());

        let err = backend
            .enqueue("q1", QueueItem::new(serde_json::json!({}), String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(ref n) if n == "q1"));
    }

    #[tokio::test]
    async fn test_stale_supervisor_leaves_newer_registration() {
        let backend = backend();
        register(&backend, "q1", 2).await;

        assert!(!backend.retire("q1", 1).await);
        assert!(!backend.is_current("q1", 1).await);
        assert_eq!(backend.queue_names().await, vec!["q1".to_string()]);
    }

    #[tokio::test]
    async fn test_create_refuses_registered_name_before_broker_work() {
        let backend = backend();
        register(&backend, "q1", 1).await;

        let err = backend
            .create(QueueDefinition::new("q1", 30, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(ref n) if n == "q1"));
    }

    #[tokio::test]
    async fn test_enqueue_unknown_queue_is_not_found() {
        let backend = backend();
        let err = backend
            .enqueue("missing", QueueItem::new(serde_json::json!({}), String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn test_delete_unknown_queue_is_not_found() {
        let backend = backend();
        let err = backend.delete("missing").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }
}
