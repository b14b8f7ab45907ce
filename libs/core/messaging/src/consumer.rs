use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::publisher::{DeadLetter, Publisher, RETRY_COUNT_HEADER};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::{AMQPValue, FieldTable},
    Channel, Connection,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long shutdown waits for in-flight messages to reach a terminal
/// state before giving up and closing the channel.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A delivery as seen by a processor.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Raw message body.
    pub payload: Vec<u8>,

    /// Prior delivery attempts, read from the `x-retry-count` header.
    pub retry_count: u32,

    /// Routing key the message arrived under.
    pub routing_key: String,
}

impl IncomingMessage {
    fn from_delivery(delivery: &Delivery) -> Self {
        let retry_count = delivery
            .properties
            .headers()
            .as_ref()
            .and_then(|headers| {
                headers
                    .inner()
                    .iter()
                    .find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
                    .map(|(_, value)| value)
            })
            .and_then(|value| match value {
                AMQPValue::LongInt(n) => Some(*n as u32),
                AMQPValue::LongLongInt(n) => Some(*n as u32),
                AMQPValue::ShortInt(n) => Some(*n as u32),
                _ => None,
            })
            .unwrap_or(0);

        Self {
            payload: delivery.data.clone(),
            retry_count,
            routing_key: delivery.routing_key.to_string(),
        }
    }
}

/// What the runtime should do with a processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Terminal (success or duplicate): acknowledge.
    Ack,

    /// Another consumer owns this message: nack with requeue.
    Requeue,

    /// Transient failure: republish with an incremented retry count
    /// (or dead-letter once the retry budget is spent).
    Retry { reason: String },

    /// Permanent failure: dead-letter immediately.
    Dead { reason: String },
}

/// Per-queue message processor implemented by the domain.
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    /// Handle one delivery. Must not panic; if it does, the runtime
    /// converts the panic into a retryable failure.
    async fn process(&self, message: &IncomingMessage) -> Outcome;

    /// Processor name for logs.
    fn name(&self) -> &'static str;
}

/// Consumer tuning for one queue.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue to consume from.
    pub queue: String,

    /// Consumer tag prefix; a unique suffix is appended per instance.
    pub tag_prefix: String,

    /// Unacknowledged deliveries outstanding at once. Worker concurrency
    /// equals this number: each in-flight message progresses in its own
    /// task.
    pub prefetch: u16,

    /// Retry schedule for transient failures.
    pub retry: RetryPolicy,
}

impl ConsumerConfig {
    pub fn new(queue: impl Into<String>, tag_prefix: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            tag_prefix: tag_prefix.into(),
            prefetch: 10,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn from_broker_config(
        queue: impl Into<String>,
        tag_prefix: impl Into<String>,
        broker: &BrokerConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self::new(queue, tag_prefix)
            .with_prefetch(broker.prefetch)
            .with_retry(retry)
    }
}

/// Consumer runtime for one queue.
///
/// Sets the prefetch window, consumes with manual acks, and runs each
/// delivery in its own task bounded by a semaphore of `prefetch`
/// permits. On shutdown it stops consuming and drains in-flight
/// messages to a terminal state with a deadline.
pub struct QueueConsumer {
    channel: Channel,
    publisher: Arc<Publisher>,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub async fn new(connection: &Connection, config: ConsumerConfig) -> BrokerResult<Self> {
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let publisher = Arc::new(Publisher::new(connection).await?);

        Ok(Self {
            channel,
            publisher,
            config,
        })
    }

    /// Run the consume loop until shutdown is signalled.
    pub async fn run<P: MessageProcessor>(
        &self,
        processor: Arc<P>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BrokerResult<()> {
        let consumer_tag = format!("{}-{}", self.config.tag_prefix, Uuid::new_v4());

        let mut consumer = self
            .channel
            .basic_consume(
                &self.config.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %self.config.queue,
            consumer_tag = %consumer_tag,
            prefetch = self.config.prefetch,
            processor = processor.name(),
            "Consumer started"
        );

        let permits = Arc::new(Semaphore::new(self.config.prefetch as usize));

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means the host is going away too
                    if changed.is_err() || *shutdown.borrow() {
                        info!(queue = %self.config.queue, "Received shutdown signal, stopping consumer");
                        break;
                    }
                }
                delivery = consumer.next() => {
                    let delivery = match delivery {
                        Some(Ok(delivery)) => delivery,
                        Some(Err(e)) => {
                            error!(queue = %self.config.queue, error = %e, "Error receiving delivery");
                            continue;
                        }
                        None => {
                            return Err(BrokerError::ConsumerClosed(self.config.queue.clone()));
                        }
                    };

                    let permit = permits
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("semaphore closed");

                    let processor = Arc::clone(&processor);
                    let publisher = Arc::clone(&self.publisher);
                    let retry = self.config.retry.clone();
                    let queue = self.config.queue.clone();

                    tokio::spawn(async move {
                        handle_delivery(delivery, processor, publisher, retry, queue).await;
                        drop(permit);
                    });
                }
            }
        }

        self.drain(&permits).await;

        info!(queue = %self.config.queue, "Consumer stopped");
        Ok(())
    }

    /// Wait for in-flight deliveries to finish, bounded by the drain
    /// deadline so shutdown cannot hang on a wedged transport.
    async fn drain(&self, permits: &Arc<Semaphore>) {
        let all = self.config.prefetch as u32;

        match tokio::time::timeout(DRAIN_TIMEOUT, permits.acquire_many(all)).await {
            Ok(Ok(_)) => debug!(queue = %self.config.queue, "All in-flight messages drained"),
            Ok(Err(_)) => {}
            Err(_) => warn!(
                queue = %self.config.queue,
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "Drain deadline elapsed with messages still in flight"
            ),
        }
    }
}

/// Drive one delivery through the processor and settle it.
async fn handle_delivery<P: MessageProcessor>(
    delivery: Delivery,
    processor: Arc<P>,
    publisher: Arc<Publisher>,
    retry: RetryPolicy,
    queue: String,
) {
    let message = IncomingMessage::from_delivery(&delivery);

    debug!(
        queue = %queue,
        retry_count = message.retry_count,
        "Processing delivery"
    );

    // A panicking handler must not poison the prefetch slot: catch it
    // and settle the message as a retryable failure.
    let outcome = match std::panic::AssertUnwindSafe(processor.process(&message))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(queue = %queue, "Message handler panicked");
            Outcome::Retry {
                reason: "message handler panicked".to_string(),
            }
        }
    };

    match outcome {
        Outcome::Ack => {
            ack(&delivery, &queue).await;
        }
        Outcome::Requeue => {
            debug!(queue = %queue, "Requeueing delivery (owned elsewhere)");
            if let Err(e) = delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
            {
                error!(queue = %queue, error = %e, "Failed to nack delivery");
            }
        }
        Outcome::Retry { reason } => {
            if retry.should_retry(message.retry_count) {
                let attempt = message.retry_count + 1;
                let delay = retry.delay_for_attempt(message.retry_count);

                info!(
                    queue = %queue,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Scheduling retry with backoff"
                );

                tokio::time::sleep(delay).await;

                match republish(&publisher, &queue, &message, attempt).await {
                    Ok(()) => ack(&delivery, &queue).await,
                    Err(e) => {
                        // Couldn't hand the message back; let the broker
                        // redeliver the original instead of losing it.
                        error!(queue = %queue, error = %e, "Failed to republish for retry");
                        let _ = delivery
                            .nack(BasicNackOptions {
                                requeue: true,
                                ..Default::default()
                            })
                            .await;
                    }
                }
            } else {
                warn!(
                    queue = %queue,
                    retry_count = message.retry_count,
                    reason = %reason,
                    "Retry budget exhausted, dead-lettering"
                );
                dead_letter(&publisher, &delivery, &message, &reason, &queue).await;
            }
        }
        Outcome::Dead { reason } => {
            dead_letter(&publisher, &delivery, &message, &reason, &queue).await;
        }
    }
}

async fn republish(
    publisher: &Publisher,
    queue: &str,
    message: &IncomingMessage,
    attempt: u32,
) -> BrokerResult<()> {
    let body: serde_json::Value = serde_json::from_slice(&message.payload)?;
    publisher
        .publish_with_retry_count(queue, &body, Some(attempt))
        .await
}

async fn dead_letter(
    publisher: &Publisher,
    delivery: &Delivery,
    message: &IncomingMessage,
    reason: &str,
    queue: &str,
) {
    let original = serde_json::from_slice(&message.payload).unwrap_or_else(|_| {
        serde_json::json!({
            "unparseable_payload": String::from_utf8_lossy(&message.payload),
        })
    });

    let envelope = DeadLetter::new(original, reason);

    if let Err(e) = publisher.publish_dead_letter(&envelope).await {
        error!(queue = %queue, error = %e, "Failed to publish dead letter");
        // Without a DLQ record the message must survive: requeue it.
        let _ = delivery
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await;
        return;
    }

    ack(delivery, queue).await;
}

async fn ack(delivery: &Delivery, queue: &str) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!(queue = %queue, error = %e, "Failed to ack delivery");
    }
}
