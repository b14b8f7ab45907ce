use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::topology::{self, DLQ_ROUTING_KEY, DLX_EXCHANGE, NOTIFICATIONS_EXCHANGE};
use chrono::{DateTime, SecondsFormat, Utc};
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Header carrying the delivery attempt count across republishes.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Connect to the broker and declare the topology.
pub async fn connect(config: &BrokerConfig) -> BrokerResult<Connection> {
    info!("Connecting to RabbitMQ");

    let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;

    let channel = connection.create_channel().await?;
    topology::declare_topology(&channel).await?;
    channel.close(200, "topology declared").await?;

    info!("RabbitMQ connection established");
    Ok(connection)
}

/// Dead-letter envelope wrapping a message that exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub original_message: serde_json::Value,
    pub failure_reason: String,
    pub failed_at: String,
}

impl DeadLetter {
    pub fn new(original_message: serde_json::Value, failure_reason: impl Into<String>) -> Self {
        Self {
            original_message,
            failure_reason: failure_reason.into(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Event emitted when the template catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateUpdated {
    pub code: String,
    pub version: i32,
    pub timestamp: DateTime<Utc>,
}

/// Publisher over a confirming channel.
///
/// Every publish is persistent (delivery mode 2) and awaits the broker's
/// publisher confirm, so a returned `Ok` means the broker owns the
/// message.
pub struct Publisher {
    channel: Channel,
}

impl Publisher {
    /// Create a publisher with its own confirming channel.
    pub async fn new(connection: &Connection) -> BrokerResult<Self> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok(Self { channel })
    }

    /// Publish `message` to the notifications exchange under `routing_key`.
    pub async fn publish_json<T: Serialize>(
        &self,
        routing_key: &str,
        message: &T,
    ) -> BrokerResult<()> {
        self.publish_with_retry_count(routing_key, message, None)
            .await
    }

    /// Publish with an explicit `x-retry-count` header. Used by the
    /// consumer runtime to hand a message back for another attempt
    /// without mutating the original in place.
    pub async fn publish_with_retry_count<T: Serialize>(
        &self,
        routing_key: &str,
        message: &T,
        retry_count: Option<u32>,
    ) -> BrokerResult<()> {
        let payload = serde_json::to_vec(message)?;

        let mut properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into());

        if let Some(count) = retry_count {
            let mut headers = FieldTable::default();
            headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongInt(count as i32));
            properties = properties.with_headers(headers);
        }

        self.confirm_publish(NOTIFICATIONS_EXCHANGE, routing_key, &payload, properties)
            .await?;

        debug!(
            routing_key,
            bytes = payload.len(),
            retry_count = retry_count.unwrap_or(0),
            "Published message"
        );
        counter!("notifications_published").increment(1);

        Ok(())
    }

    /// Publish a dead-letter envelope for a terminally failed message.
    pub async fn publish_dead_letter(&self, dead_letter: &DeadLetter) -> BrokerResult<()> {
        let payload = serde_json::to_vec(dead_letter)?;

        self.confirm_publish(
            DLX_EXCHANGE,
            DLQ_ROUTING_KEY,
            &payload,
            BasicProperties::default()
                .with_delivery_mode(2)
                .with_content_type("application/json".into()),
        )
        .await?;

        warn!(
            reason = %dead_letter.failure_reason,
            "Published message to dead-letter queue"
        );
        counter!("dlq_published").increment(1);

        Ok(())
    }

    /// Publish a `template.updated` catalog event.
    pub async fn publish_template_updated(&self, event: &TemplateUpdated) -> BrokerResult<()> {
        self.publish_json(topology::TEMPLATE_UPDATED_ROUTING_KEY, event)
            .await
    }

    async fn confirm_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> BrokerResult<()> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;

        if let Confirmation::Nack(_) = confirm {
            return Err(BrokerError::PublishNotConfirmed(routing_key.to_string()));
        }

        Ok(())
    }
}
