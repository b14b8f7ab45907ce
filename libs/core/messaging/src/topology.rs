//! Broker topology: exchange, queues, and dead-letter wiring.
//!
//! Both publishers and consumers declare the topology at startup;
//! declarations are idempotent, so whoever connects first creates it.

use crate::error::BrokerResult;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    Channel, ExchangeKind,
};
use tracing::info;

/// Direct exchange every notification and event goes through.
pub const NOTIFICATIONS_EXCHANGE: &str = "notifications.direct";

/// Dead-letter exchange fed by the typed queues and by worker rejections.
pub const DLX_EXCHANGE: &str = "dlx.exchange";

/// Queue for email notifications.
pub const EMAIL_QUEUE: &str = "email.queue";

/// Queue for push notifications.
pub const PUSH_QUEUE: &str = "push.queue";

/// Terminal queue for messages that exhausted their retries.
pub const FAILED_QUEUE: &str = "failed.queue";

/// Routing key into the dead-letter exchange.
pub const DLQ_ROUTING_KEY: &str = "failed";

/// Routing key for template catalog change events.
pub const TEMPLATE_UPDATED_ROUTING_KEY: &str = "template.updated";

/// Per-message TTL on the typed queues (1 hour).
pub const MESSAGE_TTL_MS: u32 = 3_600_000;

/// Declare the full topology on `channel`.
pub async fn declare_topology(channel: &Channel) -> BrokerResult<()> {
    channel
        .exchange_declare(
            NOTIFICATIONS_EXCHANGE,
            ExchangeKind::Direct,
            durable_exchange(),
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            DLX_EXCHANGE,
            ExchangeKind::Direct,
            durable_exchange(),
            FieldTable::default(),
        )
        .await?;

    for queue in [EMAIL_QUEUE, PUSH_QUEUE] {
        channel
            .queue_declare(queue, durable_queue(), notification_queue_args())
            .await?;

        channel
            .queue_bind(
                queue,
                NOTIFICATIONS_EXCHANGE,
                queue,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    channel
        .queue_declare(FAILED_QUEUE, durable_queue(), FieldTable::default())
        .await?;

    channel
        .queue_bind(
            FAILED_QUEUE,
            DLX_EXCHANGE,
            DLQ_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!("Broker topology declared");
    Ok(())
}

/// Route a notification type to its queue name, if known.
pub fn queue_for_notification_type(notification_type: &str) -> Option<&'static str> {
    match notification_type {
        "email" => Some(EMAIL_QUEUE),
        "push" => Some(PUSH_QUEUE),
        _ => None,
    }
}

fn durable_exchange() -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

fn notification_queue_args() -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(DLQ_ROUTING_KEY.into()),
    );
    args.insert(
        "x-message-ttl".into(),
        AMQPValue::LongInt(MESSAGE_TTL_MS as i32),
    );
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_routing() {
        assert_eq!(queue_for_notification_type("email"), Some(EMAIL_QUEUE));
        assert_eq!(queue_for_notification_type("push"), Some(PUSH_QUEUE));
        assert_eq!(queue_for_notification_type("sms"), None);
        assert_eq!(queue_for_notification_type(""), None);
    }

    #[test]
    fn test_queue_args_carry_dead_letter_wiring() {
        let args = notification_queue_args();
        let inner = args.inner();

        let get = |name: &str| {
            inner
                .iter()
                .find(|(key, _)| key.as_str() == name)
                .map(|(_, value)| value)
        };

        assert_eq!(
            get("x-dead-letter-exchange"),
            Some(&AMQPValue::LongString("dlx.exchange".into()))
        );
        assert_eq!(
            get("x-dead-letter-routing-key"),
            Some(&AMQPValue::LongString("failed".into()))
        );
        assert_eq!(get("x-message-ttl"), Some(&AMQPValue::LongInt(3_600_000)));
    }
}
