use thiserror::Error;

/// Errors from broker operations.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// AMQP connection, channel, or protocol error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker negatively acknowledged a publish.
    #[error("Publish was not confirmed for routing key '{0}'")]
    PublishNotConfirmed(String),

    /// Consumer stream ended unexpectedly.
    #[error("Consumer stream closed: {0}")]
    ConsumerClosed(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
