//! Broker plumbing for the notification pipeline.
//!
//! This crate owns everything AMQP: the durable topology (exchange,
//! typed queues, dead-letter wiring), a confirming publisher, and the
//! consumer runtime that services drive with a [`MessageProcessor`].
//!
//! ## Topology
//!
//! ```text
//!                      ┌──────────────────────┐
//!  publish ──────────> │ notifications.direct │
//!                      └──────────┬───────────┘
//!                email.queue      │      push.queue
//!                      ┌──────────┴───────────┐
//!                      v                      v
//!               ┌────────────┐         ┌────────────┐
//!               │email.queue │         │ push.queue │
//!               └─────┬──────┘         └─────┬──────┘
//!                     │  dead-letter (failed)│
//!                     v                      v
//!                      ┌──────────────────┐
//!                      │   dlx.exchange   │──> failed.queue
//!                      └──────────────────┘
//! ```
//!
//! ## Acknowledgement contract
//!
//! Consumers use manual acks with a bounded prefetch. A processor's
//! [`Outcome`] drives the runtime: `Ack` acknowledges, `Requeue` nacks
//! with requeue (another consumer owns the message), `Retry` republishes
//! with an incremented `x-retry-count` header after a jittered backoff,
//! and `Dead` publishes a dead-letter envelope then acknowledges the
//! original.

mod config;
mod consumer;
mod error;
mod publisher;
mod retry;
pub mod topology;

pub use config::BrokerConfig;
pub use consumer::{ConsumerConfig, IncomingMessage, MessageProcessor, Outcome, QueueConsumer};
pub use error::{BrokerError, BrokerResult};
pub use publisher::{connect, DeadLetter, Publisher, TemplateUpdated};
pub use retry::RetryPolicy;
