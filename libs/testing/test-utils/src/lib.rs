//! Shared test infrastructure for the workspace.
//!
//! Container-backed harnesses with automatic cleanup:
//! - [`TestRedis`]: Redis container for cache/breaker/idempotency tests
//! - [`TestPostgres`]: PostgreSQL container for repository tests
//! - [`TestRabbitMq`]: RabbitMQ container for broker round-trip tests
//!
//! Containers stop when the harness value drops. Tests that use them
//! are `#[ignore]`d so the default suite stays Docker-free; run with
//! `cargo test -- --ignored` where Docker is available.

mod postgres;
mod rabbitmq;
mod redis;

pub use postgres::TestPostgres;
pub use rabbitmq::TestRabbitMq;
pub use redis::TestRedis;
