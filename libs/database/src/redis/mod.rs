//! Redis connector and utilities.
//!
//! Provides a `ConnectionManager`-based connector with retry and a health
//! probe that round-trips a value through the server.

mod config;
mod connector;
mod health;

pub use config::RedisConfig;
pub use connector::{
    connect, connect_from_config, connect_from_config_with_retry, connect_with_retry,
};
pub use health::check_health;

// Re-export redis types for convenience
pub use redis::aio::ConnectionManager;
