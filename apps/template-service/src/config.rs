use core_config::{server::ServerConfig, Environment, FromEnv};
use database::postgres::PostgresConfig;
use database::redis::RedisConfig;
use messaging::BrokerConfig;
use resilience::BreakerConfig;

/// Template service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub redis: RedisConfig,
    pub broker: BrokerConfig,
    pub breaker: BreakerConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            database: PostgresConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            breaker: BreakerConfig::from_env()?,
        })
    }
}
