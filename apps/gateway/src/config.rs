use axum_helpers::RateLimitConfig;
use core_config::{server::ServerConfig, Environment, FromEnv};
use database::postgres::PostgresConfig;
use database::redis::RedisConfig;
use domain_auth::JwtConfig;
use domain_notifications::idempotency::IdempotencyTtl;
use messaging::BrokerConfig;
use resilience::BreakerConfig;

/// Gateway configuration, composed from the shared config components.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub redis: RedisConfig,
    pub broker: BrokerConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub breaker: BreakerConfig,
    pub idempotency_ttl: IdempotencyTtl,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?;
        let database = PostgresConfig::from_env()?;
        let redis = RedisConfig::from_env()?;
        let broker = BrokerConfig::from_env()?;
        let jwt = JwtConfig::from_env()?;
        let rate_limit = RateLimitConfig::from_env()?;
        let breaker = BreakerConfig::from_env()?;
        let idempotency_ttl = IdempotencyTtl::from_env()?;

        Ok(Self {
            environment,
            server,
            database,
            redis,
            broker,
            jwt,
            rate_limit,
            breaker,
            idempotency_ttl,
        })
    }
}
