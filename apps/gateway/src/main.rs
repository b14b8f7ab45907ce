use axum_helpers::{shutdown_signal, RateLimiter};
use cache::CacheClient;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_auth::{AuthService, TokenValidator};
use domain_notifications::idempotency::IdempotencyStore;
use domain_notifications::{DispatchService, StatusStore};
use domain_users::{PostgresUserRepository, UserService};
use messaging::Publisher;
use resilience::CircuitBreaker;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    // Connect the stores concurrently; both retry with backoff so the
    // gateway survives compose-style startup ordering
    let postgres_future = async {
        database::postgres::connect_from_config_with_retry(config.database.clone(), None)
            .await
            .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))
    };

    let redis_future = async {
        database::redis::connect_from_config_with_retry(config.redis.clone(), None)
            .await
            .map_err(|e| eyre::eyre!("Redis connection failed: {}", e))
    };

    let (db, redis) = tokio::try_join!(postgres_future, redis_future)?;

    database::postgres::run_migrations::<migration::Migrator>(&db).await?;

    let broker = Arc::new(
        messaging::connect(&config.broker)
            .await
            .map_err(|e| eyre::eyre!("RabbitMQ connection failed: {}", e))?,
    );
    let publisher = Arc::new(
        Publisher::new(&broker)
            .await
            .map_err(|e| eyre::eyre!("Failed to open publisher channel: {}", e))?,
    );

    let cache = CacheClient::new(redis.clone());
    let breaker = CircuitBreaker::new(cache.clone(), config.breaker.clone());

    let users = UserService::new(PostgresUserRepository::new(db.clone()), cache.clone());
    let validator = TokenValidator::new(cache.clone(), config.jwt.clone());
    let auth = AuthService::new(users.clone(), validator.clone());

    let idempotency = IdempotencyStore::new(cache.clone(), config.idempotency_ttl);
    let status = StatusStore::new(cache.clone());
    let dispatch = DispatchService::new(users, idempotency, status, publisher);

    let rate_limiter = RateLimiter::new(cache.clone(), config.rate_limit.clone());

    let app_state = AppState {
        auth,
        dispatch,
        validator,
        rate_limiter,
        breaker,
        db,
        redis,
        broker,
    };

    let router = api::router(app_state.clone());

    let addr = config.server.address();
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down: closing connections");
    let _ = app_state.db.close().await;

    info!("Gateway shutdown complete");
    Ok(())
}
