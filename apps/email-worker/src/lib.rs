//! Email worker wiring: one consumer on `email.queue`, rendering
//! through the template service and delivering over SMTP.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use axum_helpers::ShutdownCoordinator;
use cache::CacheClient;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{server::ServerConfig, Environment, FromEnv};
use database::postgres::PostgresConfig;
use database::redis::RedisConfig;
use domain_notifications::idempotency::{IdempotencyStore, IdempotencyTtl};
use domain_notifications::{
    NotificationProcessor, PostgresAuditLogRepository, SmtpConfig, SmtpTransport, StatusStore,
};
use domain_templates::{TemplateClient, TemplateClientConfig};
use messaging::{topology, BrokerConfig, ConsumerConfig, QueueConsumer, RetryPolicy};
use resilience::{BreakerConfig, CircuitBreaker};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Worker configuration.
#[derive(Clone, Debug)]
struct Config {
    environment: Environment,
    server: ServerConfig,
    database: PostgresConfig,
    redis: RedisConfig,
    broker: BrokerConfig,
    breaker: BreakerConfig,
    retry: RetryPolicy,
    idempotency_ttl: IdempotencyTtl,
    template_client: TemplateClientConfig,
    smtp: SmtpConfig,
}

impl Config {
    fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            database: PostgresConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            breaker: BreakerConfig::from_env()?,
            retry: RetryPolicy::from_env()?,
            idempotency_ttl: IdempotencyTtl::from_env()?,
            template_client: TemplateClientConfig::from_env()?,
            smtp: SmtpConfig::from_env()?,
        })
    }
}

/// Run the email worker until SIGTERM/SIGINT.
pub async fn run() -> eyre::Result<()> {
    install_color_eyre();
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

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

    let broker = messaging::connect(&config.broker)
        .await
        .map_err(|e| eyre::eyre!("RabbitMQ connection failed: {}", e))?;

    let cache = CacheClient::new(redis);
    let breaker = CircuitBreaker::new(cache.clone(), config.breaker.clone());

    let templates = TemplateClient::new(
        config.template_client.clone(),
        cache.clone(),
        breaker.clone(),
    )
    .map_err(|e| eyre::eyre!("Template client setup failed: {}", e))?;

    let transport = Arc::new(
        SmtpTransport::new(config.smtp.clone())
            .map_err(|e| eyre::eyre!("SMTP transport setup failed: {}", e))?,
    );

    let processor = NotificationProcessor::new(
        IdempotencyStore::new(cache.clone(), config.idempotency_ttl),
        StatusStore::new(cache.clone()),
        Arc::new(templates),
        transport,
        breaker,
        Arc::new(PostgresAuditLogRepository::new(db.clone())),
        config.retry.max_retries,
    );

    let consumer = QueueConsumer::new(
        &broker,
        ConsumerConfig::from_broker_config(
            topology::EMAIL_QUEUE,
            "email-worker",
            &config.broker,
            config.retry.clone(),
        ),
    )
    .await
    .map_err(|e| eyre::eyre!("Consumer setup failed: {}", e))?;

    let (shutdown, shutdown_rx) = ShutdownCoordinator::new();

    // Liveness endpoint for orchestration probes
    let listener = TcpListener::bind(config.server.address()).await?;
    info!(address = %config.server.address(), "Email worker liveness endpoint up");
    tokio::spawn(async move {
        let router = Router::new().route("/health", get(liveness));
        let _ = axum::serve(listener, router).await;
    });

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.wait_for_signal().await;
        });
    }

    info!("Email worker starting");
    consumer
        .run(Arc::new(processor), shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("Consumer failed: {}", e))?;

    info!("Shutting down: closing connections");
    let _ = db.close().await;
    let _ = broker.close(200, "worker shutdown").await;

    info!("Email worker shutdown complete");
    Ok(())
}

async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
