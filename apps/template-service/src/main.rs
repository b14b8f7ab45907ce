use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_helpers::health::{run_probes, timed_probe, DependencyHealth, HealthProbe};
use axum_helpers::shutdown_signal;
use cache::CacheClient;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_templates::handlers::TemplatesState;
use domain_templates::{PostgresTemplateRepository, TemplateCatalog, TemplateResolver};
use messaging::Publisher;
use resilience::{CircuitBreaker, CircuitState};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

mod config;

use config::Config;

/// Dependencies the health endpoint reports on.
#[derive(Clone)]
struct HealthState {
    db: database::postgres::DatabaseConnection,
    redis: database::redis::ConnectionManager,
    broker: Arc<lapin::Connection>,
    breaker: CircuitBreaker,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
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

    let repo = Arc::new(PostgresTemplateRepository::new(db.clone()));
    let resolver = TemplateResolver::new(Arc::clone(&repo), cache.clone(), breaker.clone());
    let catalog = TemplateCatalog::new(repo, cache.clone(), publisher);

    let templates_router =
        domain_templates::handlers::router(TemplatesState { resolver, catalog });

    let health_state = HealthState {
        db: db.clone(),
        redis,
        broker,
        breaker,
    };

    let router = Router::new()
        .merge(templates_router)
        .route("/health", get(liveness))
        .route("/health/services", get(services).with_state(health_state))
        .layer(TraceLayer::new_for_http())
        .layer(tower_http::catch_panic::CatchPanicLayer::new());

    let addr = config.server.address();
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Template service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down: closing connections");
    let _ = db.close().await;

    info!("Template service shutdown complete");
    Ok(())
}

async fn liveness() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}

async fn services(State(state): State<HealthState>) -> Response {
    let db = &state.db;
    let redis = state.redis.clone();
    let broker = state.broker.clone();
    let breaker = state.breaker.clone();

    let probes: Vec<(&str, HealthProbe<'_>)> = vec![
        (
            "database",
            Box::pin(async move {
                timed_probe(async { database::postgres::check_health(db).await }).await
            }),
        ),
        (
            "cache",
            Box::pin(async move {
                timed_probe(async { database::redis::check_health(&redis).await }).await
            }),
        ),
        (
            "broker",
            Box::pin(async move {
                if broker.status().connected() {
                    DependencyHealth::healthy(0)
                } else {
                    DependencyHealth::down("broker connection lost")
                }
            }),
        ),
        (
            "database-breaker",
            Box::pin(async move {
                match breaker.status("database").await {
                    Ok(status) => match status.state {
                        CircuitState::Closed => {
                            DependencyHealth::healthy(0).with_circuit_breaker("closed")
                        }
                        CircuitState::HalfOpen => {
                            DependencyHealth::degraded("circuit breaker probing recovery")
                                .with_circuit_breaker("half_open")
                        }
                        CircuitState::Open => DependencyHealth::degraded("circuit breaker open")
                            .with_circuit_breaker("open"),
                    },
                    Err(e) => DependencyHealth::down(format!("breaker state unreadable: {}", e)),
                }
            }),
        ),
    ];

    let report = run_probes(probes).await;

    let (status, message) = if report.is_serving() {
        (StatusCode::OK, "Service operational")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
    };

    (
        status,
        Json(axum_helpers::ApiResponse::success(report, message)),
    )
        .into_response()
}
