use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_helpers::health::{run_probes, timed_probe, DependencyHealth, HealthProbe};
use resilience::CircuitState;
use serde_json::json;

/// Breaker resources this service reports on.
const BREAKER_RESOURCES: &[&str] = &["database", "template-service", "smtp", "fcm"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/health/services", get(services))
        .with_state(state)
}

/// Liveness: answers 200 whenever the process serves requests.
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

/// Composite dependency probe.
///
/// Probes use raw clients so a probe can never trip the breaker it
/// reports on; breaker states ride along as `circuit_breaker` fields.
async fn services(State(state): State<AppState>) -> Response {
    let db = &state.db;
    let redis = state.redis.clone();
    let broker = state.broker.clone();

    let mut probes: Vec<(&str, HealthProbe<'_>)> = vec![
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
    ];

    for &resource in BREAKER_RESOURCES {
        let breaker = state.breaker.clone();
        probes.push((
            resource,
            Box::pin(async move {
                match breaker.status(resource).await {
                    Ok(status) => match status.state {
                        CircuitState::Closed => {
                            DependencyHealth::healthy(0).with_circuit_breaker("closed")
                        }
                        CircuitState::HalfOpen => DependencyHealth::degraded(
                            "circuit breaker probing recovery",
                        )
                        .with_circuit_breaker("half_open"),
                        CircuitState::Open => {
                            DependencyHealth::degraded("circuit breaker open")
                                .with_circuit_breaker("open")
                        }
                    },
                    Err(e) => DependencyHealth::down(format!("breaker state unreadable: {}", e)),
                }
            }),
        ));
    }

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
