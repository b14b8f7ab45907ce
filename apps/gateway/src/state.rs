//! Shared application state passed to request handlers.

use axum_helpers::RateLimiter;
use database::postgres::DatabaseConnection;
use database::redis::ConnectionManager;
use domain_auth::{AuthService, TokenValidator};
use domain_notifications::DispatchService;
use domain_users::PostgresUserRepository;
use resilience::CircuitBreaker;
use std::sync::Arc;

/// Cloned into every handler; all members are cheap Arc-backed handles.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService<PostgresUserRepository>,
    pub dispatch: DispatchService<PostgresUserRepository>,
    pub validator: TokenValidator,
    pub rate_limiter: RateLimiter,
    pub breaker: CircuitBreaker,
    pub db: DatabaseConnection,
    pub redis: ConnectionManager,
    pub broker: Arc<lapin::Connection>,
}
