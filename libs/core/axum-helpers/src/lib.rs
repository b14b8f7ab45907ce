//! # Axum Helpers
//!
//! Shared utilities for the platform's Axum services.
//!
//! - **[`errors`]**: the `AppError` kind set and its HTTP mapping
//! - **[`response`]**: the `{success, data, message, meta}` envelope
//! - **[`extractors`]**: `ValidatedJson` (validator-integrated body extraction)
//! - **[`health`]**: dependency health types and the composite roll-up
//! - **[`shutdown`]**: graceful shutdown coordination
//! - **[`rate_limit`]**: per-client request throttling backed by the cache

pub mod errors;
pub mod extractors;
pub mod health;
pub mod rate_limit;
pub mod response;
pub mod shutdown;

pub use errors::{AppError, AppResult};
pub use extractors::ValidatedJson;
pub use health::{DependencyHealth, HealthReport, HealthStatus};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use response::{ApiResponse, PaginationMeta};
pub use shutdown::{shutdown_signal, ShutdownCoordinator};
