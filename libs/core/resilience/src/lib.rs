//! Shared circuit breaker.
//!
//! Protects each named external resource (database, template-service,
//! smtp, fcm) from cascading failure while allowing coordinated recovery.
//! Breaker state lives in Redis so every replica observes the same
//! breaker: when one worker trips the `smtp` circuit, all of them stop
//! hammering the relay.
//!
//! ## States
//!
//! ```text
//! ┌─────────┐  failures >= threshold  ┌────────┐
//! │ CLOSED  │ ──────────────────────> │  OPEN  │
//! └─────────┘                         └────────┘
//!      ^                                   │
//!      │                                   │ timeout elapsed
//!      │                                   v
//!      │   successes >= threshold  ┌─────────────┐
//!      └────────────────────────── │ HALF-OPEN   │
//!                                  └─────────────┘
//!                                        │
//!                         any failure    │ (back to OPEN)
//!                         ───────────────┘
//! ```
//!
//! `allow()` returning `false` is not an error: it is the caller's duty
//! to substitute a fallback (cached value, DLQ, or 503). Races between
//! replicas are tolerated because conflicting updates settle to the
//! more-open state until the timeout elapses.

mod breaker;
mod config;

pub use breaker::{BreakerStatus, CircuitBreaker, CircuitState};
pub use config::BreakerConfig;
