//! Typed cache client over Redis.
//!
//! Every service-side cache access goes through [`CacheClient`]: a thin,
//! typed wrapper around `redis::aio::ConnectionManager` that
//!
//! - attaches TTLs atomically (`SET ... EX`, never SET-then-EXPIRE),
//! - exposes `SET NX EX` as the set-if-absent reservation primitive,
//! - scans with cursor-based SCAN (never KEYS),
//! - bounds every operation with a deadline so a wedged cache cannot
//!   stall request handling.
//!
//! Failures surface as [`CacheError`] and never panic across the call
//! boundary; callers that can tolerate cache loss treat errors as a miss.

mod client;
mod error;

pub use client::CacheClient;
pub use error::{CacheError, CacheResult};
