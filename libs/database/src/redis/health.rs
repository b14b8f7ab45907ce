use redis::aio::ConnectionManager;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::common::DatabaseError;

/// Unique-enough key for a health probe round-trip; avoids clashing with
/// probes from other replicas.
fn probe_key() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("health:probe:{}:{}", std::process::id(), nanos)
}

/// Check Redis health by round-tripping a value.
///
/// Writes a short-lived key, reads it back, and compares. This catches
/// write failures (read-only replicas, OOM) that a bare PING would miss.
pub async fn check_health(manager: &ConnectionManager) -> Result<(), DatabaseError> {
    debug!("Running Redis health check");

    let mut conn = manager.clone();
    let key = probe_key();

    let _: () = redis::cmd("SET")
        .arg(&key)
        .arg("ok")
        .arg("EX")
        .arg(10)
        .query_async(&mut conn)
        .await
        .map_err(|e| DatabaseError::HealthCheckFailed(format!("Redis SET failed: {}", e)))?;

    let value: Option<String> = redis::cmd("GET")
        .arg(&key)
        .query_async(&mut conn)
        .await
        .map_err(|e| DatabaseError::HealthCheckFailed(format!("Redis GET failed: {}", e)))?;

    let _: () = redis::cmd("DEL")
        .arg(&key)
        .query_async(&mut conn)
        .await
        .unwrap_or(());

    if value.as_deref() == Some("ok") {
        debug!("Redis health check passed");
        Ok(())
    } else {
        Err(DatabaseError::HealthCheckFailed(
            "Redis round-trip returned unexpected value".to_string(),
        ))
    }
}
