//! Dependency health types and the composite roll-up.
//!
//! Each service builds its own probe set; this module holds the shared
//! shapes and the rule that folds per-dependency results into one
//! overall status: any `down` dependency makes the service down, any
//! `degraded` one makes it degraded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

/// Health of one dependency or of the service as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

/// Per-dependency probe result.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            circuit_breaker: None,
            error: None,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            latency_ms: None,
            circuit_breaker: None,
            error: Some(reason.into()),
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Down,
            latency_ms: None,
            circuit_breaker: None,
            error: Some(error.into()),
        }
    }

    pub fn with_circuit_breaker(mut self, state: impl Into<String>) -> Self {
        self.circuit_breaker = Some(state.into());
        self
    }
}

/// Composite health report: per-dependency detail plus the roll-up.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub services: HashMap<String, DependencyHealth>,
}

impl HealthReport {
    pub fn from_checks(services: HashMap<String, DependencyHealth>) -> Self {
        let status = roll_up(&services);
        Self {
            status,
            timestamp: Utc::now(),
            services,
        }
    }

    /// Whether the HTTP response should be 200 (healthy/degraded) or 503.
    pub fn is_serving(&self) -> bool {
        self.status != HealthStatus::Down
    }
}

fn roll_up(services: &HashMap<String, DependencyHealth>) -> HealthStatus {
    if services.values().any(|s| s.status == HealthStatus::Down) {
        HealthStatus::Down
    } else if services.values().any(|s| s.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// A named async probe producing a `DependencyHealth`.
pub type HealthProbe<'a> = Pin<Box<dyn Future<Output = DependencyHealth> + Send + 'a>>;

/// Run all probes concurrently and fold them into a report.
pub async fn run_probes(probes: Vec<(&str, HealthProbe<'_>)>) -> HealthReport {
    let names: Vec<_> = probes.iter().map(|(name, _)| name.to_string()).collect();
    let futures: Vec<_> = probes.into_iter().map(|(_, probe)| probe).collect();
    let results = futures::future::join_all(futures).await;

    let services = names.into_iter().zip(results).collect();
    HealthReport::from_checks(services)
}

/// Measure a probe's latency, mapping success/failure to health.
pub async fn timed_probe<F, E>(probe: F) -> DependencyHealth
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    match probe.await {
        Ok(()) => DependencyHealth::healthy(start.elapsed().as_millis() as u64),
        Err(e) => DependencyHealth::down(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(statuses: &[(&str, HealthStatus)]) -> HealthReport {
        let services = statuses
            .iter()
            .map(|(name, status)| {
                let health = match status {
                    HealthStatus::Healthy => DependencyHealth::healthy(1),
                    HealthStatus::Degraded => DependencyHealth::degraded("slow"),
                    HealthStatus::Down => DependencyHealth::down("dead"),
                };
                (name.to_string(), health)
            })
            .collect();
        HealthReport::from_checks(services)
    }

    #[test]
    fn test_roll_up_all_healthy() {
        let report = report_with(&[
            ("database", HealthStatus::Healthy),
            ("cache", HealthStatus::Healthy),
        ]);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.is_serving());
    }

    #[test]
    fn test_roll_up_degraded_wins_over_healthy() {
        let report = report_with(&[
            ("database", HealthStatus::Healthy),
            ("smtp", HealthStatus::Degraded),
        ]);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.is_serving());
    }

    #[test]
    fn test_roll_up_down_wins_over_everything() {
        let report = report_with(&[
            ("database", HealthStatus::Down),
            ("smtp", HealthStatus::Degraded),
            ("cache", HealthStatus::Healthy),
        ]);
        assert_eq!(report.status, HealthStatus::Down);
        assert!(!report.is_serving());
    }

    #[tokio::test]
    async fn test_timed_probe() {
        let ok = timed_probe(async { Ok::<(), String>(()) }).await;
        assert_eq!(ok.status, HealthStatus::Healthy);
        assert!(ok.latency_ms.is_some());

        let bad = timed_probe(async { Err::<(), String>("boom".into()) }).await;
        assert_eq!(bad.status, HealthStatus::Down);
        assert_eq!(bad.error.as_deref(), Some("boom"));
    }
}
