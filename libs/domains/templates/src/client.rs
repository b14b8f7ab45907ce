use crate::error::{TemplateError, TemplateResult};
use crate::models::Template;
use crate::resolver::{template_key, TEMPLATE_CACHE_TTL};
use cache::CacheClient;
use core_config::{env_or_default, ConfigError, FromEnv};
use resilience::CircuitBreaker;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Breaker resource guarding the template service HTTP surface.
pub const TEMPLATE_SERVICE_RESOURCE: &str = "template-service";

/// Per-request deadline for template fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Template service endpoint configuration.
#[derive(Debug, Clone)]
pub struct TemplateClientConfig {
    pub base_url: String,
}

impl FromEnv for TemplateClientConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or_default("TEMPLATE_SERVICE_URL", "http://localhost:8081"),
        })
    }
}

/// Envelope the template service wraps its responses in.
#[derive(Deserialize)]
struct TemplateEnvelope {
    success: bool,
    data: Option<Template>,
    message: Option<String>,
}

/// HTTP template client used by the workers.
///
/// Shares the `template:{code}:{language}:{version|latest}` cache
/// contract with the in-service resolver, so a worker can ride out a
/// template-service outage on entries either side populated.
#[derive(Clone)]
pub struct TemplateClient {
    http: reqwest::Client,
    base_url: String,
    cache: CacheClient,
    breaker: CircuitBreaker,
}

impl TemplateClient {
    pub fn new(
        config: TemplateClientConfig,
        cache: CacheClient,
        breaker: CircuitBreaker,
    ) -> TemplateResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| TemplateError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache,
            breaker,
        })
    }

    /// Fetch `(code, language, version?)`, cache-through.
    pub async fn fetch(
        &self,
        code: &str,
        language: &str,
        version: Option<i32>,
    ) -> TemplateResult<Template> {
        let key = template_key(code, language, version);

        if let Ok(Some(cached)) = self.cache.get_json::<Template>(&key).await {
            debug!(code, language, "Template cache hit (worker)");
            return Ok(cached);
        }

        let allowed = self
            .breaker
            .allow(TEMPLATE_SERVICE_RESOURCE)
            .await
            .unwrap_or(true);
        if !allowed {
            warn!(code, language, "Template service circuit open, trying stale cache");
            return self.newest_cached(code, language).await;
        }

        match self.fetch_remote(code, language, version).await {
            Ok(template) => {
                let _ = self.breaker.record_success(TEMPLATE_SERVICE_RESOURCE).await;
                let _ = self
                    .cache
                    .set_json(&key, &template, Some(TEMPLATE_CACHE_TTL))
                    .await;
                Ok(template)
            }
            Err(TemplateError::NotFound { code, language }) => {
                // 404 is an answer from a healthy service
                let _ = self.breaker.record_success(TEMPLATE_SERVICE_RESOURCE).await;
                Err(TemplateError::NotFound { code, language })
            }
            Err(e) => {
                let _ = self.breaker.record_failure(TEMPLATE_SERVICE_RESOURCE).await;
                warn!(code, language, error = %e, "Template fetch failed");
                Err(e)
            }
        }
    }

    async fn fetch_remote(
        &self,
        code: &str,
        language: &str,
        version: Option<i32>,
    ) -> TemplateResult<Template> {
        let mut url = format!("{}/templates/{}?lang={}", self.base_url, code, language);
        if let Some(v) = version {
            url.push_str(&format!("&version={}", v));
        }

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TemplateError::Unavailable(format!("template service: {}", e)))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TemplateError::NotFound {
                code: code.to_string(),
                language: language.to_string(),
            });
        }

        if !status.is_success() {
            return Err(TemplateError::Unavailable(format!(
                "template service returned status {}",
                status
            )));
        }

        let envelope: TemplateEnvelope = response
            .json()
            .await
            .map_err(|e| TemplateError::Unavailable(format!("malformed template response: {}", e)))?;

        if !envelope.success {
            return Err(TemplateError::Unavailable(
                envelope
                    .message
                    .unwrap_or_else(|| "template service reported failure".to_string()),
            ));
        }

        envelope.data.ok_or_else(|| {
            TemplateError::Unavailable("template response carried no data".to_string())
        })
    }

    async fn newest_cached(&self, code: &str, language: &str) -> TemplateResult<Template> {
        let pattern = format!("template:{}:{}:*", code, language);
        let keys = self.cache.scan_match(&pattern).await.unwrap_or_default();

        let mut newest: Option<Template> = None;
        for key in keys {
            if let Ok(Some(template)) = self.cache.get_json::<Template>(&key).await {
                let is_newer = newest
                    .as_ref()
                    .map(|t| template.version > t.version)
                    .unwrap_or(true);
                if is_newer {
                    newest = Some(template);
                }
            }
        }

        newest.ok_or_else(|| {
            TemplateError::Unavailable(format!(
                "template service unavailable and no cached version of '{}' ({})",
                code, language
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default_url() {
        temp_env::with_var_unset("TEMPLATE_SERVICE_URL", || {
            let config = TemplateClientConfig::from_env().unwrap();
            assert_eq!(config.base_url, "http://localhost:8081");
        });
    }

    #[test]
    fn test_client_config_from_env() {
        temp_env::with_var("TEMPLATE_SERVICE_URL", Some("http://templates:9000"), || {
            let config = TemplateClientConfig::from_env().unwrap();
            assert_eq!(config.base_url, "http://templates:9000");
        });
    }
}
