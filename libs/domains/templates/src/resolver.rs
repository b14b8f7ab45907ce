use crate::error::{TemplateError, TemplateResult};
use crate::models::Template;
use crate::repository::TemplateRepository;
use cache::CacheClient;
use resilience::CircuitBreaker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Breaker resource guarding the template store.
pub const DATABASE_RESOURCE: &str = "database";

/// TTL for cached template entries.
pub const TEMPLATE_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cache key for one template lookup.
pub fn template_key(code: &str, language: &str, version: Option<i32>) -> String {
    match version {
        Some(v) => format!("template:{}:{}:{}", code, language, v),
        None => format!("template:{}:{}:latest", code, language),
    }
}

/// Store-backed template resolver: cache-through reads with
/// stale-on-break fallback.
#[derive(Clone)]
pub struct TemplateResolver<R: TemplateRepository> {
    repo: Arc<R>,
    cache: CacheClient,
    breaker: CircuitBreaker,
}

impl<R: TemplateRepository> TemplateResolver<R> {
    pub fn new(repo: Arc<R>, cache: CacheClient, breaker: CircuitBreaker) -> Self {
        Self {
            repo,
            cache,
            breaker,
        }
    }

    /// Resolve `(code, language, version?)`; `None` means latest.
    pub async fn resolve(
        &self,
        code: &str,
        language: &str,
        version: Option<i32>,
    ) -> TemplateResult<Template> {
        let key = template_key(code, language, version);

        // Cache failures downgrade to a miss
        if let Ok(Some(cached)) = self.cache.get_json::<Template>(&key).await {
            debug!(code, language, ?version, "Template cache hit");
            return Ok(cached);
        }

        let allowed = self.breaker.allow(DATABASE_RESOURCE).await.unwrap_or(true);
        if !allowed {
            warn!(code, language, "Template store circuit open, trying stale cache");
            return self.newest_cached(code, language).await;
        }

        let result = match version {
            Some(v) => self.repo.find(code, language, v).await,
            None => self.repo.find_latest(code, language).await,
        };

        match result {
            Ok(Some(template)) => {
                let _ = self.breaker.record_success(DATABASE_RESOURCE).await;
                self.populate_cache(&template, version.is_none()).await;
                Ok(template)
            }
            Ok(None) => {
                // An absent row is an answer, not a store failure
                let _ = self.breaker.record_success(DATABASE_RESOURCE).await;
                Err(TemplateError::NotFound {
                    code: code.to_string(),
                    language: language.to_string(),
                })
            }
            Err(e) => {
                let _ = self.breaker.record_failure(DATABASE_RESOURCE).await;
                warn!(code, language, error = %e, "Template store query failed");
                Err(TemplateError::Unavailable(e.to_string()))
            }
        }
    }

    /// Write both the versioned and (when resolving latest) the
    /// `latest` cache entries.
    async fn populate_cache(&self, template: &Template, resolved_latest: bool) {
        let versioned = template_key(&template.code, &template.language, Some(template.version));
        let _ = self
            .cache
            .set_json(&versioned, template, Some(TEMPLATE_CACHE_TTL))
            .await;

        if resolved_latest {
            let latest = template_key(&template.code, &template.language, None);
            let _ = self
                .cache
                .set_json(&latest, template, Some(TEMPLATE_CACHE_TTL))
                .await;
        }
    }

    /// Serve the newest cached version for `(code, language)`, if any.
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
                "template store unavailable and no cached version of '{}' ({})",
                code, language
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateType;
    use crate::repository::InMemoryTemplateRepository;
    use resilience::BreakerConfig;
    use std::collections::BTreeMap;

    #[test]
    fn test_template_key_format() {
        assert_eq!(
            template_key("welcome", "en", Some(2)),
            "template:welcome:en:2"
        );
        assert_eq!(
            template_key("welcome", "en", None),
            "template:welcome:en:latest"
        );
    }

    async fn test_resolver() -> (
        TemplateResolver<InMemoryTemplateRepository>,
        Arc<InMemoryTemplateRepository>,
        CircuitBreaker,
    ) {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = redis::aio::ConnectionManager::new(client).await.unwrap();
        let cache = CacheClient::new(manager);

        let repo = Arc::new(InMemoryTemplateRepository::new());
        let scope = format!("test-{}", uuid::Uuid::new_v4());
        let breaker = CircuitBreaker::new(
            cache.clone(),
            BreakerConfig::new(scope).with_failure_threshold(5),
        );

        (
            TemplateResolver::new(Arc::clone(&repo), cache, breaker.clone()),
            repo,
            breaker,
        )
    }

    fn seed_template(code: &str, version: i32) -> Template {
        Template::new(
            code.to_string(),
            TemplateType::Email,
            "en".to_string(),
            version,
            BTreeMap::from([("body".to_string(), "hi {{name}}".to_string())]),
            vec!["name".to_string()],
        )
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_resolve_latest_and_exact_version() {
        let (resolver, repo, _) = test_resolver().await;
        let code = format!("welcome-{}", uuid::Uuid::new_v4());

        repo.insert(seed_template(&code, 1)).await.unwrap();
        repo.insert(seed_template(&code, 2)).await.unwrap();

        let latest = resolver.resolve(&code, "en", None).await.unwrap();
        assert_eq!(latest.version, 2);

        let exact = resolver.resolve(&code, "en", Some(1)).await.unwrap();
        assert_eq!(exact.version, 1);
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_resolve_missing_is_not_found() {
        let (resolver, _, _) = test_resolver().await;
        let code = format!("missing-{}", uuid::Uuid::new_v4());

        let result = resolver.resolve(&code, "en", None).await;
        assert!(matches!(result, Err(TemplateError::NotFound { .. })));
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_stale_served_while_circuit_open() {
        let (resolver, repo, breaker) = test_resolver().await;
        let code = format!("stale-{}", uuid::Uuid::new_v4());

        repo.insert(seed_template(&code, 1)).await.unwrap();

        // Warm the cache, then lose the store behind an open circuit
        resolver.resolve(&code, "en", None).await.unwrap();
        for _ in 0..5 {
            breaker.record_failure(DATABASE_RESOURCE).await.unwrap();
        }
        repo.delete_all(&code, "en").await.unwrap();

        // Cached copy still resolves...
        let stale = resolver.resolve(&code, "en", None).await.unwrap();
        assert_eq!(stale.version, 1);

        // ...but an uncached code is Unavailable, not NotFound
        let uncached = format!("uncached-{}", uuid::Uuid::new_v4());
        let result = resolver.resolve(&uncached, "en", None).await;
        assert!(matches!(result, Err(TemplateError::Unavailable(_))));
    }
}
