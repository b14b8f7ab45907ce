use crate::error::{TemplateError, TemplateResult};
use crate::models::{CreateTemplate, Template, UpdateTemplate};
use crate::placeholders::validate_placeholders;
use crate::repository::TemplateRepository;
use crate::resolver::{template_key, TEMPLATE_CACHE_TTL};
use cache::CacheClient;
use chrono::Utc;
use messaging::{Publisher, TemplateUpdated};
use std::sync::Arc;
use tracing::{info, warn};

/// Catalog writer: creates and updates template versions,
/// validates placeholders, keeps the cache honest, and announces
/// changes on the broker.
#[derive(Clone)]
pub struct TemplateCatalog<R: TemplateRepository> {
    repo: Arc<R>,
    cache: CacheClient,
    publisher: Arc<Publisher>,
}

impl<R: TemplateRepository> TemplateCatalog<R> {
    pub fn new(repo: Arc<R>, cache: CacheClient, publisher: Arc<Publisher>) -> Self {
        Self {
            repo,
            cache,
            publisher,
        }
    }

    /// Create version 1 of a new `(code, language)`.
    pub async fn create(&self, dto: CreateTemplate) -> TemplateResult<Template> {
        check_placeholders(&dto.code, &dto.content, &dto.variables)?;

        if self
            .repo
            .find_latest(&dto.code, &dto.language)
            .await?
            .is_some()
        {
            return Err(TemplateError::Conflict {
                code: dto.code,
                language: dto.language,
            });
        }

        let template = Template::new(
            dto.code,
            dto.template_type,
            dto.language,
            1,
            dto.content,
            dto.variables,
        );

        let created = self.repo.insert(template).await?;

        self.write_cache(&created).await;
        self.announce(&created).await;

        info!(code = %created.code, language = %created.language, "Template created");
        Ok(created)
    }

    /// Insert the next version for `(code, dto.language)`, merging the
    /// provided fields over the latest version (last-write-wins).
    pub async fn update(&self, code: &str, dto: UpdateTemplate) -> TemplateResult<Template> {
        let latest = self
            .repo
            .find_latest(code, &dto.language)
            .await?
            .ok_or_else(|| TemplateError::NotFound {
                code: code.to_string(),
                language: dto.language.clone(),
            })?;

        let template_type = dto.template_type.unwrap_or(latest.template_type);
        let content = dto.content.unwrap_or_else(|| latest.content.clone());
        let variables = dto.variables.unwrap_or_else(|| latest.variables.clone());

        check_placeholders(code, &content, &variables)?;

        let next = Template::new(
            latest.code.clone(),
            template_type,
            latest.language.clone(),
            latest.version + 1,
            content,
            variables,
        );

        let created = self.repo.insert(next).await?;

        // Old entries must not outlive the write: drop every cached
        // version, then repopulate for the new row
        self.invalidate_cache(code, &created.language).await;
        self.write_cache(&created).await;
        self.announce(&created).await;

        info!(
            code = %created.code,
            language = %created.language,
            version = created.version,
            "Template updated"
        );
        Ok(created)
    }

    /// Remove every version of `(code, language)`.
    pub async fn delete(&self, code: &str, language: &str) -> TemplateResult<()> {
        let removed = self.repo.delete_all(code, language).await?;

        if removed == 0 {
            return Err(TemplateError::NotFound {
                code: code.to_string(),
                language: language.to_string(),
            });
        }

        self.invalidate_cache(code, language).await;

        info!(code, language, versions = removed, "Template deleted");
        Ok(())
    }

    /// Paginated listing; `limit` is clamped to 100.
    pub async fn list(&self, page: u64, limit: u64) -> TemplateResult<(Vec<Template>, u64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        self.repo.list(page, limit).await
    }

    async fn write_cache(&self, template: &Template) {
        let versioned = template_key(&template.code, &template.language, Some(template.version));
        let latest = template_key(&template.code, &template.language, None);

        let _ = self
            .cache
            .set_json(&versioned, template, Some(TEMPLATE_CACHE_TTL))
            .await;
        let _ = self
            .cache
            .set_json(&latest, template, Some(TEMPLATE_CACHE_TTL))
            .await;
    }

    async fn invalidate_cache(&self, code: &str, language: &str) {
        let pattern = format!("template:{}:{}:*", code, language);
        if let Err(e) = self.cache.delete_matching(&pattern).await {
            warn!(code, language, error = %e, "Template cache invalidation failed");
        }
    }

    async fn announce(&self, template: &Template) {
        let event = TemplateUpdated {
            code: template.code.clone(),
            version: template.version,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.publisher.publish_template_updated(&event).await {
            // The write is durable; consumers will catch up via cache
            // expiry even without the event
            warn!(code = %template.code, error = %e, "Failed to publish template.updated");
        }
    }
}

fn check_placeholders(
    code: &str,
    content: &std::collections::BTreeMap<String, String>,
    variables: &[String],
) -> TemplateResult<()> {
    match validate_placeholders(content, variables) {
        Ok(unused) => {
            if !unused.is_empty() {
                warn!(code, unused = ?unused, "Template declares unused variables");
            }
            Ok(())
        }
        Err(undeclared) => Err(TemplateError::Validation(format!(
            "placeholders not declared as variables: {}",
            undeclared.join(", ")
        ))),
    }
}
