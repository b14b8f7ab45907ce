use crate::client::TemplateClient;
use crate::error::TemplateResult;
use crate::models::Template;
use crate::repository::TemplateRepository;
use crate::resolver::TemplateResolver;
use async_trait::async_trait;

/// Anything that can resolve a template for rendering.
///
/// The worker pipeline consumes this seam: in production it is the
/// HTTP [`TemplateClient`]; co-located deployments (and tests) can
/// plug the store-backed [`TemplateResolver`] straight in.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Resolve `(code, language, version?)`; `None` means latest.
    async fn fetch(
        &self,
        code: &str,
        language: &str,
        version: Option<i32>,
    ) -> TemplateResult<Template>;
}

#[async_trait]
impl TemplateSource for TemplateClient {
    async fn fetch(
        &self,
        code: &str,
        language: &str,
        version: Option<i32>,
    ) -> TemplateResult<Template> {
        TemplateClient::fetch(self, code, language, version).await
    }
}

#[async_trait]
impl<R: TemplateRepository> TemplateSource for TemplateResolver<R> {
    async fn fetch(
        &self,
        code: &str,
        language: &str,
        version: Option<i32>,
    ) -> TemplateResult<Template> {
        self.resolve(code, language, version).await
    }
}
