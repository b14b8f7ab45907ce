//! Template domain: the versioned catalog, its resolver, and the HTTP
//! client workers use to reach it.
//!
//! Templates are immutable once written: an update inserts the next
//! version for `(code, language)` rather than mutating rows, so the
//! audit log's `(code, version)` references stay meaningful forever.
//! Reads go cache-first under `template:{code}:{language}:{version|latest}`
//! and fall back to the newest cached version when the backing store's
//! circuit is open.

pub mod catalog;
pub mod client;
pub mod error;
pub mod handlers;
pub mod models;
pub mod placeholders;
pub mod repository;
pub mod resolver;
pub mod source;

pub use catalog::TemplateCatalog;
pub use client::{TemplateClient, TemplateClientConfig};
pub use error::{TemplateError, TemplateResult};
pub use handlers::TemplatesState;
pub use models::{CreateTemplate, Template, TemplateType, UpdateTemplate};
pub use repository::{InMemoryTemplateRepository, PostgresTemplateRepository, TemplateRepository};
pub use resolver::TemplateResolver;
pub use source::TemplateSource;
