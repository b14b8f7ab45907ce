use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{TemplateError, TemplateResult};
use crate::models::{Template, TemplateType};

/// Repository trait for the versioned template store.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Insert a new version row.
    async fn insert(&self, template: Template) -> TemplateResult<Template>;

    /// Fetch an exact `(code, language, version)` row.
    async fn find(
        &self,
        code: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<Option<Template>>;

    /// Fetch the row with the highest version for `(code, language)`.
    async fn find_latest(&self, code: &str, language: &str) -> TemplateResult<Option<Template>>;

    /// Delete every version of `(code, language)`; returns rows removed.
    async fn delete_all(&self, code: &str, language: &str) -> TemplateResult<u64>;

    /// Page through templates; returns the page and the total count.
    async fn list(&self, page: u64, limit: u64) -> TemplateResult<(Vec<Template>, u64)>;
}

/// PostgreSQL implementation using SeaORM raw SQL.
#[derive(Clone)]
pub struct PostgresTemplateRepository {
    db: DatabaseConnection,
}

impl PostgresTemplateRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Columns selected for a template row; `type` is aliased because it is
/// a reserved word on the Rust side.
const TEMPLATE_COLUMNS: &str =
    "id, code, type AS template_type, language, version, content, variables, created_at";

#[derive(Debug, FromQueryResult)]
struct TemplateRow {
    id: Uuid,
    code: String,
    template_type: String,
    language: String,
    version: i32,
    content: serde_json::Value,
    variables: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = TemplateError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let template_type: TemplateType = row
            .template_type
            .parse()
            .map_err(|e: String| TemplateError::Internal(e))?;

        let content: BTreeMap<String, String> = serde_json::from_value(row.content)
            .map_err(|e| TemplateError::Internal(format!("Malformed content column: {}", e)))?;

        Ok(Template {
            id: row.id,
            code: row.code,
            template_type,
            language: row.language,
            version: row.version,
            content,
            variables: row.variables,
            created_at: row.created_at,
        })
    }
}

fn content_json(content: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::to_value(content).unwrap_or_else(|_| serde_json::json!({}))
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    async fn insert(&self, template: Template) -> TemplateResult<Template> {
        let sql = format!(
            r#"
            INSERT INTO templates (id, code, type, language, version, content, variables, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
        "#,
            TEMPLATE_COLUMNS
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                template.id.into(),
                template.code.clone().into(),
                template.template_type.to_string().into(),
                template.language.clone().into(),
                template.version.into(),
                content_json(&template.content).into(),
                template.variables.clone().into(),
                template.created_at.into(),
            ],
        );

        let row = self.db.query_one(stmt).await.map_err(|e| {
            if e.to_string().contains("duplicate key") {
                // Unique (code, language, version): a concurrent writer won
                TemplateError::Conflict {
                    code: template.code.clone(),
                    language: template.language.clone(),
                }
            } else {
                TemplateError::Database(e)
            }
        })?;

        let row =
            row.ok_or_else(|| TemplateError::Internal("INSERT returned no row".to_string()))?;
        TemplateRow::from_query_result(&row, "")
            .map_err(TemplateError::Database)?
            .try_into()
    }

    async fn find(
        &self,
        code: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<Option<Template>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT {} FROM templates WHERE code = $1 AND language = $2 AND version = $3",
                TEMPLATE_COLUMNS
            ),
            [code.into(), language.into(), version.into()],
        );

        match self.db.query_one(stmt).await? {
            Some(row) => {
                let template: Template = TemplateRow::from_query_result(&row, "")
                    .map_err(TemplateError::Database)?
                    .try_into()?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    async fn find_latest(&self, code: &str, language: &str) -> TemplateResult<Option<Template>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                r#"
                SELECT {} FROM templates
                WHERE code = $1 AND language = $2
                ORDER BY version DESC
                LIMIT 1
            "#,
                TEMPLATE_COLUMNS
            ),
            [code.into(), language.into()],
        );

        match self.db.query_one(stmt).await? {
            Some(row) => {
                let template: Template = TemplateRow::from_query_result(&row, "")
                    .map_err(TemplateError::Database)?
                    .try_into()?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    async fn delete_all(&self, code: &str, language: &str) -> TemplateResult<u64> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM templates WHERE code = $1 AND language = $2",
            [code.into(), language.into()],
        );

        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, page: u64, limit: u64) -> TemplateResult<(Vec<Template>, u64)> {
        let offset = page.saturating_sub(1) * limit;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                r#"
                SELECT {} FROM templates
                ORDER BY code, language, version DESC
                LIMIT $1 OFFSET $2
            "#,
                TEMPLATE_COLUMNS
            ),
            [(limit as i64).into(), (offset as i64).into()],
        );

        let rows = self.db.query_all(stmt).await?;
        let templates: Vec<Template> = rows
            .iter()
            .map(|row| {
                TemplateRow::from_query_result(row, "")
                    .map_err(TemplateError::Database)?
                    .try_into()
            })
            .collect::<TemplateResult<_>>()?;

        #[derive(FromQueryResult)]
        struct CountRow {
            total: i64,
        }

        let count_stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT COUNT(*) AS total FROM templates".to_owned(),
        );
        let total = match self.db.query_one(count_stmt).await? {
            Some(row) => CountRow::from_query_result(&row, "")?.total as u64,
            None => 0,
        };

        Ok((templates, total))
    }
}

/// In-memory implementation (for tests and local dev).
#[derive(Debug, Default, Clone)]
pub struct InMemoryTemplateRepository {
    rows: Arc<RwLock<HashMap<(String, String, i32), Template>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn insert(&self, template: Template) -> TemplateResult<Template> {
        let mut rows = self.rows.write().await;
        let key = (
            template.code.clone(),
            template.language.clone(),
            template.version,
        );

        if rows.contains_key(&key) {
            return Err(TemplateError::Conflict {
                code: template.code,
                language: template.language,
            });
        }

        rows.insert(key, template.clone());
        Ok(template)
    }

    async fn find(
        &self,
        code: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<Option<Template>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(code.to_string(), language.to_string(), version))
            .cloned())
    }

    async fn find_latest(&self, code: &str, language: &str) -> TemplateResult<Option<Template>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|t| t.code == code && t.language == language)
            .max_by_key(|t| t.version)
            .cloned())
    }

    async fn delete_all(&self, code: &str, language: &str) -> TemplateResult<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(c, l, _), _| !(c == code && l == language));
        Ok((before - rows.len()) as u64)
    }

    async fn list(&self, page: u64, limit: u64) -> TemplateResult<(Vec<Template>, u64)> {
        let rows = self.rows.read().await;
        let total = rows.len() as u64;

        let mut all: Vec<Template> = rows.values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.code, &a.language, std::cmp::Reverse(a.version)).cmp(&(
                &b.code,
                &b.language,
                std::cmp::Reverse(b.version),
            ))
        });

        let offset = (page.saturating_sub(1) * limit) as usize;
        let templates = all.into_iter().skip(offset).take(limit as usize).collect();

        Ok((templates, total))
    }
}
