use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{NotificationError, NotificationResult};

/// Status recorded in an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Queued,
    Processing,
    Sent,
    Failed,
    Dlq,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Queued => write!(f, "queued"),
            AuditStatus::Processing => write!(f, "processing"),
            AuditStatus::Sent => write!(f, "sent"),
            AuditStatus::Failed => write!(f, "failed"),
            AuditStatus::Dlq => write!(f, "dlq"),
        }
    }
}

/// One append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub trace_id: String,
    pub user_id: Uuid,
    pub notification_type: String,
    pub template_code: String,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Row to append. Rows are written only as a side effect of a worker
/// state transition and are never updated.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAuditLog {
    pub trace_id: String,
    pub user_id: String,
    pub notification_type: String,
    pub template_code: String,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub metadata: JsonValue,
}

impl CreateAuditLog {
    pub fn new(
        trace_id: String,
        user_id: String,
        notification_type: String,
        template_code: String,
        status: AuditStatus,
    ) -> Self {
        Self {
            trace_id,
            user_id,
            notification_type,
            template_code,
            status,
            error_message: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only audit log repository.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Append a row.
    async fn append(&self, log: CreateAuditLog) -> NotificationResult<()>;

    /// Rows for one trace, newest first.
    async fn find_by_trace_id(&self, trace_id: &str) -> NotificationResult<Vec<AuditLog>>;
}

/// PostgreSQL implementation.
#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    db: DatabaseConnection,
}

impl PostgresAuditLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct AuditRow {
    id: Uuid,
    trace_id: String,
    user_id: Uuid,
    notification_type: String,
    template_code: String,
    status: String,
    error_message: Option<String>,
    metadata: JsonValue,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditLog {
    fn from(row: AuditRow) -> Self {
        let status = match row.status.as_str() {
            "queued" => AuditStatus::Queued,
            "processing" => AuditStatus::Processing,
            "sent" => AuditStatus::Sent,
            "dlq" => AuditStatus::Dlq,
            _ => AuditStatus::Failed,
        };

        AuditLog {
            id: row.id,
            trace_id: row.trace_id,
            user_id: row.user_id,
            notification_type: row.notification_type,
            template_code: row.template_code,
            status,
            error_message: row.error_message,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn append(&self, log: CreateAuditLog) -> NotificationResult<()> {
        let user_id: Uuid = log
            .user_id
            .parse()
            .map_err(|e| NotificationError::Internal(format!("Invalid user_id: {}", e)))?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
                INSERT INTO audit_logs
                    (id, trace_id, user_id, notification_type, template_code, status, error_message, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            [
                Uuid::now_v7().into(),
                log.trace_id.clone().into(),
                user_id.into(),
                log.notification_type.into(),
                log.template_code.into(),
                log.status.to_string().into(),
                log.error_message.into(),
                log.metadata.into(),
            ],
        );

        self.db.execute(stmt).await?;

        tracing::debug!(trace_id = %log.trace_id, status = %log.status, "Audit row appended");
        Ok(())
    }

    async fn find_by_trace_id(&self, trace_id: &str) -> NotificationResult<Vec<AuditLog>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT * FROM audit_logs WHERE trace_id = $1 ORDER BY created_at DESC",
            [trace_id.into()],
        );

        let rows = self.db.query_all(stmt).await?;
        Ok(rows
            .iter()
            .map(|row| AuditRow::from_query_result(row, "").map(AuditLog::from))
            .collect::<Result<_, _>>()?)
    }
}

/// In-memory implementation (for tests).
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLogRepository {
    rows: Arc<RwLock<Vec<AuditLog>>>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, in append order.
    pub async fn all(&self) -> Vec<AuditLog> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, log: CreateAuditLog) -> NotificationResult<()> {
        let user_id: Uuid = log
            .user_id
            .parse()
            .map_err(|e| NotificationError::Internal(format!("Invalid user_id: {}", e)))?;

        let mut rows = self.rows.write().await;
        rows.push(AuditLog {
            id: Uuid::now_v7(),
            trace_id: log.trace_id,
            user_id,
            notification_type: log.notification_type,
            template_code: log.template_code,
            status: log.status,
            error_message: log.error_message,
            metadata: log.metadata,
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn find_by_trace_id(&self, trace_id: &str) -> NotificationResult<Vec<AuditLog>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<AuditLog> = rows
            .iter()
            .filter(|r| r.trace_id == trace_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}
