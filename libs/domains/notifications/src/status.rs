use crate::models::{DeliveryStatus, StatusRecord};
use cache::{CacheClient, CacheResult};
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

/// TTL for status records: the status query surface only answers for
/// the last hour.
const STATUS_TTL: Duration = Duration::from_secs(3600);

/// Short-lived notification status records under `notification:{id}`.
///
/// The gateway writes the record on enqueue; workers update it
/// best-effort on terminal transitions. Readers must tolerate absence
/// (an expired record answers 404).
#[derive(Clone)]
pub struct StatusStore {
    cache: CacheClient,
}

impl StatusStore {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Write a full status record.
    pub async fn put(&self, record: &StatusRecord) -> CacheResult<()> {
        self.cache
            .set_json(
                &Self::status_key(&record.notification_id),
                record,
                Some(STATUS_TTL),
            )
            .await
    }

    /// Read a status record, if it has not expired.
    pub async fn get(&self, notification_id: &str) -> CacheResult<Option<StatusRecord>> {
        self.cache.get_json(&Self::status_key(notification_id)).await
    }

    /// Best-effort status transition: failures are logged by callers
    /// and never propagate. A missing record is left missing (it has
    /// expired; rewriting a partial one would lie about the request).
    pub async fn update_status(
        &self,
        notification_id: &str,
        status: DeliveryStatus,
    ) -> CacheResult<()> {
        let Some(mut record) = self.get(notification_id).await? else {
            debug!(notification_id, "Status record expired, skipping update");
            return Ok(());
        };

        record.status = status;
        record.updated_at = Utc::now();
        self.put(&record).await
    }

    fn status_key(notification_id: &str) -> String {
        format!("notification:{}", notification_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationMessage, NotificationType};
    use std::collections::HashMap;

    fn message(id: &str) -> NotificationMessage {
        NotificationMessage {
            notification_id: id.to_string(),
            idempotency_key: "K1".to_string(),
            notification_type: NotificationType::Email,
            user_id: "u1".to_string(),
            push_token: None,
            recipient: "a@b.c".to_string(),
            template_code: "welcome".to_string(),
            language: None,
            variables: HashMap::new(),
            request_id: id.to_string(),
            priority: 0,
            metadata: HashMap::new(),
            created_by: "a@b.c".to_string(),
            timestamp: crate::models::envelope_timestamp(),
        }
    }

    async fn test_store() -> StatusStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = redis::aio::ConnectionManager::new(client).await.unwrap();
        StatusStore::new(CacheClient::new(manager))
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_put_get_update() {
        let store = test_store().await;
        let id = format!("r-{}", uuid::Uuid::new_v4());

        store.put(&StatusRecord::pending(&message(&id))).await.unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Pending);

        store
            .update_status(&id, DeliveryStatus::Delivered)
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
        assert!(record.updated_at >= record.created_at);
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_update_missing_record_is_noop() {
        let store = test_store().await;
        let id = format!("missing-{}", uuid::Uuid::new_v4());

        store
            .update_status(&id, DeliveryStatus::Failed)
            .await
            .unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
    }
}
