use crate::error::{NotificationError, NotificationResult};
use crate::idempotency::IdempotencyStore;
use crate::models::{
    envelope_timestamp, DeliveryStatus, NotificationMessage, NotificationType,
    SendNotificationRequest, StatusRecord,
};
use crate::status::StatusStore;
use domain_users::{User, UserRepository, UserService};
use messaging::Publisher;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Response body for a successfully enqueued notification.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub notification_id: String,
    pub status: &'static str,
    pub queues: Vec<String>,
}

/// Gateway dispatcher: idempotent fan-out of a validated request
/// into the typed broker queues.
#[derive(Clone)]
pub struct DispatchService<R: UserRepository> {
    users: UserService<R>,
    idempotency: IdempotencyStore,
    status: StatusStore,
    publisher: Arc<Publisher>,
}

impl<R: UserRepository> DispatchService<R> {
    pub fn new(
        users: UserService<R>,
        idempotency: IdempotencyStore,
        status: StatusStore,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            users,
            idempotency,
            status,
            publisher,
        }
    }

    /// Route one notification request.
    ///
    /// `user_id`/`created_by` come from the validated access token. The
    /// idempotency key is reserved before any publish; on failure after
    /// the reservation the key is intentionally NOT released, so a
    /// retry with the same key cannot double-publish. Callers retry
    /// with a fresh key.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        created_by: &str,
        idempotency_key: &str,
        request: SendNotificationRequest,
    ) -> NotificationResult<DispatchReceipt> {
        if idempotency_key.trim().is_empty() {
            return Err(NotificationError::Validation(
                "X-Idempotency-Key header must not be empty".to_string(),
            ));
        }

        let user = self.users.get_user_record(user_id).await?;

        if !user.preferences.allows(request.notification_type.as_str()) {
            return Err(NotificationError::OptedOut(format!(
                "user has disabled {} notifications",
                request.notification_type
            )));
        }

        let recipient = resolve_recipient(&user, request.notification_type)?;

        // First-writer-wins: everything before this point is side-effect
        // free, everything after belongs to the reservation winner
        if !self.idempotency.try_reserve(idempotency_key).await? {
            return Err(NotificationError::DuplicateRequest);
        }

        let message = NotificationMessage {
            notification_id: request.request_id.to_string(),
            idempotency_key: idempotency_key.to_string(),
            notification_type: request.notification_type,
            user_id: user.id.to_string(),
            push_token: user.push_token.clone(),
            recipient,
            template_code: request.template_code,
            language: request.language,
            variables: request.variables,
            request_id: request.request_id.to_string(),
            priority: request.priority,
            metadata: request.metadata,
            created_by: created_by.to_string(),
            timestamp: envelope_timestamp(),
        };

        // Status record is observability, not correctness: losing it
        // must not fail the request
        if let Err(e) = self.status.put(&StatusRecord::pending(&message)).await {
            warn!(
                notification_id = %message.notification_id,
                error = %e,
                "Failed to write status record"
            );
        }

        let queue = message.notification_type.queue();

        if let Err(e) = self.publisher.publish_json(queue, &message).await {
            error!(
                notification_id = %message.notification_id,
                queue,
                error = %e,
                "Publish failed after idempotency reservation"
            );

            let _ = self
                .status
                .update_status(&message.notification_id, DeliveryStatus::Failed)
                .await;

            return Err(NotificationError::Broker(e));
        }

        info!(
            notification_id = %message.notification_id,
            queue,
            notification_type = %message.notification_type,
            "Notification enqueued"
        );

        Ok(DispatchReceipt {
            notification_id: message.notification_id,
            status: "queued",
            queues: vec![queue.to_string()],
        })
    }

    /// Look up a notification's status record.
    pub async fn status_of(&self, notification_id: &str) -> NotificationResult<Option<StatusRecord>> {
        Ok(self.status.get(notification_id).await?)
    }
}

fn resolve_recipient(
    user: &User,
    notification_type: NotificationType,
) -> NotificationResult<String> {
    match notification_type {
        NotificationType::Email => Ok(user.email.clone()),
        NotificationType::Push => user.push_token.clone().ok_or_else(|| {
            NotificationError::Validation(
                "user has no registered push token".to_string(),
            )
        }),
    }
}
