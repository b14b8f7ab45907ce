use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
    Push,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Push => "push",
        }
    }

    /// The queue this type routes to.
    pub fn queue(&self) -> &'static str {
        match self {
            NotificationType::Email => messaging::topology::EMAIL_QUEUE,
            NotificationType::Push => messaging::topology::PUSH_QUEUE,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /notifications/send`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendNotificationRequest {
    pub notification_type: NotificationType,
    #[validate(length(min = 1, max = 100))]
    pub template_code: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    pub request_id: Uuid,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Envelope published to the typed queues and consumed by the workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub notification_id: String,
    pub idempotency_key: String,
    pub notification_type: NotificationType,
    pub user_id: String,
    /// Device token, present for push notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    /// Resolved recipient: email address or device token.
    pub recipient: String,
    pub template_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub variables: HashMap<String, serde_json::Value>,
    pub request_id: String,
    pub priority: i32,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_by: String,
    pub timestamp: String,
}

impl NotificationMessage {
    /// Language tag, defaulting to English.
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }
}

/// Terminal and in-flight states of a notification's status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// Short-lived status record under `notification:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub notification_id: String,
    pub notification_type: NotificationType,
    pub user_id: String,
    pub template_code: String,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn pending(message: &NotificationMessage) -> Self {
        let now = Utc::now();
        Self {
            notification_id: message.notification_id.clone(),
            notification_type: message.notification_type,
            user_id: message.user_id.clone(),
            template_code: message.template_code.clone(),
            recipient: message.recipient.clone(),
            status: DeliveryStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Millisecond-precision RFC 3339 timestamp for envelopes.
pub fn envelope_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_queues() {
        assert_eq!(NotificationType::Email.queue(), "email.queue");
        assert_eq!(NotificationType::Push.queue(), "push.queue");
    }

    #[test]
    fn test_unknown_notification_type_rejected_at_parse() {
        let result: Result<SendNotificationRequest, _> =
            serde_json::from_value(serde_json::json!({
                "notification_type": "sms",
                "template_code": "welcome",
                "request_id": Uuid::new_v4(),
            }));

        assert!(result.is_err());
    }

    #[test]
    fn test_send_request_defaults() {
        let request: SendNotificationRequest = serde_json::from_value(serde_json::json!({
            "notification_type": "email",
            "template_code": "welcome",
            "request_id": Uuid::new_v4(),
        }))
        .unwrap();

        assert_eq!(request.priority, 0);
        assert!(request.variables.is_empty());
        assert!(request.metadata.is_empty());
        assert!(request.language.is_none());
    }

    #[test]
    fn test_message_envelope_round_trip() {
        let message = NotificationMessage {
            notification_id: "r1".to_string(),
            idempotency_key: "K1".to_string(),
            notification_type: NotificationType::Email,
            user_id: "u1".to_string(),
            push_token: None,
            recipient: "a@b.c".to_string(),
            template_code: "welcome".to_string(),
            language: None,
            variables: HashMap::from([("name".to_string(), serde_json::json!("X"))]),
            request_id: "r1".to_string(),
            priority: 1,
            metadata: HashMap::new(),
            created_by: "a@b.c".to_string(),
            timestamp: envelope_timestamp(),
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: NotificationMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(back.notification_id, "r1");
        assert_eq!(back.notification_type, NotificationType::Email);
        assert_eq!(back.language_or_default(), "en");
        // Absent push token stays absent on the wire
        assert!(!json.contains("push_token"));
    }
}
