//! FCM push transport.

use super::{NotificationTransport, OutboundDelivery, TransportError};
use crate::models::NotificationType;
use async_trait::async_trait;
use core_config::{env_or_default, env_required, ConfigError, FromEnv};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

/// Per-send deadline.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// FCM endpoint configuration.
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub server_key: String,
    pub url: String,
}

/// Load FCM configuration from environment variables.
///
/// - `FCM_SERVER_KEY` (required)
/// - `FCM_URL` (default `https://fcm.googleapis.com/fcm/send`)
impl FromEnv for FcmConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_key: env_required("FCM_SERVER_KEY")?,
            url: env_or_default("FCM_URL", "https://fcm.googleapis.com/fcm/send"),
        })
    }
}

#[derive(Debug, Serialize)]
struct FcmPayload<'a> {
    to: &'a str,
    notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Validate the shape of a device token before spending a request on it.
pub fn validate_device_token(token: &str) -> Result<(), TransportError> {
    if token.is_empty() {
        return Err(TransportError::Permanent(
            "Device token cannot be empty".to_string(),
        ));
    }

    if token.len() < 20 {
        return Err(TransportError::Permanent(
            "Device token too short (minimum 20 characters)".to_string(),
        ));
    }

    if token.len() > 200 {
        return Err(TransportError::Permanent(
            "Device token too long (maximum 200 characters)".to_string(),
        ));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(TransportError::Permanent(
            "Device token contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// FCM transport over the HTTP send endpoint.
pub struct FcmTransport {
    http: reqwest::Client,
    config: FcmConfig,
}

impl FcmTransport {
    pub fn new(config: FcmConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Permanent(format!("HTTP client setup: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl NotificationTransport for FcmTransport {
    async fn send(&self, delivery: &OutboundDelivery) -> Result<(), TransportError> {
        validate_device_token(&delivery.recipient)?;

        let title = delivery
            .content
            .get("title")
            .map(String::as_str)
            .unwrap_or("Notification");
        let body = delivery
            .content
            .get("body")
            .map(String::as_str)
            .unwrap_or_default();

        let mut data: HashMap<String, String> = delivery
            .metadata
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        data.insert("trace_id".to_string(), delivery.trace_id.clone());

        let payload = FcmPayload {
            to: &delivery.recipient,
            notification: FcmNotification { title, body },
            data: Some(data),
        };

        debug!(trace_id = %delivery.trace_id, "Sending push notification via FCM");

        let response = self
            .http
            .post(&self.config.url)
            .header("Authorization", format!("key={}", self.config.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    TransportError::Transient(format!("FCM request: {}", e))
                } else {
                    TransportError::Permanent(format!("FCM request: {}", e))
                }
            })?;

        let status = response.status();

        if status.is_success() {
            info!(trace_id = %delivery.trace_id, "Push notification sent");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        error!(status = %status, detail = %detail, "FCM request failed");

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(TransportError::Transient(format!(
                "FCM returned {}: {}",
                status, detail
            )))
        } else {
            Err(TransportError::Permanent(format!(
                "FCM returned {}: {}",
                status, detail
            )))
        }
    }

    fn name(&self) -> &'static str {
        "fcm"
    }

    fn resource(&self) -> &'static str {
        "fcm"
    }

    fn channel(&self) -> NotificationType {
        NotificationType::Push
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_token_accepted() {
        assert!(validate_device_token("dGhpcy1pcy1hLXZhbGlkLXRva2Vu").is_ok());
        assert!(validate_device_token("token:with.allowed_chars-1234567890").is_ok());
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        assert!(validate_device_token("").is_err());
        assert!(validate_device_token("too-short").is_err());
        assert!(validate_device_token(&"x".repeat(201)).is_err());
        assert!(validate_device_token("has spaces which are not allowed!").is_err());
    }

    #[test]
    fn test_token_failures_are_permanent() {
        let err = validate_device_token("").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_fcm_config_from_env() {
        temp_env::with_vars(
            [("FCM_SERVER_KEY", Some("key-123")), ("FCM_URL", None)],
            || {
                let config = FcmConfig::from_env().unwrap();
                assert_eq!(config.server_key, "key-123");
                assert_eq!(config.url, "https://fcm.googleapis.com/fcm/send");
            },
        );
    }

    #[test]
    fn test_fcm_config_requires_server_key() {
        temp_env::with_var_unset("FCM_SERVER_KEY", || {
            assert!(FcmConfig::from_env().is_err());
        });
    }
}
