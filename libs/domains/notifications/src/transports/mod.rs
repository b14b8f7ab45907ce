//! External delivery transports.
//!
//! Transports are opaque to the pipeline: they take a rendered
//! delivery, make one blocking call, and classify the failure. The
//! worker wraps every call in the shared circuit breaker under the
//! transport's resource name.

mod fcm;
mod smtp;

pub use fcm::{FcmConfig, FcmTransport};
pub use smtp::{SmtpConfig, SmtpTransport};

use crate::models::NotificationType;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// One rendered, addressed delivery.
#[derive(Debug, Clone)]
pub struct OutboundDelivery {
    /// Email address or device token, depending on the transport.
    pub recipient: String,

    /// Rendered content fields (`subject`/`body` for email,
    /// `title`/`body` for push).
    pub content: BTreeMap<String, String>,

    /// Trace id propagated into transport-side metadata.
    pub trace_id: String,

    /// Free-form metadata from the original request.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Transport failure, classified for the retry policy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// 4xx-class failures: the request is wrong and will not succeed
    /// on retry (bad recipient, rejected payload).
    #[error("Permanent transport failure: {0}")]
    Permanent(String),

    /// 5xx, timeouts, connection refusals: worth retrying.
    #[error("Transient transport failure: {0}")]
    Transient(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// An external delivery channel (SMTP relay, FCM).
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one notification. Implementations bound the call with
    /// their own deadline (≤ 5 s).
    async fn send(&self, delivery: &OutboundDelivery) -> Result<(), TransportError>;

    /// Transport name for logs.
    fn name(&self) -> &'static str;

    /// Circuit breaker resource guarding this transport.
    fn resource(&self) -> &'static str;

    /// The notification channel this transport serves.
    fn channel(&self) -> NotificationType;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert!(TransportError::Transient("503".into()).is_retryable());
        assert!(!TransportError::Permanent("invalid recipient".into()).is_retryable());
    }
}
