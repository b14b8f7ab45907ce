//! Notification domain: the dispatch pipeline's envelope, state, and
//! processing logic.
//!
//! The gateway side (dispatch) reserves the idempotency key, persists a
//! short-lived status record, and fans the request out to the typed
//! queues. The worker side (processor) consumes a queue, deduplicates
//! through the same idempotency marker, renders the template, and
//! delivers through a transport behind the shared circuit breaker.
//! Every terminal transition leaves an append-only audit row.

pub mod audit;
pub mod dispatch;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod processor;
pub mod render;
pub mod status;
pub mod transports;

pub use audit::{
    AuditLog, AuditLogRepository, AuditStatus, CreateAuditLog, InMemoryAuditLogRepository,
    PostgresAuditLogRepository,
};
pub use dispatch::{DispatchReceipt, DispatchService};
pub use error::{NotificationError, NotificationResult};
pub use idempotency::{IdempotencyStatus, IdempotencyStore};
pub use models::{
    DeliveryStatus, NotificationMessage, NotificationType, SendNotificationRequest, StatusRecord,
};
pub use processor::NotificationProcessor;
pub use render::render_content;
pub use status::StatusStore;
pub use transports::{
    FcmConfig, FcmTransport, NotificationTransport, OutboundDelivery, SmtpConfig, SmtpTransport,
    TransportError,
};
