use crate::audit::{AuditLogRepository, AuditStatus, CreateAuditLog};
use crate::idempotency::{IdempotencyStatus, IdempotencyStore};
use crate::models::{DeliveryStatus, NotificationMessage, NotificationType};
use crate::render::render_content;
use crate::status::StatusStore;
use crate::transports::{NotificationTransport, OutboundDelivery, TransportError};
use async_trait::async_trait;
use domain_templates::{TemplateError, TemplateSource};
use messaging::{IncomingMessage, MessageProcessor, Outcome};
use metrics::counter;
use resilience::CircuitBreaker;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Worker-side message processor.
///
/// Drives one delivery through the per-message state machine
/// (`absent → processing → sent | failed`, observable through the
/// idempotency marker and the audit log) and reports the settlement
/// decision to the consumer runtime.
pub struct NotificationProcessor {
    idempotency: IdempotencyStore,
    status: StatusStore,
    templates: Arc<dyn TemplateSource>,
    transport: Arc<dyn NotificationTransport>,
    breaker: CircuitBreaker,
    audit: Arc<dyn AuditLogRepository>,
    max_retries: u32,
}

impl NotificationProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        idempotency: IdempotencyStore,
        status: StatusStore,
        templates: Arc<dyn TemplateSource>,
        transport: Arc<dyn NotificationTransport>,
        breaker: CircuitBreaker,
        audit: Arc<dyn AuditLogRepository>,
        max_retries: u32,
    ) -> Self {
        Self {
            idempotency,
            status,
            templates,
            transport,
            breaker,
            audit,
            max_retries,
        }
    }

    async fn handle(&self, message: &NotificationMessage, retry_count: u32) -> Outcome {
        let request_id = &message.request_id;

        // Idempotency gate. First deliveries race for the reservation;
        // a redelivery of our own retry (retry_count > 0) proceeds
        // under the reservation it already owns.
        if retry_count == 0 {
            match self.idempotency.try_reserve(request_id).await {
                Ok(true) => {}
                Ok(false) => match self.idempotency.check(request_id).await {
                    Ok(IdempotencyStatus::Sent) => {
                        debug!(%request_id, "Duplicate delivery of a sent message, acking");
                        return Outcome::Ack;
                    }
                    Ok(IdempotencyStatus::Failed) => {
                        debug!(%request_id, "Duplicate delivery of a failed message, acking");
                        return Outcome::Ack;
                    }
                    Ok(IdempotencyStatus::Processing) => {
                        debug!(%request_id, "Message owned by another worker, requeueing");
                        return Outcome::Requeue;
                    }
                    // Marker vanished between the two reads; let the
                    // broker hand it back
                    Ok(IdempotencyStatus::NotFound) => return Outcome::Requeue,
                    Err(e) => {
                        return Outcome::Retry {
                            reason: format!("idempotency check failed: {}", e),
                        }
                    }
                },
                Err(e) => {
                    // Without the marker there is no dedupe guarantee;
                    // do not touch the transport
                    return Outcome::Retry {
                        reason: format!("idempotency reservation failed: {}", e),
                    };
                }
            }
        } else {
            match self.idempotency.check(request_id).await {
                Ok(IdempotencyStatus::Sent) | Ok(IdempotencyStatus::Failed) => {
                    return Outcome::Ack;
                }
                Ok(_) => {
                    let _ = self.idempotency.mark_processing(request_id).await;
                }
                Err(e) => {
                    return Outcome::Retry {
                        reason: format!("idempotency check failed: {}", e),
                    };
                }
            }
        }

        match self.transport.channel() {
            NotificationType::Email => counter!("emails_processed").increment(1),
            NotificationType::Push => counter!("push_processed").increment(1),
        }

        if let Err(e) = self
            .status
            .update_status(&message.notification_id, DeliveryStatus::Pending)
            .await
        {
            debug!(%request_id, error = %e, "Status update failed (non-fatal)");
        }

        // Template fetch goes through the worker's template client, which is
        // breaker-wrapped and cache-backed on its own
        let template = match self
            .templates
            .fetch(
                &message.template_code,
                message.language_or_default(),
                None,
            )
            .await
        {
            Ok(template) => template,
            Err(TemplateError::NotFound { .. }) => {
                return self
                    .terminal_failure(message, "template not found", retry_count)
                    .await;
            }
            Err(e) => {
                return self
                    .transient_failure(message, &format!("template fetch: {}", e), retry_count)
                    .await;
            }
        };

        let rendered = match render_content(&template.content, &message.variables) {
            Ok(rendered) => rendered,
            Err(e) => {
                return self
                    .terminal_failure(message, &format!("rendering: {}", e), retry_count)
                    .await;
            }
        };

        let delivery = OutboundDelivery {
            recipient: message.recipient.clone(),
            content: rendered,
            trace_id: message.request_id.clone(),
            metadata: message.metadata.clone(),
        };

        let resource = self.transport.resource();

        match self.breaker.allow(resource).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(%request_id, resource, "Transport circuit open, deferring");
                return self
                    .transient_failure(
                        message,
                        &format!("circuit open for {}", resource),
                        retry_count,
                    )
                    .await;
            }
            Err(e) => {
                // No breaker view means no coordinated protection; defer
                // rather than pile onto a possibly-failing transport
                return self
                    .transient_failure(
                        message,
                        &format!("breaker state unavailable: {}", e),
                        retry_count,
                    )
                    .await;
            }
        }

        match self.transport.send(&delivery).await {
            Ok(()) => {
                let _ = self.breaker.record_success(resource).await;
                self.settle_sent(message, retry_count).await
            }
            Err(e) => {
                let _ = self.breaker.record_failure(resource).await;

                match e {
                    TransportError::Transient(reason) => {
                        self.transient_failure(message, &reason, retry_count).await
                    }
                    TransportError::Permanent(reason) => {
                        self.terminal_failure(message, &reason, retry_count).await
                    }
                }
            }
        }
    }

    async fn settle_sent(&self, message: &NotificationMessage, retry_count: u32) -> Outcome {
        if let Err(e) = self.idempotency.mark_sent(&message.request_id).await {
            // The send happened but is not recorded: redelivery would
            // send twice. Keep the marker authoritative by retrying the
            // mark before the message settles.
            error!(
                request_id = %message.request_id,
                error = %e,
                "Failed to mark request as sent"
            );
            return Outcome::Retry {
                reason: format!("failed to persist sent marker: {}", e),
            };
        }

        self.append_audit(message, AuditStatus::Sent, None, retry_count)
            .await;

        if let Err(e) = self
            .status
            .update_status(&message.notification_id, DeliveryStatus::Delivered)
            .await
        {
            debug!(request_id = %message.request_id, error = %e, "Status update failed (non-fatal)");
        }

        match self.transport.channel() {
            NotificationType::Email => counter!("emails_delivered").increment(1),
            NotificationType::Push => counter!("push_delivered").increment(1),
        }

        info!(
            request_id = %message.request_id,
            transport = self.transport.name(),
            "Notification delivered"
        );

        Outcome::Ack
    }

    /// A failure worth retrying, unless the retry budget is spent.
    async fn transient_failure(
        &self,
        message: &NotificationMessage,
        reason: &str,
        retry_count: u32,
    ) -> Outcome {
        if retry_count < self.max_retries {
            warn!(
                request_id = %message.request_id,
                retry_count,
                reason,
                "Transient failure, scheduling retry"
            );
            return Outcome::Retry {
                reason: reason.to_string(),
            };
        }

        warn!(
            request_id = %message.request_id,
            retry_count,
            reason,
            "Retry budget exhausted"
        );
        self.terminal_failure(message, reason, retry_count).await
    }

    /// Settle a message as failed: terminal marker, audit row, DLQ.
    async fn terminal_failure(
        &self,
        message: &NotificationMessage,
        reason: &str,
        retry_count: u32,
    ) -> Outcome {
        if let Err(e) = self.idempotency.mark_failed(&message.request_id).await {
            error!(
                request_id = %message.request_id,
                error = %e,
                "Failed to mark request as failed"
            );
        }

        self.append_audit(message, AuditStatus::Failed, Some(reason), retry_count)
            .await;

        if let Err(e) = self
            .status
            .update_status(&message.notification_id, DeliveryStatus::Failed)
            .await
        {
            debug!(request_id = %message.request_id, error = %e, "Status update failed (non-fatal)");
        }

        Outcome::Dead {
            reason: reason.to_string(),
        }
    }

    async fn append_audit(
        &self,
        message: &NotificationMessage,
        status: AuditStatus,
        error_message: Option<&str>,
        retry_count: u32,
    ) {
        let mut log = CreateAuditLog::new(
            message.request_id.clone(),
            message.user_id.clone(),
            message.notification_type.to_string(),
            message.template_code.clone(),
            status,
        )
        .with_metadata(serde_json::json!({
            "retry_count": retry_count,
            "recipient": message.recipient,
            "priority": message.priority,
        }));

        if let Some(error_message) = error_message {
            log = log.with_error(error_message);
        }

        if let Err(e) = self.audit.append(log).await {
            // Audit loss is logged, never fatal to the message
            error!(
                request_id = %message.request_id,
                error = %e,
                "Failed to append audit row"
            );
        }
    }
}

#[async_trait]
impl MessageProcessor for NotificationProcessor {
    async fn process(&self, incoming: &IncomingMessage) -> Outcome {
        let message: NotificationMessage = match serde_json::from_slice(&incoming.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Unparseable message payload, dead-lettering");
                return Outcome::Dead {
                    reason: format!("unparseable payload: {}", e),
                };
            }
        };

        debug!(
            request_id = %message.request_id,
            notification_type = %message.notification_type,
            retry_count = incoming.retry_count,
            "Processing notification"
        );

        self.handle(&message, incoming.retry_count).await
    }

    fn name(&self) -> &'static str {
        match self.transport.channel() {
            NotificationType::Email => "email-notification-processor",
            NotificationType::Push => "push-notification-processor",
        }
    }
}
