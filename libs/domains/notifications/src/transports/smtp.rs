//! SMTP email transport using lettre.

use super::{NotificationTransport, OutboundDelivery, TransportError};
use crate::models::NotificationType;
use async_trait::async_trait;
use core_config::{env_or_default, env_parse_or, ConfigError, FromEnv};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{debug, error, info};

/// Per-send deadline.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub from_name: String,
    /// Optional for dev relays (Mailpit and friends).
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn new(host: String, port: u16, from_email: String, from_name: String) -> Self {
        Self {
            host,
            port,
            from_email,
            from_name,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }
}

/// Load SMTP configuration from environment variables.
///
/// - `SMTP_HOST` (default "localhost"), `SMTP_PORT` (default 1025)
/// - `SMTP_FROM_EMAIL`, `SMTP_FROM_NAME`
/// - `SMTP_USERNAME`, `SMTP_PASSWORD` (optional)
/// - `SMTP_USE_TLS` ("true"/"1" enables the TLS relay path)
impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse_or("SMTP_PORT", 1025)?,
            from_email: env_or_default("SMTP_FROM_EMAIL", "noreply@localhost"),
            from_name: env_or_default("SMTP_FROM_NAME", "Courier"),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// SMTP transport.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        let transport = Self::build_transport(&config)?;
        Ok(Self { transport, config })
    }

    fn build_transport(
        config: &SmtpConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Permanent(format!("SMTP relay setup: {}", e)))?
                .port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.timeout(Some(SEND_TIMEOUT)).build())
    }

    fn build_message(&self, delivery: &OutboundDelivery) -> Result<Message, TransportError> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| TransportError::Permanent(format!("Invalid from address: {}", e)))?;

        let to: Mailbox = delivery
            .recipient
            .parse()
            .map_err(|e| TransportError::Permanent(format!("Invalid recipient: {}", e)))?;

        let subject = delivery
            .content
            .get("subject")
            .cloned()
            .unwrap_or_else(|| "Notification".to_string());
        let body = delivery.content.get("body").cloned().unwrap_or_default();

        let builder = Message::builder().from(from).to(to).subject(subject);

        let message = match delivery.content.get("html") {
            Some(html) => builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(body),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(html.clone()),
                        ),
                )
                .map_err(|e| TransportError::Permanent(format!("Message build failed: {}", e)))?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(body)
                .map_err(|e| TransportError::Permanent(format!("Message build failed: {}", e)))?,
        };

        Ok(message)
    }
}

#[async_trait]
impl NotificationTransport for SmtpTransport {
    async fn send(&self, delivery: &OutboundDelivery) -> Result<(), TransportError> {
        debug!(
            to = %delivery.recipient,
            trace_id = %delivery.trace_id,
            host = %self.config.host,
            "Sending email via SMTP"
        );

        let message = self.build_message(delivery)?;

        let result = tokio::time::timeout(SEND_TIMEOUT, self.transport.send(message)).await;

        match result {
            Ok(Ok(_)) => {
                info!(to = %delivery.recipient, trace_id = %delivery.trace_id, "Email sent");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(to = %delivery.recipient, error = %e, "SMTP send failed");
                if e.is_permanent() {
                    Err(TransportError::Permanent(format!("SMTP: {}", e)))
                } else {
                    Err(TransportError::Transient(format!("SMTP: {}", e)))
                }
            }
            Err(_) => Err(TransportError::Transient(format!(
                "SMTP send timed out after {} s",
                SEND_TIMEOUT.as_secs()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    fn resource(&self) -> &'static str {
        "smtp"
    }

    fn channel(&self) -> NotificationType {
        NotificationType::Email
    }
}
