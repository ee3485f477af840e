//! Threat-alert notification dispatch.
//!
//! Alerts flow through a bounded background queue: enqueueing never blocks
//! the caller, and delivery outcomes surface only to logs. A full queue
//! drops the alert (with a warning) rather than stalling telemetry; a
//! missing SMTP configuration logs the alert instead of sending it.

use askama::Template;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::sync::mpsc;

use ridgeline_core::Email;

use crate::config::EmailConfig;

/// Queue capacity. Sized for alert bursts, not sustained throughput; a
/// hostile burst past this point is already visible in the audit log.
const QUEUE_CAPACITY: usize = 64;

/// A threat alert to dispatch.
#[derive(Debug, Clone)]
pub struct ThreatAlert {
    /// Threat kind string (`honeypot_access`, `bot_activity`, ...).
    pub threat_type: String,
    /// Source IP at detection time.
    pub ip: String,
    /// Source country at detection time.
    pub location: String,
    /// Path the threat was observed on.
    pub path: String,
    /// Where to send the alert.
    pub recipient: Email,
}

/// HTML template for the threat-alert email.
#[derive(Template)]
#[template(path = "email/threat_alert.html")]
struct ThreatAlertHtml<'a> {
    threat_type: &'a str,
    ip: &'a str,
    location: &'a str,
    path: &'a str,
    timestamp: &'a str,
}

/// Plain text template for the threat-alert email.
#[derive(Template)]
#[template(path = "email/threat_alert.txt")]
struct ThreatAlertText<'a> {
    threat_type: &'a str,
    ip: &'a str,
    location: &'a str,
    path: &'a str,
    timestamp: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build the email message.
    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

/// SMTP-backed transactional email delivery.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create an email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a threat alert.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering, message construction, or SMTP
    /// delivery fails.
    pub async fn send_threat_alert(&self, alert: &ThreatAlert) -> Result<(), EmailError> {
        let timestamp = Utc::now().to_rfc3339();
        let html = ThreatAlertHtml {
            threat_type: &alert.threat_type,
            ip: &alert.ip,
            location: &alert.location,
            path: &alert.path,
            timestamp: &timestamp,
        }
        .render()?;
        let text = ThreatAlertText {
            threat_type: &alert.threat_type,
            ip: &alert.ip,
            location: &alert.location,
            path: &alert.path,
            timestamp: &timestamp,
        }
        .render()?;

        let subject = format!(
            "Security threat detected: {}",
            alert.threat_type.to_uppercase()
        );

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(alert
                .recipient
                .as_str()
                .parse()
                .map_err(|_| EmailError::InvalidAddress(alert.recipient.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

/// Handle to the background notification queue.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<ThreatAlert>,
}

impl Notifier {
    /// Spawn the delivery worker and return the enqueue handle.
    ///
    /// The worker is detached: it drains the queue independently of any
    /// request or view lifetime, which is exactly the fire-and-forget
    /// contract alerts need.
    #[must_use]
    pub fn spawn(mailer: Option<EmailService>) -> Self {
        let (tx, mut rx) = mpsc::channel::<ThreatAlert>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                match &mailer {
                    Some(service) => {
                        if let Err(e) = service.send_threat_alert(&alert).await {
                            tracing::warn!(
                                threat_type = %alert.threat_type,
                                error = %e,
                                "threat alert delivery failed"
                            );
                        } else {
                            tracing::info!(
                                threat_type = %alert.threat_type,
                                recipient = %alert.recipient,
                                "threat alert sent"
                            );
                        }
                    }
                    None => {
                        tracing::info!(
                            threat_type = %alert.threat_type,
                            ip = %alert.ip,
                            path = %alert.path,
                            "SMTP not configured; threat alert logged only"
                        );
                    }
                }
            }
        });

        Self { tx }
    }

    /// Enqueue an alert without blocking.
    ///
    /// A full or closed queue drops the alert with a warning; event
    /// persistence has already happened by the time this is called.
    pub fn enqueue(&self, alert: ThreatAlert) {
        if let Err(e) = self.tx.try_send(alert) {
            tracing::warn!(error = %e, "threat alert dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn alert() -> ThreatAlert {
        ThreatAlert {
            threat_type: "honeypot_access".to_string(),
            ip: "203.0.113.9".to_string(),
            location: "Unknown".to_string(),
            path: "/wp-admin".to_string(),
            recipient: Email::parse("sec@ridgeline-hq.dev").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_never_blocks_when_full() {
        let notifier = Notifier::spawn(None);

        // Far more than the queue holds; every call must return promptly.
        for _ in 0..(QUEUE_CAPACITY * 4) {
            notifier.enqueue(alert());
        }
    }

    #[tokio::test]
    async fn test_worker_drains_without_mailer() {
        let notifier = Notifier::spawn(None);
        notifier.enqueue(alert());

        // Give the worker a tick to log-and-drop; nothing to assert beyond
        // "no panic", the outcome is logging only.
        tokio::task::yield_now().await;
    }
}
