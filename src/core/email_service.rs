use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use std::str::FromStr;

use crate::core::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("failed to deliver message: {0}")]
    Transport(String),
    #[error("notifications are not configured")]
    NotConfigured,
}

/// Outgoing notifications triggered by sync runs.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

pub struct EmailService {
    smtp_config: SmtpConfig,
}

impl EmailService {
    pub fn new(smtp_config: SmtpConfig) -> Self {
        Self { smtp_config }
    }

    fn create_smtp_transport(
        &self,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
        let credentials = Credentials::new(
            self.smtp_config.username.clone(),
            self.smtp_config.password.expose_secret().clone(),
        );

        // Mailtrap style relays on 2525 speak STARTTLS
        let relay = if self.smtp_config.port == 2525 {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp_config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_config.host)
        };
        let builder = relay.map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(builder
            .port(self.smtp_config.port)
            .credentials(credentials)
            .build())
    }
}

#[async_trait]
impl NotificationSender for EmailService {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        let from_mailbox = Mailbox::from_str(&format!(
            "{} <{}>",
            self.smtp_config.from_name, self.smtp_config.from_email
        ))
        .map_err(|_| NotificationError::InvalidAddress(self.smtp_config.from_email.clone()))?;

        let mut builder = Message::builder().from(from_mailbox).subject(subject);
        for recipient in recipients {
            let to_mailbox = Mailbox::from_str(recipient)
                .map_err(|_| NotificationError::InvalidAddress(recipient.clone()))?;
            builder = builder.to(to_mailbox);
        }

        let email = builder
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotificationError::Build(e.to_string()))?;

        let mailer = self.create_smtp_transport()?;

        match mailer.send(email).await {
            Ok(_) => {
                tracing::info!("notification sent to {} recipient(s)", recipients.len());
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to send notification: {}", e);
                Err(NotificationError::Transport(e.to_string()))
            }
        }
    }
}

/// Used when no SMTP relay is configured.
pub struct DisabledNotifier;

#[async_trait]
impl NotificationSender for DisabledNotifier {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        tracing::warn!(
            recipients = recipients.len(),
            subject,
            "smtp is not configured, dropping notification"
        );
        Err(NotificationError::NotConfigured)
    }
}
