//! Best-effort user notifications
//!
//! Sent on two events: a registration attempt for an address that already has
//! an account, and a successful registration. Delivery failures are reported
//! to the caller, which logs them and carries on; they never fail the
//! credential operation that triggered them.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::MailConfig;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;
use tracing::info;

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid mail address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to deliver message: {0}")]
    Transport(String),
}

/// Side channel invoked by the credential engine
#[async_trait]
pub trait NotificationHook: Send + Sync {
    /// Someone tried to register with an address that already has an account
    async fn notify_existing_email(&self, email: &str) -> Result<(), NotifyError>;

    /// A new account was created
    async fn notify_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError>;
}

/// Rendered plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn existing_email_message(email: &str, base_url: &str) -> MailMessage {
    MailMessage {
        to: email.to_string(),
        subject: "Registration Attempt - keyward".to_string(),
        body: format!(
            "Hello,\n\n\
             Someone attempted to register an account with this email address.\n\n\
             If this was you and you already have an account, you can log in directly.\n\
             If you forgot your password, you can reset it here: {}/reset-password\n\n\
             If this wasn't you, you can safely ignore this email.\n",
            base_url.trim_end_matches('/')
        ),
    }
}

pub fn welcome_message(email: &str, first_name: &str) -> MailMessage {
    MailMessage {
        to: email.to_string(),
        subject: "Welcome to keyward".to_string(),
        body: format!(
            "Hello {first_name},\n\n\
             Your account has been successfully created. You can now log in.\n\n\
             If you have any questions, please contact us.\n"
        ),
    }
}

/// Local dev notifier that logs instead of sending mail
#[derive(Debug, Clone)]
pub struct LogNotifier {
    base_url: String,
}

impl LogNotifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn log(message: &MailMessage) {
        info!(
            to_email = %message.to,
            subject = %message.subject,
            "notification send stub"
        );
    }
}

#[async_trait]
impl NotificationHook for LogNotifier {
    async fn notify_existing_email(&self, email: &str) -> Result<(), NotifyError> {
        Self::log(&existing_email_message(email, &self.base_url));
        Ok(())
    }

    async fn notify_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError> {
        Self::log(&welcome_message(email, first_name));
        Ok(())
    }
}

/// SMTP delivery through lettre
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    base_url: String,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Result<Self, NotifyError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidAddress(format!("MAIL_FROM: {e}")))?;

        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        }
        .map_err(|e| NotifyError::Transport(e.to_string()))?
        .port(config.smtp_port);

        let builder = if let (Some(username), Some(password)) =
            (&config.smtp_username, &config.smtp_password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(Self {
            transport: Arc::new(builder.build()),
            from,
            base_url: config.base_url.clone(),
        })
    }

    async fn send(&self, message: MailMessage) -> Result<(), NotifyError> {
        let to = message
            .to
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidAddress(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN)
            .body(message.body)
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        info!(subject = %message.subject, "notification sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationHook for SmtpNotifier {
    async fn notify_existing_email(&self, email: &str) -> Result<(), NotifyError> {
        self.send(existing_email_message(email, &self.base_url)).await
    }

    async fn notify_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError> {
        self.send(welcome_message(email, first_name)).await
    }
}

/// SMTP when a host is configured, otherwise log only
pub fn notifier_from_config(
    config: &MailConfig,
) -> Result<Arc<dyn NotificationHook>, NotifyError> {
    if config.smtp_host.trim().is_empty() {
        tracing::warn!("SMTP host not configured; notifications will only be logged");
        return Ok(Arc::new(LogNotifier::new(config.base_url.clone())));
    }

    Ok(Arc::new(SmtpNotifier::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_email_message_links_reset_page() {
        let message = existing_email_message("a@x.com", "https://auth.example/");
        assert_eq!(message.to, "a@x.com");
        assert!(message.subject.starts_with("Registration Attempt"));
        assert!(message
            .body
            .contains("https://auth.example/reset-password"));
    }

    #[test]
    fn test_welcome_message_greets_by_first_name() {
        let message = welcome_message("a@x.com", "Ada");
        assert!(message.subject.starts_with("Welcome"));
        assert!(message.body.starts_with("Hello Ada,"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = LogNotifier::new("http://localhost:8080");
        notifier.notify_existing_email("a@x.com").await.unwrap();
        notifier.notify_welcome("a@x.com", "Ada").await.unwrap();
    }

    #[test]
    fn test_empty_host_selects_log_notifier() {
        let config = MailConfig::default();
        assert!(notifier_from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_smtp_notifier_rejects_bad_sender() {
        let config = MailConfig {
            smtp_host: "smtp.example.com".to_string(),
            from: "not an address".to_string(),
            ..MailConfig::default()
        };
        assert!(matches!(
            SmtpNotifier::new(&config),
            Err(NotifyError::InvalidAddress(_))
        ));
    }
}
