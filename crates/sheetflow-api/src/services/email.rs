//! Confirmation email delivery.
//!
//! Two transports share one template: the Brevo transactional HTTP API
//! (reqwest) and plain SMTP (lettre). Neither retries internally.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use sheetflow_core::{Config, EmailTransport};

pub const CONFIRMATION_SUBJECT: &str = "Your Spreadsheet Processing Task ID";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Network error while sending email: {0}")]
    Network(String),

    #[error("Email provider returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Email transport not configured: {0}")]
    NotConfigured(String),
}

/// The message sent to a submitter once their upload is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl ConfirmationMessage {
    pub fn new(recipient: &str, filename: &str, task_id: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            subject: CONFIRMATION_SUBJECT.to_string(),
            body: format!(
                "Your file: {} has been uploaded successfully. Your task ID is:\n\n{}\n\n\
                 You can use this ID to check the status of your processing job.",
                filename, task_id
            ),
        }
    }
}

/// Outbound notification seam used by the upload pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_task_email(
        &self,
        recipient: &str,
        filename: &str,
        task_id: &str,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct BrevoAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct BrevoRequest<'a> {
    sender: BrevoAddress<'a>,
    to: Vec<BrevoAddress<'a>>,
    subject: &'a str,
    #[serde(rename = "textContent")]
    text_content: &'a str,
}

impl<'a> BrevoRequest<'a> {
    fn new(sender: &'a str, message: &'a ConfirmationMessage) -> Self {
        Self {
            sender: BrevoAddress { email: sender },
            to: vec![BrevoAddress {
                email: &message.recipient,
            }],
            subject: &message.subject,
            text_content: &message.body,
        }
    }
}

/// Brevo (Sendinblue) transactional email API.
pub struct BrevoNotifier {
    http_client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    sender: String,
}

impl BrevoNotifier {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        sender: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for Brevo")?;

        Ok(Self {
            http_client,
            api_url: api_url.into(),
            api_key,
            sender: sender.into(),
        })
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    #[tracing::instrument(skip(self), fields(transport = "brevo"))]
    async fn send_task_email(
        &self,
        recipient: &str,
        filename: &str,
        task_id: &str,
    ) -> Result<(), DeliveryError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::error!("Brevo API key is missing");
            return Err(DeliveryError::NotConfigured(
                "BREVO_API_KEY is not set".to_string(),
            ));
        };

        let message = ConfirmationMessage::new(recipient, filename, task_id);
        tracing::info!(email = %recipient, task_id = %task_id, "Sending confirmation email");

        let response = self
            .http_client
            .post(&self.api_url)
            .header("api-key", api_key)
            .json(&BrevoRequest::new(&self.sender, &message))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, email = %recipient, "Network error while sending email");
                DeliveryError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %body,
                email = %recipient,
                task_id = %task_id,
                "Brevo API rejected email"
            );
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(email = %recipient, task_id = %task_id, "Confirmation email sent");
        Ok(())
    }
}

/// SMTP delivery through lettre.
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    timeout: Duration,
}

impl SmtpNotifier {
    pub fn from_config(config: &Config) -> Result<Self> {
        let host = config
            .smtp_host
            .as_deref()
            .context("SMTP_HOST must be set when EMAIL_TRANSPORT=smtp")?;
        let credentials = match (config.smtp_user.as_deref(), config.smtp_password.as_deref()) {
            (Some(u), Some(p)) => Some(Credentials::new(u.to_string(), p.to_string())),
            _ => None,
        };

        let builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("Failed to configure SMTP STARTTLS relay")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(config.smtp_port);
        let builder = match credentials {
            Some(c) => builder.credentials(c),
            None => builder,
        };

        tracing::info!(
            host = %host,
            port = config.smtp_port,
            starttls = config.smtp_tls,
            "SMTP notifier initialized"
        );

        Ok(Self {
            mailer: builder.build(),
            from: config.sender_email.clone(),
            timeout: Duration::from_secs(config.email_timeout_secs),
        })
    }

    fn build_message(&self, message: &ConfirmationMessage) -> Result<Message, DeliveryError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| DeliveryError::NotConfigured(format!("Invalid SENDER_EMAIL: {}", e)))?;
        let to: Mailbox = message
            .recipient
            .parse()
            .map_err(|e| DeliveryError::Rejected {
                status: 0,
                body: format!("Invalid recipient: {}", e),
            })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| DeliveryError::NotConfigured(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[tracing::instrument(skip(self), fields(transport = "smtp"))]
    async fn send_task_email(
        &self,
        recipient: &str,
        filename: &str,
        task_id: &str,
    ) -> Result<(), DeliveryError> {
        let message = ConfirmationMessage::new(recipient, filename, task_id);
        let email = self.build_message(&message)?;

        match tokio::time::timeout(self.timeout, self.mailer.send(email)).await {
            Ok(Ok(_)) => {
                tracing::info!(email = %recipient, task_id = %task_id, "Confirmation email sent");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, email = %recipient, "SMTP delivery failed");
                Err(DeliveryError::Network(e.to_string()))
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.timeout.as_secs(),
                    email = %recipient,
                    "SMTP delivery timed out"
                );
                Err(DeliveryError::Network(format!(
                    "SMTP delivery timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

/// Build the notifier selected by `EMAIL_TRANSPORT`.
pub fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match config.email_transport {
        EmailTransport::Brevo => Arc::new(BrevoNotifier::new(
            config.brevo_api_url.clone(),
            config.brevo_api_key.clone(),
            config.sender_email.clone(),
            Duration::from_secs(config.email_timeout_secs),
        )?),
        EmailTransport::Smtp => Arc::new(SmtpNotifier::from_config(config)?),
    };
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_message_template() {
        let message = ConfirmationMessage::new("user@example.com", "data.csv", "abc-123");
        assert_eq!(message.subject, "Your Spreadsheet Processing Task ID");
        assert_eq!(
            message.body,
            "Your file: data.csv has been uploaded successfully. Your task ID is:\n\nabc-123\n\nYou can use this ID to check the status of your processing job."
        );
    }

    #[test]
    fn brevo_request_body_shape() {
        let message = ConfirmationMessage::new("user@example.com", "data.csv", "abc-123");
        let body = serde_json::to_value(BrevoRequest::new("noreply@example.com", &message)).unwrap();
        assert_eq!(body["sender"]["email"], "noreply@example.com");
        assert_eq!(body["to"][0]["email"], "user@example.com");
        assert_eq!(body["subject"], CONFIRMATION_SUBJECT);
        assert!(body["textContent"].as_str().unwrap().contains("abc-123"));
    }

    #[tokio::test]
    async fn brevo_without_key_is_not_configured() {
        let notifier = BrevoNotifier::new(
            "http://127.0.0.1:9/v3/smtp/email",
            None,
            "noreply@example.com",
            Duration::from_secs(1),
        )
        .unwrap();
        let err = notifier
            .send_task_email("user@example.com", "data.csv", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn brevo_unreachable_is_network_error() {
        let notifier = BrevoNotifier::new(
            "http://127.0.0.1:9/v3/smtp/email",
            Some("key".to_string()),
            "noreply@example.com",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = notifier
            .send_task_email("user@example.com", "data.csv", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Network(_)));
    }

    #[test]
    fn smtp_transport_requires_host() {
        let config = Config {
            email_transport: EmailTransport::Smtp,
            smtp_host: None,
            ..Config::default()
        };
        assert!(build_notifier(&config).is_err());
    }
}
