use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::config::SmtpConfig;

pub const INTERVIEW_SUBJECT: &str = "Interview Request for Job Application";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{0}'")]
    Address(String),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mail task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

pub fn interview_request_body() -> String {
    "Hello,\n\n\
     You have been invited for an interview for a job you applied for.\n\
     Please log in to your dashboard to view details.\n\n\
     Regards,\n\
     Recruitment Team\n"
        .to_string()
}

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), MailError> {
            let email = Message::builder()
                .from(
                    config
                        .from_email
                        .parse()
                        .map_err(|_| MailError::Address(config.from_email.clone()))?,
                )
                .to(to.parse().map_err(|_| MailError::Address(to.clone()))?)
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body)?;

            let creds = Credentials::new(config.user.clone(), config.password.clone());
            let transport = SmtpTransport::starttls_relay(&config.host)?
                .port(config.port)
                .credentials(creds)
                .build();

            transport.send(&email)?;
            tracing::debug!(to = %to, "mail delivered to relay");
            Ok(())
        })
        .await?
    }
}
