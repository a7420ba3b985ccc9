//! SMTP mail sink
//!
//! Composes multipart envelopes (plain + HTML alternative) with a fixed
//! `From` mailbox and hands them to an SMTP relay over STARTTLS. SMTP here
//! is blocking I/O, so the transmit runs on the worker pool; each send
//! opens its own session and closes it. The sink never retries.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::debug;

use confab_store::SmtpConfig;

/// Mail sink errors
#[derive(Error, Debug)]
pub enum MailError {
    /// Sender or recipient address does not parse
    #[error("invalid address: {0}")]
    Address(String),

    /// Envelope could not be assembled
    #[error("envelope build failed: {0}")]
    Envelope(String),

    /// SMTP-level failure (connect, auth, or transmit)
    #[error("smtp failure: {0}")]
    Smtp(String),

    /// The blocking mail task was cancelled or panicked
    #[error("mail worker failed: {0}")]
    Worker(String),
}

/// The seam the scheduler sends through
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message; errors are terminal for this attempt
    async fn send(
        &self,
        subject: &str,
        recipient: &str,
        plain: &str,
        html: &str,
    ) -> Result<(), MailError>;
}

/// SMTP-backed mailer
pub struct MailSink {
    config: SmtpConfig,
}

impl MailSink {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for MailSink {
    async fn send(
        &self,
        subject: &str,
        recipient: &str,
        plain: &str,
        html: &str,
    ) -> Result<(), MailError> {
        let config = self.config.clone();
        let subject = subject.to_string();
        let recipient = recipient.to_string();
        let plain = plain.to_string();
        let html = html.to_string();

        tokio::task::spawn_blocking(move || {
            send_blocking(&config, &subject, &recipient, &plain, &html)
        })
        .await
        .map_err(|e| MailError::Worker(e.to_string()))?
    }
}

fn send_blocking(
    config: &SmtpConfig,
    subject: &str,
    recipient: &str,
    plain: &str,
    html: &str,
) -> Result<(), MailError> {
    let message = build_envelope(config, subject, recipient, plain, html)?;

    let transport = SmtpTransport::starttls_relay(&config.host)
        .map_err(|e| MailError::Smtp(e.to_string()))?
        .port(config.port)
        .credentials(Credentials::new(
            config.username.clone(),
            config.password.clone(),
        ))
        .build();

    let response = transport
        .send(&message)
        .map_err(|e| MailError::Smtp(e.to_string()))?;
    debug!(code = %response.code(), to = recipient, "smtp accepted message");
    Ok(())
}

/// Assemble the multipart envelope with the configured `From` mailbox
fn build_envelope(
    config: &SmtpConfig,
    subject: &str,
    recipient: &str,
    plain: &str,
    html: &str,
) -> Result<Message, MailError> {
    let from = Mailbox::new(
        Some(config.from_name.clone()),
        config
            .from_addr
            .parse()
            .map_err(|e| MailError::Address(format!("from address: {}", e)))?,
    );
    let to: Mailbox = recipient
        .parse()
        .map_err(|e| MailError::Address(format!("recipient: {}", e)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(
            plain.to_string(),
            html.to_string(),
        ))
        .map_err(|e| MailError::Envelope(e.to_string()))
}
