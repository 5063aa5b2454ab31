//! Verification code delivery
//!
//! [`VerificationMessage`] holds the French email content; a [`Notifier`]
//! delivers it. `SmtpNotifier` talks SMTP through lettre, `LogNotifier`
//! stands in when mail is disabled.

use crate::config::MailConfig;
use crate::models::{User, EXPIRATION_MINUTES};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// Content of the verification email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMessage {
    pub subject: String,
    pub greeting: String,
    pub intro: String,
    /// Plaintext code, zero padded
    pub code: String,
    pub expiration: String,
    pub ignore: String,
    pub signature: String,
}

impl VerificationMessage {
    pub fn new(code: &str, site_name: &str) -> Self {
        Self {
            subject: "Vérification de votre adresse email".to_string(),
            greeting: "Bonjour !".to_string(),
            intro: "Voici votre code de vérification :".to_string(),
            code: code.to_string(),
            expiration: format!(
                "Ce code expirera dans {} minutes.",
                EXPIRATION_MINUTES
            ),
            ignore: "Si vous n'avez pas créé de compte, aucune action n'est requise.".to_string(),
            signature: format!("L'équipe {}", site_name),
        }
    }

    /// Plain-text body
    pub fn body(&self) -> String {
        format!(
            "{}\n\n{}\n\n{}\n\n{}\n\n{}\n\n{}",
            self.greeting, self.intro, self.code, self.expiration, self.ignore, self.signature
        )
    }
}

/// Out-of-band channel for verification codes
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification_code(&self, user: &User, message: &VerificationMessage)
        -> Result<()>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// SMTP delivery over rustls
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Result<Self> {
        if config.smtp_host.trim().is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }

        let address: Address = config
            .sender_address()
            .parse()
            .with_context(|| format!("Invalid sender address: {}", config.sender_address()))?;
        let from = Mailbox::new(Some(config.from_name.clone()), address);

        // Port 465 is implicit TLS, anything else negotiates STARTTLS.
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .context("Failed to create SMTP transport")?
        .port(config.smtp_port);

        let builder = if config.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_verification_code(
        &self,
        user: &User,
        message: &VerificationMessage,
    ) -> Result<()> {
        let to: Address = user
            .email
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", user.email))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(Some(user.name.clone()), to))
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body())
            .context("Failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        tracing::debug!(user_id = user.id, "Verification email sent");
        Ok(())
    }
}

/// Logs the message instead of sending it
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification_code(
        &self,
        user: &User,
        message: &VerificationMessage,
    ) -> Result<()> {
        tracing::info!(
            user_id = user.id,
            email = %user.email,
            code = %message.code,
            "Mail disabled, verification code not sent"
        );
        Ok(())
    }
}

/// Pick the notifier matching the mail configuration
pub fn create_notifier(config: &MailConfig) -> Result<DynNotifier> {
    if config.enabled {
        Ok(Arc::new(SmtpNotifier::new(config)?))
    } else {
        Ok(Arc::new(LogNotifier))
    }
}

/// Keeps every message it is handed, optionally failing instead
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(String, VerificationMessage)>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Default::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, VerificationMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Code of the most recent message
    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, m)| m.code.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_verification_code(
        &self,
        user: &User,
        message: &VerificationMessage,
    ) -> Result<()> {
        if self.fail {
            return Err(anyhow!("SMTP connection refused"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), message.clone()));
        Ok(())
    }
}
