//! Email verification codes
//!
//! A registered user proves ownership of their address with a six-digit code
//! sent by email:
//! - `issue` replaces any previous code and hands the new one to the notifier
//! - `verify` counts every call as an attempt, then checks expiry, the attempt
//!   budget and the code itself, in that order
//! - `resend` re-issues once the current code is a minute old
//!
//! Only the Argon2 hash of a code is stored.

use crate::clock::DynClock;
use crate::db::repositories::{UserRepository, VerificationCodeRepository};
use crate::models::{EmailVerificationCode, NewVerificationCode, User, CODE_LENGTH};
use crate::services::mailer::{DynNotifier, VerificationMessage};
use crate::services::password::{hash_secret, verify_secret};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use std::sync::Arc;

/// User-facing messages
pub mod messages {
    pub const CODE_SENT: &str = "Un code de vérification a été envoyé à votre adresse email.";
    pub const CODE_INVALID: &str = "Le code de vérification est invalide.";
    pub const CODE_EXPIRED: &str = "Le code a expiré. Veuillez en demander un nouveau.";
    pub const TOO_MANY_ATTEMPTS: &str = "Trop de tentatives. Veuillez demander un nouveau code.";
    pub const VERIFIED: &str = "Votre adresse email a été vérifiée avec succès.";
    pub const RESENT: &str = "Un nouveau code de vérification a été envoyé.";
    pub const RESEND_COOLDOWN: &str = "Veuillez patienter avant de demander un nouveau code.";
    pub const ALREADY_VERIFIED: &str = "Votre adresse email est déjà vérifiée.";
}

/// Why a verification or resend was refused
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{}", messages::CODE_INVALID)]
    CodeInvalid,

    #[error("{}", messages::CODE_EXPIRED)]
    CodeExpired,

    #[error("{}", messages::TOO_MANY_ATTEMPTS)]
    TooManyAttempts,

    #[error("{}", messages::RESEND_COOLDOWN)]
    ResendCooldown,

    #[error("{}", messages::ALREADY_VERIFIED)]
    AlreadyVerified,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl VerificationError {
    /// Stable machine-readable reason
    pub fn key(&self) -> &'static str {
        match self {
            VerificationError::CodeInvalid => "code_invalid",
            VerificationError::CodeExpired => "code_expired",
            VerificationError::TooManyAttempts => "too_many_attempts",
            VerificationError::ResendCooldown => "resend_cooldown",
            VerificationError::AlreadyVerified => "already_verified",
            VerificationError::InternalError(_) => "internal_error",
        }
    }

    /// French message shown to the user
    pub fn message(&self) -> &'static str {
        match self {
            VerificationError::CodeInvalid => messages::CODE_INVALID,
            VerificationError::CodeExpired => messages::CODE_EXPIRED,
            VerificationError::TooManyAttempts => messages::TOO_MANY_ATTEMPTS,
            VerificationError::ResendCooldown => messages::RESEND_COOLDOWN,
            VerificationError::AlreadyVerified => messages::ALREADY_VERIFIED,
            VerificationError::InternalError(_) => "Une erreur interne est survenue.",
        }
    }
}

/// Draw a code of [`CODE_LENGTH`] independent, uniform decimal digits.
///
/// Bytes of 250 and above are rejected so that `byte % 10` stays unbiased.
pub fn generate_verification_code() -> String {
    let mut code = String::with_capacity(CODE_LENGTH);
    let mut buf = [0u8; 16];

    while code.len() < CODE_LENGTH {
        OsRng.fill_bytes(&mut buf);
        for byte in buf {
            if byte < 250 && code.len() < CODE_LENGTH {
                code.push(char::from(b'0' + byte % 10));
            }
        }
    }
    code
}

/// Issues, checks and re-issues verification codes
pub struct VerificationService {
    codes: Arc<dyn VerificationCodeRepository>,
    users: Arc<dyn UserRepository>,
    notifier: DynNotifier,
    clock: DynClock,
    site_name: String,
}

impl VerificationService {
    pub fn new(
        codes: Arc<dyn VerificationCodeRepository>,
        users: Arc<dyn UserRepository>,
        notifier: DynNotifier,
        clock: DynClock,
    ) -> Self {
        Self {
            codes,
            users,
            notifier,
            clock,
            site_name: "Carnet".to_string(),
        }
    }

    /// Site name used in the email signature
    pub fn with_site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    /// Replace the user's code with a fresh one and send it.
    ///
    /// A delivery failure is logged; the stored code stays valid.
    pub async fn issue(&self, user: &User) -> Result<(), VerificationError> {
        let now = self.clock.now();

        let code = generate_verification_code();
        let hash = hash_secret(&code)?;
        let (_, replaced) = self
            .codes
            .replace_for_user(&NewVerificationCode::new(user.id, hash, now))
            .await?;

        tracing::info!(user_id = user.id, replaced, "Verification code issued");

        let message = VerificationMessage::new(&code, &self.site_name);
        if let Err(e) = self.notifier.send_verification_code(user, &message).await {
            tracing::warn!(user_id = user.id, "Failed to send verification code: {:#}", e);
        }

        Ok(())
    }

    /// Check a submitted code. On success the user is marked verified and the
    /// code is deleted.
    pub async fn verify(&self, user: &User, code: &str) -> Result<(), VerificationError> {
        if user.has_verified_email() {
            return Err(VerificationError::AlreadyVerified);
        }

        let code = code.trim();
        if code.chars().count() != CODE_LENGTH {
            return Err(VerificationError::CodeInvalid);
        }

        let now = self.clock.now();

        // The counter moves before anything else is looked at, expired codes
        // included.
        let stored = self
            .codes
            .record_attempt(user.id)
            .await?
            .ok_or(VerificationError::CodeInvalid)?;

        if stored.is_expired(now) {
            tracing::debug!(user_id = user.id, attempts = stored.attempts, "Expired code submitted");
            return Err(VerificationError::CodeExpired);
        }

        if stored.has_exceeded_attempts() {
            tracing::debug!(user_id = user.id, attempts = stored.attempts, "Attempt budget exhausted");
            return Err(VerificationError::TooManyAttempts);
        }

        if !verify_secret(code, &stored.code)? {
            return Err(VerificationError::CodeInvalid);
        }

        self.users.mark_email_verified(user.id, now).await?;
        self.codes.delete_for_user(user.id).await?;

        tracing::info!(user_id = user.id, "Email address verified");
        Ok(())
    }

    /// Whether a new code may be requested now
    pub async fn can_resend(&self, user: &User) -> Result<bool, VerificationError> {
        let now = self.clock.now();
        Ok(match self.codes.get_for_user(user.id).await? {
            Some(code) => !code.in_cooldown(now),
            None => true,
        })
    }

    /// Issue a new code unless the current one is still in its cooldown
    pub async fn resend(&self, user: &User) -> Result<(), VerificationError> {
        if user.has_verified_email() {
            return Err(VerificationError::AlreadyVerified);
        }

        if !self.can_resend(user).await? {
            return Err(VerificationError::ResendCooldown);
        }

        self.issue(user).await
    }

    pub async fn code_for_user(
        &self,
        user: &User,
    ) -> Result<Option<EmailVerificationCode>, VerificationError> {
        Ok(self.codes.get_for_user(user.id).await?)
    }
}
