//! User service
//!
//! Registration creates an unverified account and immediately issues an
//! email verification code. The first account ever registered is an
//! administrator.

use crate::clock::DynClock;
use crate::db::repositories::{normalize_email, UserRepository};
use crate::models::{RegisterInput, User};
use crate::services::password::hash_secret;
use crate::services::verification::VerificationService;
use serde::Serialize;
use std::sync::Arc;

const NAME_MAX_LENGTH: usize = 255;
const EMAIL_MAX_LENGTH: usize = 255;
const PASSWORD_MIN_LENGTH: usize = 8;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid input, with the French message to show
    #[error("{0}")]
    ValidationError(String),

    #[error("Cette adresse email est déjà utilisée.")]
    UserExists,

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Outcome of a registration
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    /// The account stays gated until its email code is verified
    pub requires_verification: bool,
}

/// User service
pub struct UserService {
    users: Arc<dyn UserRepository>,
    verification: Arc<VerificationService>,
    clock: DynClock,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        verification: Arc<VerificationService>,
        clock: DynClock,
    ) -> Self {
        Self {
            users,
            verification,
            clock,
        }
    }

    /// Register a new account and send its verification code
    pub async fn register(&self, input: RegisterInput) -> Result<Registration, UserServiceError> {
        validate_registration(&input)?;

        let email = normalize_email(&input.email);
        if self.users.exists_by_email(&email).await? {
            return Err(UserServiceError::UserExists);
        }

        let is_first = self.users.count().await? == 0;
        let password_hash = hash_secret(&input.password)?;

        let user = self
            .users
            .create(
                &User::new(input.name.trim().to_string(), email, password_hash, self.clock.now())
                    .with_admin(is_first),
            )
            .await?;

        tracing::info!(user_id = user.id, is_admin = user.is_admin, "User registered");

        self.verification
            .issue(&user)
            .await
            .map_err(|e| UserServiceError::InternalError(anyhow::anyhow!(e)))?;

        Ok(Registration {
            user,
            requires_verification: true,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound)
    }
}

fn validate_registration(input: &RegisterInput) -> Result<(), UserServiceError> {
    let invalid = |message: &str| Err(UserServiceError::ValidationError(message.to_string()));

    let name = input.name.trim();
    if name.is_empty() {
        return invalid("Le nom est obligatoire.");
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return invalid("Le nom ne peut pas dépasser 255 caractères.");
    }

    let email = input.email.trim();
    if email.is_empty() {
        return invalid("L'adresse email est obligatoire.");
    }
    if email.chars().count() > EMAIL_MAX_LENGTH || !looks_like_email(email) {
        return invalid("L'adresse email n'est pas valide.");
    }

    if input.password.chars().count() < PASSWORD_MIN_LENGTH {
        return invalid("Le mot de passe doit contenir au moins 8 caractères.");
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::repositories::{SqlxUserRepository, SqlxVerificationCodeRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::mailer::RecordingNotifier;
    use crate::services::password::verify_secret;
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        service: UserService,
        verification: Arc<VerificationService>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<FixedClock>,
    }

    async fn harness() -> Harness {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let clock = FixedClock::shared(Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let users = SqlxUserRepository::boxed(pool.clone());
        let verification = Arc::new(VerificationService::new(
            SqlxVerificationCodeRepository::boxed(pool),
            users.clone(),
            notifier.clone(),
            clock.clone(),
        ));

        Harness {
            service: UserService::new(users, verification.clone(), clock.clone()),
            verification,
            notifier,
            clock,
        }
    }

    fn input(email: &str) -> RegisterInput {
        RegisterInput::new("Camille", email, "correct horse")
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let h = harness().await;
        let first = h.service.register(input("a@example.fr")).await.unwrap();
        let second = h.service.register(input("b@example.fr")).await.unwrap();

        assert!(first.user.is_admin());
        assert!(!second.user.is_admin());
        assert!(first.requires_verification);
        assert!(!first.user.has_verified_email());
    }

    #[tokio::test]
    async fn test_password_is_hashed() {
        let h = harness().await;
        let registration = h.service.register(input("a@example.fr")).await.unwrap();

        let stored = h.service.get_by_id(registration.user.id).await.unwrap();
        assert_ne!(stored.password_hash, "correct horse");
        assert!(verify_secret("correct horse", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let h = harness().await;
        h.service.register(input("camille@example.fr")).await.unwrap();

        let err = h
            .service
            .register(input(" Camille@Example.FR "))
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::UserExists));
    }

    #[tokio::test]
    async fn test_validation() {
        let h = harness().await;
        for bad in [
            RegisterInput::new(" ", "a@example.fr", "correct horse"),
            RegisterInput::new("Camille", "pas-une-adresse", "correct horse"),
            RegisterInput::new("Camille", "a@example", "correct horse"),
            RegisterInput::new("Camille", "a@example.fr", "court"),
        ] {
            let err = h.service.register(bad).await.unwrap_err();
            assert!(matches!(err, UserServiceError::ValidationError(_)));
        }
    }

    #[tokio::test]
    async fn test_registration_then_first_try_verification() {
        let h = harness().await;
        let registration = h.service.register(input("camille@example.fr")).await.unwrap();

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "camille@example.fr");
        let code = h.notifier.last_code().unwrap();

        h.clock.advance(Duration::minutes(14));
        h.verification
            .verify(&registration.user, &code)
            .await
            .unwrap();

        let user = h.service.get_by_id(registration.user.id).await.unwrap();
        assert!(user.has_verified_email());
        assert!(h.verification.code_for_user(&user).await.unwrap().is_none());
    }

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("camille@example.fr"));
        assert!(!looks_like_email("camille@@example.fr"));
        assert!(!looks_like_email("@example.fr"));
        assert!(!looks_like_email("camille@.fr"));
        assert!(!looks_like_email("ca mille@example.fr"));
    }
}
