//! Email verification code model

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Digits in a verification code
pub const CODE_LENGTH: usize = 6;
/// Lifetime of a code
pub const EXPIRATION_MINUTES: i64 = 15;
/// Verification attempts allowed per code
pub const MAX_ATTEMPTS: i32 = 5;
/// Minimum age of the live code before a new one may be requested
pub const RESEND_COOLDOWN_SECONDS: i64 = 60;

/// Stored verification code. `code` holds the argon2 hash, never the digits.
#[derive(Debug, Clone, Serialize)]
pub struct EmailVerificationCode {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl EmailVerificationCode {
    /// A code is dead from its expiry instant onwards
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_exceeded_attempts(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }

    pub fn remaining_attempts(&self) -> i32 {
        (MAX_ATTEMPTS - self.attempts).max(0)
    }

    /// Whether a resend is still blocked at `now`
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < Duration::seconds(RESEND_COOLDOWN_SECONDS)
    }
}

/// Row written when a code is issued
#[derive(Debug, Clone)]
pub struct NewVerificationCode {
    pub user_id: i64,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewVerificationCode {
    pub fn new(user_id: i64, code_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            code_hash,
            expires_at: now + Duration::minutes(EXPIRATION_MINUTES),
            created_at: now,
        }
    }
}
