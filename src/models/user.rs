//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    /// Set once the emailed verification code has been confirmed
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, unverified, non-admin user.
    ///
    /// The password must already be hashed with
    /// `services::password::hash_secret()`.
    pub fn new(name: String, email: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: 0, // Will be set by the database
            name,
            email,
            password_hash,
            is_admin: false,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    #[cfg(test)]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn has_verified_email(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// Admins may moderate anyone's content, others only their own
    pub fn can_moderate(&self, author_id: i64) -> bool {
        self.is_admin || self.id == author_id
    }
}

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}
