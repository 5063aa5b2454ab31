//! Email verification code repository
//!
//! One live row per user: `user_id` is unique, and a new code replaces the
//! previous one inside a single transaction.
//! The attempt counter is bumped by a single `UPDATE` and re-read inside the
//! same transaction, so every verification call observes its own increment.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{EmailVerificationCode, NewVerificationCode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Verification code repository trait
#[async_trait]
pub trait VerificationCodeRepository: Send + Sync {
    /// Remove every code of a user, returning the number of rows deleted
    async fn delete_for_user(&self, user_id: i64) -> Result<u64>;

    async fn create(&self, code: &NewVerificationCode) -> Result<EmailVerificationCode>;

    /// Delete the user's code and store `code` in one transaction. Returns the
    /// new row and the number of rows it replaced.
    async fn replace_for_user(
        &self,
        code: &NewVerificationCode,
    ) -> Result<(EmailVerificationCode, u64)>;

    /// Most recent code of a user
    async fn get_for_user(&self, user_id: i64) -> Result<Option<EmailVerificationCode>>;

    /// Increment the attempt counter and return the row as it is afterwards
    async fn record_attempt(&self, user_id: i64) -> Result<Option<EmailVerificationCode>>;
}

/// SQLx-based verification code repository (SQLite and MySQL)
pub struct SqlxVerificationCodeRepository {
    pool: DynDatabasePool,
}

impl SqlxVerificationCodeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VerificationCodeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VerificationCodeRepository for SqlxVerificationCodeRepository {
    async fn delete_for_user(&self, user_id: i64) -> Result<u64> {
        let result = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(DELETE_FOR_USER)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete verification codes")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(DELETE_FOR_USER)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete verification codes")?
                .rows_affected(),
        };
        Ok(result)
    }

    async fn create(&self, code: &NewVerificationCode) -> Result<EmailVerificationCode> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
                insert_code_sqlite(&mut *conn, code).await
            }
            Backend::Mysql(pool) => {
                let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
                insert_code_mysql(&mut *conn, code).await
            }
        }
    }

    async fn replace_for_user(
        &self,
        code: &NewVerificationCode,
    ) -> Result<(EmailVerificationCode, u64)> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => replace_code_sqlite(pool, code).await,
            Backend::Mysql(pool) => replace_code_mysql(pool, code).await,
        }
    }

    async fn get_for_user(&self, user_id: i64) -> Result<Option<EmailVerificationCode>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_code_sqlite(pool, user_id).await,
            Backend::Mysql(pool) => get_code_mysql(pool, user_id).await,
        }
    }

    async fn record_attempt(&self, user_id: i64) -> Result<Option<EmailVerificationCode>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => record_attempt_sqlite(pool, user_id).await,
            Backend::Mysql(pool) => record_attempt_mysql(pool, user_id).await,
        }
    }
}

const DELETE_FOR_USER: &str = "DELETE FROM email_verification_codes WHERE user_id = ?";

const INCREMENT_ATTEMPTS: &str =
    "UPDATE email_verification_codes SET attempts = attempts + 1 WHERE user_id = ?";

const SELECT_LATEST: &str = r#"
    SELECT id, user_id, code, expires_at, attempts, created_at
    FROM email_verification_codes
    WHERE user_id = ?
    ORDER BY id DESC
    LIMIT 1
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_code_sqlite(
    conn: &mut SqliteConnection,
    code: &NewVerificationCode,
) -> Result<EmailVerificationCode> {
    let result = sqlx::query(
        r#"
        INSERT INTO email_verification_codes (user_id, code, expires_at, attempts, created_at)
        VALUES (?, ?, ?, 0, ?)
        "#,
    )
    .bind(code.user_id)
    .bind(&code.code_hash)
    .bind(code.expires_at)
    .bind(code.created_at)
    .execute(&mut *conn)
    .await
    .context("Failed to create verification code")?;

    Ok(EmailVerificationCode {
        id: result.last_insert_rowid(),
        user_id: code.user_id,
        code: code.code_hash.clone(),
        expires_at: code.expires_at,
        attempts: 0,
        created_at: code.created_at,
    })
}

async fn replace_code_sqlite(
    pool: &SqlitePool,
    code: &NewVerificationCode,
) -> Result<(EmailVerificationCode, u64)> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let replaced = sqlx::query(DELETE_FOR_USER)
        .bind(code.user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete previous verification code")?
        .rows_affected();
    let created = insert_code_sqlite(&mut *tx, code).await?;

    tx.commit().await.context("Failed to commit verification code")?;

    Ok((created, replaced))
}

async fn get_code_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Option<EmailVerificationCode>> {
    let row = sqlx::query(SELECT_LATEST)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get verification code")?;

    Ok(row.map(|row| row_to_code_sqlite(&row)))
}

async fn record_attempt_sqlite(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<EmailVerificationCode>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(INCREMENT_ATTEMPTS)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment verification attempts")?
        .rows_affected();

    if updated == 0 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(None);
    }

    let row = sqlx::query(SELECT_LATEST)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to re-read verification code")?;

    tx.commit().await.context("Failed to commit attempt")?;

    Ok(row.map(|row| row_to_code_sqlite(&row)))
}

fn row_to_code_sqlite(row: &sqlx::sqlite::SqliteRow) -> EmailVerificationCode {
    EmailVerificationCode {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code: row.get("code"),
        expires_at: row.get("expires_at"),
        attempts: row.get("attempts"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_code_mysql(
    conn: &mut MySqlConnection,
    code: &NewVerificationCode,
) -> Result<EmailVerificationCode> {
    let result = sqlx::query(
        r#"
        INSERT INTO email_verification_codes (user_id, code, expires_at, attempts, created_at)
        VALUES (?, ?, ?, 0, ?)
        "#,
    )
    .bind(code.user_id)
    .bind(&code.code_hash)
    .bind(code.expires_at)
    .bind(code.created_at)
    .execute(&mut *conn)
    .await
    .context("Failed to create verification code")?;

    Ok(EmailVerificationCode {
        id: result.last_insert_id() as i64,
        user_id: code.user_id,
        code: code.code_hash.clone(),
        expires_at: code.expires_at,
        attempts: 0,
        created_at: code.created_at,
    })
}

async fn replace_code_mysql(
    pool: &MySqlPool,
    code: &NewVerificationCode,
) -> Result<(EmailVerificationCode, u64)> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let replaced = sqlx::query(DELETE_FOR_USER)
        .bind(code.user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete previous verification code")?
        .rows_affected();
    let created = insert_code_mysql(&mut *tx, code).await?;

    tx.commit().await.context("Failed to commit verification code")?;

    Ok((created, replaced))
}

async fn get_code_mysql(pool: &MySqlPool, user_id: i64) -> Result<Option<EmailVerificationCode>> {
    let row = sqlx::query(SELECT_LATEST)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get verification code")?;

    Ok(row.map(|row| row_to_code_mysql(&row)))
}

async fn record_attempt_mysql(
    pool: &MySqlPool,
    user_id: i64,
) -> Result<Option<EmailVerificationCode>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(INCREMENT_ATTEMPTS)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment verification attempts")?
        .rows_affected();

    if updated == 0 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(None);
    }

    let row = sqlx::query(SELECT_LATEST)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to re-read verification code")?;

    tx.commit().await.context("Failed to commit attempt")?;

    Ok(row.map(|row| row_to_code_mysql(&row)))
}

fn row_to_code_mysql(row: &sqlx::mysql::MySqlRow) -> EmailVerificationCode {
    EmailVerificationCode {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code: row.get("code"),
        expires_at: row.get("expires_at"),
        attempts: row.get("attempts"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::{Duration, TimeZone, Utc};

    async fn setup_test_repo() -> (SqlxVerificationCodeRepository, i64) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new(
                "Camille".into(),
                "camille@example.fr".into(),
                "hash".into(),
                Utc::now(),
            ))
            .await
            .expect("Failed to create user");

        (SqlxVerificationCodeRepository::new(pool), user.id)
    }

    fn issued_at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, user_id) = setup_test_repo().await;

        let created = repo
            .create(&NewVerificationCode::new(user_id, "hash-1".into(), issued_at()))
            .await
            .expect("Failed to create code");

        let found = repo
            .get_for_user(user_id)
            .await
            .unwrap()
            .expect("Code not found");
        assert_eq!(found.id, created.id);
        assert_eq!(found.attempts, 0);
        assert_eq!(found.expires_at, issued_at() + Duration::minutes(15));
        assert_eq!(found.created_at, issued_at());
    }

    #[tokio::test]
    async fn test_delete_for_user() {
        let (repo, user_id) = setup_test_repo().await;
        repo.create(&NewVerificationCode::new(user_id, "hash".into(), issued_at()))
            .await
            .unwrap();

        assert_eq!(repo.delete_for_user(user_id).await.unwrap(), 1);
        assert!(repo.get_for_user(user_id).await.unwrap().is_none());
        assert_eq!(repo.delete_for_user(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_keeps_a_single_row() {
        let (repo, user_id) = setup_test_repo().await;

        let (first, replaced) = repo
            .replace_for_user(&NewVerificationCode::new(user_id, "hash-1".into(), issued_at()))
            .await
            .unwrap();
        assert_eq!(replaced, 0);

        let (second, replaced) = repo
            .replace_for_user(&NewVerificationCode::new(user_id, "hash-2".into(), issued_at()))
            .await
            .unwrap();
        assert_eq!(replaced, 1);
        assert_ne!(first.id, second.id);

        assert_eq!(repo.get_for_user(user_id).await.unwrap().unwrap().code, "hash-2");
        assert_eq!(repo.delete_for_user(user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_live_code_is_rejected() {
        let (repo, user_id) = setup_test_repo().await;
        repo.create(&NewVerificationCode::new(user_id, "hash-1".into(), issued_at()))
            .await
            .unwrap();

        let duplicate = repo
            .create(&NewVerificationCode::new(user_id, "hash-2".into(), issued_at()))
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_record_attempt_returns_incremented_row() {
        let (repo, user_id) = setup_test_repo().await;
        repo.create(&NewVerificationCode::new(user_id, "hash".into(), issued_at()))
            .await
            .unwrap();

        let first = repo.record_attempt(user_id).await.unwrap().unwrap();
        let second = repo.record_attempt(user_id).await.unwrap().unwrap();

        assert_eq!(first.attempts, 1);
        assert_eq!(second.attempts, 2);
    }

    #[tokio::test]
    async fn test_record_attempt_without_code() {
        let (repo, user_id) = setup_test_repo().await;
        assert!(repo.record_attempt(user_id).await.unwrap().is_none());
    }
}
