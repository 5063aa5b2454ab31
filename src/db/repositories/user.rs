//! User repository
//!
//! Database operations for user accounts.

use crate::db::{Backend, DynDatabasePool};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, returning it with its ID
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn exists_by_email(&self, email: &str) -> Result<bool>;

    /// Stamp the email as verified
    async fn mark_email_verified(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository (SQLite and MySQL)
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_user_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_by_email_sqlite(pool, &email).await,
            Backend::Mysql(pool) => get_user_by_email_mysql(pool, &email).await,
        }
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.get_by_email(email).await?.is_some())
    }

    async fn mark_email_verified(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET email_verified_at = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to mark email as verified")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to mark email as verified")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .get("count"),
        };
        Ok(count)
    }
}

/// Emails are stored and matched in lowercase
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let email = normalize_email(&user.email);
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, is_admin, email_verified_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&email)
    .bind(&user.password_hash)
    .bind(user.is_admin)
    .bind(user.email_verified_at)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        email,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, email, password_hash, is_admin, email_verified_at, created_at, updated_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    Ok(row.map(|row| row_to_user_sqlite(&row)))
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, email, password_hash, is_admin, email_verified_at, created_at, updated_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    Ok(row.map(|row| row_to_user_sqlite(&row)))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_admin: row.get("is_admin"),
        email_verified_at: row.get("email_verified_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let email = normalize_email(&user.email);
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, is_admin, email_verified_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&email)
    .bind(&user.password_hash)
    .bind(user.is_admin)
    .bind(user.email_verified_at)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        email,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, email, password_hash, is_admin, email_verified_at, created_at, updated_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    Ok(row.map(|row| row_to_user_mysql(&row)))
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, email, password_hash, is_admin, email_verified_at, created_at, updated_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    Ok(row.map(|row| row_to_user_mysql(&row)))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_admin: row.get("is_admin"),
        email_verified_at: row.get("email_verified_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn new_user(email: &str) -> User {
        User::new("Camille".into(), email.into(), "hash".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&new_user("Camille@Example.fr"))
            .await
            .expect("Failed to create user");
        assert!(created.id > 0);
        assert_eq!(created.email, "camille@example.fr");

        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");
        assert_eq!(found.name, "Camille");
        assert!(!found.is_admin);
        assert!(found.email_verified_at.is_none());
    }

    #[tokio::test]
    async fn test_get_by_email_is_case_insensitive() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&new_user("camille@example.fr")).await.unwrap();

        assert!(repo.get_by_email("CAMILLE@example.fr").await.unwrap().is_some());
        assert!(repo.exists_by_email(" camille@example.fr ").await.unwrap());
        assert!(!repo.exists_by_email("autre@example.fr").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&new_user("camille@example.fr")).await.unwrap();

        assert!(repo.create(&new_user("camille@example.fr")).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_email_verified() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo.create(&new_user("camille@example.fr")).await.unwrap();

        let at = Utc::now();
        repo.mark_email_verified(user.id, at).await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(found.has_verified_email());
    }

    #[tokio::test]
    async fn test_count() {
        let (_pool, repo) = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        repo.create(&new_user("a@example.fr")).await.unwrap();
        repo.create(&new_user("b@example.fr")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
