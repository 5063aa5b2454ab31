//! Comment repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Comment, CommentWithMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert a comment, returning it with its ID
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Replace the body and bump `updated_at`
    async fn update_content(&self, id: i64, content: &str, at: DateTime<Utc>) -> Result<Comment>;

    /// Delete a comment. Replies go with it through the foreign key.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Every comment of a post with its author, flat and oldest first
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>>;

    async fn count_for_post(&self, post_id: i64) -> Result<i64>;
}

/// SQLx-based comment repository (SQLite and MySQL)
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let id = match self.pool.backend()? {
            Backend::Sqlite(pool) => create_comment_sqlite(pool, comment).await?,
            Backend::Mysql(pool) => create_comment_mysql(pool, comment).await?,
        };
        Ok(Comment {
            id,
            ..comment.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let row = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(SELECT_COMMENT)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment_sqlite(&row)),
            Backend::Mysql(pool) => sqlx::query(SELECT_COMMENT)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment_mysql(&row)),
        };
        Ok(row)
    }

    async fn update_content(&self, id: i64, content: &str, at: DateTime<Utc>) -> Result<Comment> {
        let sql = "UPDATE comments SET content = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(content)
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update comment")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(content)
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update comment")?;
            }
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Comment not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_for_post_sqlite(pool, post_id).await,
            Backend::Mysql(pool) => list_for_post_mysql(pool, post_id).await,
        }
    }

    async fn count_for_post(&self, post_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM comments WHERE post_id = ?";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(post_id)
                .fetch_one(pool)
                .await
                .context("Failed to count comments")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(post_id)
                .fetch_one(pool)
                .await
                .context("Failed to count comments")?
                .get("count"),
        };
        Ok(count)
    }
}

const SELECT_COMMENT: &str = r#"
    SELECT id, post_id, user_id, parent_id, content, created_at, updated_at
    FROM comments
    WHERE id = ?
"#;

const SELECT_FOR_POST: &str = r#"
    SELECT c.id, c.post_id, c.user_id, c.parent_id, c.content, c.created_at, c.updated_at,
           u.name AS author_name, u.email AS author_email
    FROM comments c
    INNER JOIN users u ON u.id = c.user_id
    WHERE c.post_id = ?
    ORDER BY c.created_at, c.id
"#;

const INSERT_COMMENT: &str = r#"
    INSERT INTO comments (post_id, user_id, parent_id, content, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_comment_sqlite(pool: &SqlitePool, comment: &Comment) -> Result<i64> {
    let result = sqlx::query(INSERT_COMMENT)
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(pool)
        .await
        .context("Failed to create comment")?;
    Ok(result.last_insert_rowid())
}

async fn list_for_post_sqlite(pool: &SqlitePool, post_id: i64) -> Result<Vec<CommentWithMeta>> {
    let rows = sqlx::query(SELECT_FOR_POST)
        .bind(post_id)
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    Ok(rows
        .iter()
        .map(|row| {
            let email: String = row.get("author_email");
            CommentWithMeta::new(row_to_comment_sqlite(row), row.get("author_name"), &email)
        })
        .collect())
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_comment_mysql(pool: &MySqlPool, comment: &Comment) -> Result<i64> {
    let result = sqlx::query(INSERT_COMMENT)
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(pool)
        .await
        .context("Failed to create comment")?;
    Ok(result.last_insert_id() as i64)
}

async fn list_for_post_mysql(pool: &MySqlPool, post_id: i64) -> Result<Vec<CommentWithMeta>> {
    let rows = sqlx::query(SELECT_FOR_POST)
        .bind(post_id)
        .fetch_all(pool)
        .await
        .context("Failed to list comments")?;

    Ok(rows
        .iter()
        .map(|row| {
            let email: String = row.get("author_email");
            CommentWithMeta::new(row_to_comment_mysql(row), row.get("author_name"), &email)
        })
        .collect())
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
