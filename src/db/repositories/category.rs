//! Category repository
//!
//! Database operations for categories and their post counts.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, CategoryWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a category, returning it with its ID
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// Whether a slug is taken by a category other than `except_id`
    async fn slug_exists(&self, slug: &str, except_id: Option<i64>) -> Result<bool>;

    /// Persist name, slug and description
    async fn update(&self, category: &Category) -> Result<Category>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Categories ordered by name, with their number of (non-deleted) posts
    async fn list_with_counts(&self, offset: i64, limit: i64) -> Result<Vec<CategoryWithCount>>;

    async fn count(&self) -> Result<i64>;

    /// Categories holding at least one publicly visible post at `now`,
    /// with the number of such posts
    async fn list_with_visible_posts(&self, now: DateTime<Utc>) -> Result<Vec<CategoryWithCount>>;

    /// Number of non-deleted posts attached to a category
    async fn count_posts(&self, category_id: i64) -> Result<i64>;

    /// The subset of `ids` that exist
    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_category_sqlite(pool, category).await,
            Backend::Mysql(pool) => create_category_mysql(pool, category).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE id = ?", SELECT_CATEGORY);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.map(|row| row_to_category_sqlite(&row)))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.map(|row| row_to_category_mysql(&row)))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE slug = ?", SELECT_CATEGORY);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.map(|row| row_to_category_sqlite(&row)))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.map(|row| row_to_category_mysql(&row)))
            }
        }
    }

    async fn slug_exists(&self, slug: &str, except_id: Option<i64>) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM categories WHERE slug = ? AND id <> ?";
        // Row IDs start at 1, so 0 excludes nothing.
        let except_id = except_id.unwrap_or(0);
        let count: i64 = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(slug)
                .bind(except_id)
                .fetch_one(pool)
                .await
                .context("Failed to check category slug existence")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(slug)
                .bind(except_id)
                .fetch_one(pool)
                .await
                .context("Failed to check category slug existence")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let sql = "UPDATE categories SET name = ?, slug = ?, description = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.updated_at)
                    .bind(category.id)
                    .execute(pool)
                    .await
                    .context("Failed to update category")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.updated_at)
                    .bind(category.id)
                    .execute(pool)
                    .await
                    .context("Failed to update category")?;
            }
        }

        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM categories WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete category")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete category")?;
            }
        }
        Ok(())
    }

    async fn list_with_counts(&self, offset: i64, limit: i64) -> Result<Vec<CategoryWithCount>> {
        let sql = r#"
            SELECT c.id, c.name, c.slug, c.description, c.created_at, c.updated_at,
                   COUNT(p.id) AS posts_count
            FROM categories c
            LEFT JOIN category_post cp ON cp.category_id = c.id
            LEFT JOIN posts p ON p.id = cp.post_id AND p.deleted_at IS NULL
            GROUP BY c.id, c.name, c.slug, c.description, c.created_at, c.updated_at
            ORDER BY c.name, c.id
            LIMIT ? OFFSET ?
        "#;
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_counted_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_counted_mysql).collect())
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM categories";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count categories")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count categories")?
                .get("count"),
        };
        Ok(count)
    }

    async fn list_with_visible_posts(&self, now: DateTime<Utc>) -> Result<Vec<CategoryWithCount>> {
        let sql = r#"
            SELECT c.id, c.name, c.slug, c.description, c.created_at, c.updated_at,
                   COUNT(p.id) AS posts_count
            FROM categories c
            INNER JOIN category_post cp ON cp.category_id = c.id
            INNER JOIN posts p ON p.id = cp.post_id
            WHERE p.deleted_at IS NULL
              AND p.status = 'published'
              AND p.published_at IS NOT NULL
              AND p.published_at <= ?
            GROUP BY c.id, c.name, c.slug, c.description, c.created_at, c.updated_at
            ORDER BY c.name, c.id
        "#;
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(sql)
                    .bind(now)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories with visible posts")?;
                Ok(rows.iter().map(row_to_counted_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(sql)
                    .bind(now)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories with visible posts")?;
                Ok(rows.iter().map(row_to_counted_mysql).collect())
            }
        }
    }

    async fn count_posts(&self, category_id: i64) -> Result<i64> {
        let sql = r#"
            SELECT COUNT(*) AS count
            FROM category_post cp
            INNER JOIN posts p ON p.id = cp.post_id
            WHERE cp.category_id = ? AND p.deleted_at IS NULL
        "#;
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(category_id)
                .fetch_one(pool)
                .await
                .context("Failed to count category posts")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(category_id)
                .fetch_one(pool)
                .await
                .context("Failed to count category posts")?
                .get("count"),
        };
        Ok(count)
    }

    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM categories WHERE id IN ({}) ORDER BY id",
            placeholders
        );

        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to check category IDs")?;
                Ok(rows.iter().map(|row| row.get("id")).collect())
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to check category IDs")?;
                Ok(rows.iter().map(|row| row.get("id")).collect())
            }
        }
    }
}

const SELECT_CATEGORY: &str =
    "SELECT id, name, slug, description, created_at, updated_at FROM categories";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, slug, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.created_at)
    .bind(category.updated_at)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        ..category.clone()
    })
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_counted_sqlite(row: &sqlx::sqlite::SqliteRow) -> CategoryWithCount {
    CategoryWithCount {
        category: row_to_category_sqlite(row),
        posts_count: row.get("posts_count"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, slug, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.created_at)
    .bind(category.updated_at)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        ..category.clone()
    })
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_counted_mysql(row: &sqlx::mysql::MySqlRow) -> CategoryWithCount {
    CategoryWithCount {
        category: row_to_category_mysql(row),
        posts_count: row.get("posts_count"),
    }
}
