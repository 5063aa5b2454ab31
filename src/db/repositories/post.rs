//! Post repository
//!
//! Database operations for posts, their category links and the queries
//! behind the public listings and the scheduled publication sweep.
//!
//! Soft-deleted posts (`deleted_at` set) are invisible to every read here.
//! Only `slug_exists` still sees them, since their slugs stay reserved.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CategoryRef, NewPost, Post, PostChanges, PostFilter, PostStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post, returning it with its ID and author name
    async fn create(&self, post: &NewPost) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Whether any post, deleted ones included, uses this slug
    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Persist the editable columns. The slug is never written.
    async fn update(&self, id: i64, changes: &PostChanges) -> Result<Post>;

    /// Mark a post deleted. Returns false when it was already gone.
    async fn soft_delete(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;

    async fn increment_view_count(&self, id: i64) -> Result<()>;

    /// Posts visible at `now` plus, when a viewer is given, every post of
    /// that viewer. Newest publication first.
    async fn list_for_viewer(
        &self,
        viewer_id: Option<i64>,
        now: DateTime<Utc>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>>;

    async fn count_for_viewer(&self, viewer_id: Option<i64>, now: DateTime<Utc>) -> Result<i64>;

    /// Publicly visible posts matching the filter, newest publication first
    async fn list_visible(
        &self,
        filter: &PostFilter,
        now: DateTime<Utc>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>>;

    async fn count_visible(&self, filter: &PostFilter, now: DateTime<Utc>) -> Result<i64>;

    /// Every post of an author whatever its status, newest first
    async fn list_by_author(&self, author_id: i64, offset: i64, limit: i64) -> Result<Vec<Post>>;

    async fn count_by_author(&self, author_id: i64) -> Result<i64>;

    /// Publicly visible posts, most viewed first
    async fn list_popular(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Post>>;

    /// Most recent visible posts of a category
    async fn list_visible_in_category(
        &self,
        category_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Post>>;

    /// Replace the category set of a post
    async fn set_categories(&self, post_id: i64, category_ids: &[i64]) -> Result<()>;

    /// Scheduled posts whose publication instant is at or before `now`
    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Post>>;

    /// Flip a post from scheduled to published if it is still due at `at`.
    /// Returns false when the row was no longer scheduled, was moved to a
    /// later date, or is gone, so concurrent sweeps publish it only once.
    /// `published_at` is left untouched.
    async fn publish_if_scheduled(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_posts(&self, sql: &str, args: &[Arg]) -> Result<Vec<Post>> {
        let mut posts = match self.pool.backend()? {
            Backend::Sqlite(pool) => fetch_posts_sqlite(pool, sql, args).await?,
            Backend::Mysql(pool) => fetch_posts_mysql(pool, sql, args).await?,
        };
        self.attach_categories(&mut posts).await?;
        Ok(posts)
    }

    async fn fetch_post(&self, sql: &str, args: &[Arg]) -> Result<Option<Post>> {
        Ok(self.fetch_posts(sql, args).await?.into_iter().next())
    }

    async fn fetch_count(&self, sql: &str, args: &[Arg]) -> Result<i64> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => fetch_count_sqlite(pool, sql, args).await,
            Backend::Mysql(pool) => fetch_count_mysql(pool, sql, args).await,
        }
    }

    async fn execute(&self, sql: &str, args: &[Arg]) -> Result<u64> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => execute_sqlite(pool, sql, args).await,
            Backend::Mysql(pool) => execute_mysql(pool, sql, args).await,
        }
    }

    async fn attach_categories(&self, posts: &mut [Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let args: Vec<Arg> = posts.iter().map(|p| Arg::Int(p.id)).collect();
        let sql = format!(
            r#"
            SELECT cp.post_id, c.id, c.name, c.slug
            FROM category_post cp
            INNER JOIN categories c ON c.id = cp.category_id
            WHERE cp.post_id IN ({})
            ORDER BY c.name, c.id
            "#,
            placeholders(args.len())
        );

        let links = match self.pool.backend()? {
            Backend::Sqlite(pool) => fetch_category_links_sqlite(pool, &sql, &args).await?,
            Backend::Mysql(pool) => fetch_category_links_mysql(pool, &sql, &args).await?,
        };

        let mut by_post: HashMap<i64, Vec<CategoryRef>> = HashMap::new();
        for (post_id, category) in links {
            by_post.entry(post_id).or_default().push(category);
        }
        for post in posts.iter_mut() {
            post.categories = by_post.remove(&post.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &NewPost) -> Result<Post> {
        let sql = r#"
            INSERT INTO posts (user_id, slug, title, excerpt, content, status, published_at,
                               view_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#;
        let args = [
            Arg::Int(post.user_id),
            Arg::Text(post.slug.clone()),
            Arg::Text(post.title.clone()),
            Arg::Text(post.excerpt.clone()),
            Arg::Text(post.content.clone()),
            Arg::Text(post.status.as_str().to_string()),
            Arg::OptTime(post.published_at),
            Arg::Time(post.created_at),
            Arg::Time(post.created_at),
        ];

        let id = match self.pool.backend()? {
            Backend::Sqlite(pool) => bind_sqlite(sqlx::query(sql), &args)
                .execute(pool)
                .await
                .context("Failed to create post")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => bind_mysql(sqlx::query(sql), &args)
                .execute(pool)
                .await
                .context("Failed to create post")?
                .last_insert_id() as i64,
        };

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("{} WHERE p.id = ? AND p.deleted_at IS NULL", SELECT_POST);
        self.fetch_post(&sql, &[Arg::Int(id)]).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let sql = format!("{} WHERE p.slug = ? AND p.deleted_at IS NULL", SELECT_POST);
        self.fetch_post(&sql, &[Arg::Text(slug.to_string())]).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count = self
            .fetch_count(
                "SELECT COUNT(*) AS count FROM posts WHERE slug = ?",
                &[Arg::Text(slug.to_string())],
            )
            .await
            .context("Failed to check post slug existence")?;
        Ok(count > 0)
    }

    async fn update(&self, id: i64, changes: &PostChanges) -> Result<Post> {
        let sql = r#"
            UPDATE posts
            SET title = ?, excerpt = ?, content = ?, status = ?, published_at = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
        "#;
        self.execute(
            sql,
            &[
                Arg::Text(changes.title.clone()),
                Arg::Text(changes.excerpt.clone()),
                Arg::Text(changes.content.clone()),
                Arg::Text(changes.status.as_str().to_string()),
                Arg::OptTime(changes.published_at),
                Arg::Time(changes.updated_at),
                Arg::Int(id),
            ],
        )
        .await
        .context("Failed to update post")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn soft_delete(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let affected = self
            .execute(
                "UPDATE posts SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
                &[Arg::Time(at), Arg::Int(id)],
            )
            .await
            .context("Failed to delete post")?;
        Ok(affected > 0)
    }

    async fn increment_view_count(&self, id: i64) -> Result<()> {
        self.execute(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?",
            &[Arg::Int(id)],
        )
        .await
        .context("Failed to increment view count")?;
        Ok(())
    }

    async fn list_for_viewer(
        &self,
        viewer_id: Option<i64>,
        now: DateTime<Utc>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let (clause, mut args) = viewer_clause(viewer_id, now);
        let sql = format!(
            "{} WHERE {} ORDER BY p.published_at DESC, p.id DESC LIMIT ? OFFSET ?",
            SELECT_POST, clause
        );
        args.push(Arg::Int(limit));
        args.push(Arg::Int(offset));
        self.fetch_posts(&sql, &args)
            .await
            .context("Failed to list posts")
    }

    async fn count_for_viewer(&self, viewer_id: Option<i64>, now: DateTime<Utc>) -> Result<i64> {
        let (clause, args) = viewer_clause(viewer_id, now);
        let sql = format!("SELECT COUNT(*) AS count FROM posts p WHERE {}", clause);
        self.fetch_count(&sql, &args)
            .await
            .context("Failed to count posts")
    }

    async fn list_visible(
        &self,
        filter: &PostFilter,
        now: DateTime<Utc>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let (clause, mut args) = visible_clause(filter, now);
        let sql = format!(
            "{} WHERE {} ORDER BY p.published_at DESC, p.id DESC LIMIT ? OFFSET ?",
            SELECT_POST, clause
        );
        args.push(Arg::Int(limit));
        args.push(Arg::Int(offset));
        self.fetch_posts(&sql, &args)
            .await
            .context("Failed to list visible posts")
    }

    async fn count_visible(&self, filter: &PostFilter, now: DateTime<Utc>) -> Result<i64> {
        let (clause, args) = visible_clause(filter, now);
        let sql = format!("SELECT COUNT(*) AS count FROM posts p WHERE {}", clause);
        self.fetch_count(&sql, &args)
            .await
            .context("Failed to count visible posts")
    }

    async fn list_by_author(&self, author_id: i64, offset: i64, limit: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE p.user_id = ? AND p.deleted_at IS NULL \
             ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            SELECT_POST
        );
        self.fetch_posts(
            &sql,
            &[Arg::Int(author_id), Arg::Int(limit), Arg::Int(offset)],
        )
        .await
        .context("Failed to list author posts")
    }

    async fn count_by_author(&self, author_id: i64) -> Result<i64> {
        self.fetch_count(
            "SELECT COUNT(*) AS count FROM posts WHERE user_id = ? AND deleted_at IS NULL",
            &[Arg::Int(author_id)],
        )
        .await
        .context("Failed to count author posts")
    }

    async fn list_popular(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE {} ORDER BY p.view_count DESC, p.published_at DESC, p.id DESC LIMIT ?",
            SELECT_POST, VISIBLE
        );
        self.fetch_posts(&sql, &[Arg::Time(now), Arg::Int(limit)])
            .await
            .context("Failed to list popular posts")
    }

    async fn list_visible_in_category(
        &self,
        category_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE {} AND EXISTS (SELECT 1 FROM category_post cp \
             WHERE cp.post_id = p.id AND cp.category_id = ?) \
             ORDER BY p.published_at DESC, p.id DESC LIMIT ?",
            SELECT_POST, VISIBLE
        );
        self.fetch_posts(
            &sql,
            &[Arg::Time(now), Arg::Int(category_id), Arg::Int(limit)],
        )
        .await
        .context("Failed to list category posts")
    }

    async fn set_categories(&self, post_id: i64, category_ids: &[i64]) -> Result<()> {
        let mut ids = category_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        match self.pool.backend()? {
            Backend::Sqlite(pool) => set_categories_sqlite(pool, post_id, &ids).await,
            Backend::Mysql(pool) => set_categories_mysql(pool, post_id, &ids).await,
        }
    }

    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let sql = format!(
            "{} WHERE p.deleted_at IS NULL AND p.status = 'scheduled' \
             AND p.published_at IS NOT NULL AND p.published_at <= ? \
             ORDER BY p.published_at, p.id",
            SELECT_POST
        );
        self.fetch_posts(&sql, &[Arg::Time(now)])
            .await
            .context("Failed to select due scheduled posts")
    }

    async fn publish_if_scheduled(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let affected = self
            .execute(
                "UPDATE posts SET status = 'published', updated_at = ? \
                 WHERE id = ? AND status = 'scheduled' AND deleted_at IS NULL \
                 AND published_at IS NOT NULL AND published_at <= ?",
                &[Arg::Time(at), Arg::Int(id), Arg::Time(at)],
            )
            .await
            .context("Failed to publish scheduled post")?;
        Ok(affected == 1)
    }
}

// ============================================================================
// Query building
// ============================================================================

/// Bind value, so a statement can be built once and run on either backend
#[derive(Debug, Clone)]
enum Arg {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
    OptTime(Option<DateTime<Utc>>),
}

const SELECT_POST: &str = r#"
    SELECT p.id, p.user_id, p.slug, p.title, p.excerpt, p.content, p.status,
           p.published_at, p.view_count, p.created_at, p.updated_at, p.deleted_at,
           u.name AS author_name
    FROM posts p
    LEFT JOIN users u ON u.id = p.user_id
"#;

/// Public visibility, with `now` as its single bind
const VISIBLE: &str = "p.deleted_at IS NULL AND p.status = 'published' \
                       AND p.published_at IS NOT NULL AND p.published_at <= ?";

fn viewer_clause(viewer_id: Option<i64>, now: DateTime<Utc>) -> (String, Vec<Arg>) {
    match viewer_id {
        Some(viewer_id) => (
            "p.deleted_at IS NULL AND ((p.status = 'published' AND p.published_at IS NOT NULL \
             AND p.published_at <= ?) OR p.user_id = ?)"
                .to_string(),
            vec![Arg::Time(now), Arg::Int(viewer_id)],
        ),
        None => (VISIBLE.to_string(), vec![Arg::Time(now)]),
    }
}

fn visible_clause(filter: &PostFilter, now: DateTime<Utc>) -> (String, Vec<Arg>) {
    let filter = filter.normalized();
    let mut clause = VISIBLE.to_string();
    let mut args = vec![Arg::Time(now)];

    if let Some(category) = filter.category {
        clause.push_str(
            " AND EXISTS (SELECT 1 FROM category_post cp \
             INNER JOIN categories c ON c.id = cp.category_id \
             WHERE cp.post_id = p.id AND c.slug = ?)",
        );
        args.push(Arg::Text(category));
    }

    if let Some(search) = filter.search {
        let pattern = format!("%{}%", escape_like(&search));
        clause.push_str(" AND (p.title LIKE ? ESCAPE '!' OR p.excerpt LIKE ? ESCAPE '!')");
        args.push(Arg::Text(pattern.clone()));
        args.push(Arg::Text(pattern));
    }

    (clause, args)
}

/// Escape LIKE wildcards with `!`, which needs no quoting in either dialect
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_status(value: &str) -> Result<PostStatus> {
    PostStatus::from_str(value).ok_or_else(|| anyhow::anyhow!("Unknown post status: {}", value))
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &[Arg],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Arg::Int(v) => query.bind(*v),
            Arg::Text(v) => query.bind(v.clone()),
            Arg::Time(v) => query.bind(*v),
            Arg::OptTime(v) => query.bind(*v),
        };
    }
    query
}

async fn fetch_posts_sqlite(pool: &SqlitePool, sql: &str, args: &[Arg]) -> Result<Vec<Post>> {
    let rows = bind_sqlite(sqlx::query(sql), args)
        .fetch_all(pool)
        .await
        .context("Failed to fetch posts")?;
    rows.iter().map(row_to_post_sqlite).collect()
}

async fn fetch_count_sqlite(pool: &SqlitePool, sql: &str, args: &[Arg]) -> Result<i64> {
    let row = bind_sqlite(sqlx::query(sql), args)
        .fetch_one(pool)
        .await
        .context("Failed to count rows")?;
    Ok(row.get("count"))
}

async fn execute_sqlite(pool: &SqlitePool, sql: &str, args: &[Arg]) -> Result<u64> {
    let result = bind_sqlite(sqlx::query(sql), args)
        .execute(pool)
        .await
        .context("Failed to execute statement")?;
    Ok(result.rows_affected())
}

async fn fetch_category_links_sqlite(
    pool: &SqlitePool,
    sql: &str,
    args: &[Arg],
) -> Result<Vec<(i64, CategoryRef)>> {
    let rows = bind_sqlite(sqlx::query(sql), args)
        .fetch_all(pool)
        .await
        .context("Failed to load post categories")?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get("post_id"),
                CategoryRef {
                    id: row.get("id"),
                    name: row.get("name"),
                    slug: row.get("slug"),
                },
            )
        })
        .collect())
}

async fn set_categories_sqlite(pool: &SqlitePool, post_id: i64, ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM category_post WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post categories")?;

    for category_id in ids {
        sqlx::query("INSERT INTO category_post (category_id, post_id) VALUES (?, ?)")
            .bind(category_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach category")?;
    }

    tx.commit().await.context("Failed to commit post categories")?;
    Ok(())
}

fn row_to_post_sqlite(row: &SqliteRow) -> Result<Post> {
    let status: String = row.get("status");
    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        status: parse_status(&status)?,
        published_at: row.get("published_at"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        author_name: row.get("author_name"),
        categories: Vec::new(),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &[Arg],
) -> Query<'q, MySql, MySqlArguments> {
    for arg in args {
        query = match arg {
            Arg::Int(v) => query.bind(*v),
            Arg::Text(v) => query.bind(v.clone()),
            Arg::Time(v) => query.bind(*v),
            Arg::OptTime(v) => query.bind(*v),
        };
    }
    query
}

async fn fetch_posts_mysql(pool: &MySqlPool, sql: &str, args: &[Arg]) -> Result<Vec<Post>> {
    let rows = bind_mysql(sqlx::query(sql), args)
        .fetch_all(pool)
        .await
        .context("Failed to fetch posts")?;
    rows.iter().map(row_to_post_mysql).collect()
}

async fn fetch_count_mysql(pool: &MySqlPool, sql: &str, args: &[Arg]) -> Result<i64> {
    let row = bind_mysql(sqlx::query(sql), args)
        .fetch_one(pool)
        .await
        .context("Failed to count rows")?;
    Ok(row.get("count"))
}

async fn execute_mysql(pool: &MySqlPool, sql: &str, args: &[Arg]) -> Result<u64> {
    let result = bind_mysql(sqlx::query(sql), args)
        .execute(pool)
        .await
        .context("Failed to execute statement")?;
    Ok(result.rows_affected())
}

async fn fetch_category_links_mysql(
    pool: &MySqlPool,
    sql: &str,
    args: &[Arg],
) -> Result<Vec<(i64, CategoryRef)>> {
    let rows = bind_mysql(sqlx::query(sql), args)
        .fetch_all(pool)
        .await
        .context("Failed to load post categories")?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get("post_id"),
                CategoryRef {
                    id: row.get("id"),
                    name: row.get("name"),
                    slug: row.get("slug"),
                },
            )
        })
        .collect())
}

async fn set_categories_mysql(pool: &MySqlPool, post_id: i64, ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM category_post WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post categories")?;

    for category_id in ids {
        sqlx::query("INSERT INTO category_post (category_id, post_id) VALUES (?, ?)")
            .bind(category_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach category")?;
    }

    tx.commit().await.context("Failed to commit post categories")?;
    Ok(())
}

fn row_to_post_mysql(row: &MySqlRow) -> Result<Post> {
    let status: String = row.get("status");
    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        status: parse_status(&status)?,
        published_at: row.get("published_at"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
        author_name: row.get("author_name"),
        categories: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CategoryRepository, SqlxCategoryRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, User};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        repo: SqlxPostRepository,
        categories: SqlxCategoryRepository,
        author_id: i64,
        other_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let author = users
            .create(&User::new("Camille".into(), "camille@example.fr".into(), "h".into(), now()))
            .await
            .unwrap();
        let other = users
            .create(&User::new("Dominique".into(), "dom@example.fr".into(), "h".into(), now()))
            .await
            .unwrap();

        Fixture {
            repo: SqlxPostRepository::new(pool.clone()),
            categories: SqlxCategoryRepository::new(pool),
            author_id: author.id,
            other_id: other.id,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn new_post(
        user_id: i64,
        slug: &str,
        status: PostStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> NewPost {
        NewPost {
            user_id,
            slug: slug.into(),
            title: format!("Titre {}", slug),
            excerpt: format!("Résumé {}", slug),
            content: "Contenu".into(),
            status,
            published_at,
            created_at: now(),
        }
    }

    async fn category(fx: &Fixture, slug: &str) -> Category {
        fx.categories
            .create(&Category {
                id: 0,
                name: slug.to_uppercase(),
                slug: slug.into(),
                description: None,
                created_at: now(),
                updated_at: now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let fx = setup().await;

        let created = fx
            .repo
            .create(&new_post(fx.author_id, "bonjour", PostStatus::Draft, None))
            .await
            .expect("Failed to create post");

        assert!(created.id > 0);
        assert_eq!(created.author_name.as_deref(), Some("Camille"));
        assert_eq!(created.status, PostStatus::Draft);
        assert_eq!(created.view_count, 0);

        let by_slug = fx.repo.get_by_slug("bonjour").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_post_but_keeps_slug() {
        let fx = setup().await;
        let post = fx
            .repo
            .create(&new_post(fx.author_id, "bonjour", PostStatus::Draft, None))
            .await
            .unwrap();

        assert!(fx.repo.soft_delete(post.id, now()).await.unwrap());
        assert!(!fx.repo.soft_delete(post.id, now()).await.unwrap());

        assert!(fx.repo.get_by_id(post.id).await.unwrap().is_none());
        assert!(fx.repo.slug_exists("bonjour").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_keeps_slug() {
        let fx = setup().await;
        let post = fx
            .repo
            .create(&new_post(fx.author_id, "bonjour", PostStatus::Draft, None))
            .await
            .unwrap();

        let updated = fx
            .repo
            .update(
                post.id,
                &PostChanges {
                    title: "Un tout autre titre".into(),
                    excerpt: "E".into(),
                    content: "C".into(),
                    status: PostStatus::Published,
                    published_at: Some(now()),
                    updated_at: now() + Duration::minutes(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.slug, "bonjour");
        assert_eq!(updated.title, "Un tout autre titre");
        assert_eq!(updated.status, PostStatus::Published);
        assert_eq!(updated.published_at, Some(now()));
    }

    #[tokio::test]
    async fn test_visibility_queries() {
        let fx = setup().await;
        let past = Some(now() - Duration::hours(1));
        let future = Some(now() + Duration::hours(1));

        fx.repo.create(&new_post(fx.author_id, "live", PostStatus::Published, past)).await.unwrap();
        fx.repo.create(&new_post(fx.author_id, "future", PostStatus::Published, future)).await.unwrap();
        fx.repo.create(&new_post(fx.author_id, "queued", PostStatus::Scheduled, past)).await.unwrap();
        fx.repo.create(&new_post(fx.author_id, "draft", PostStatus::Draft, None)).await.unwrap();
        fx.repo.create(&new_post(fx.other_id, "theirs", PostStatus::Draft, None)).await.unwrap();

        let filter = PostFilter::default();
        let visible = fx.repo.list_visible(&filter, now(), 0, 10).await.unwrap();
        let slugs: Vec<_> = visible.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["live"]);
        assert_eq!(fx.repo.count_visible(&filter, now()).await.unwrap(), 1);

        assert_eq!(fx.repo.count_for_viewer(None, now()).await.unwrap(), 1);
        assert_eq!(fx.repo.count_for_viewer(Some(fx.author_id), now()).await.unwrap(), 4);
        assert_eq!(fx.repo.count_for_viewer(Some(fx.other_id), now()).await.unwrap(), 2);

        let mine = fx.repo.list_for_viewer(Some(fx.author_id), now(), 0, 10).await.unwrap();
        assert_eq!(mine.len(), 4);
        assert_eq!(mine[0].slug, "future");

        // The future post becomes visible once its instant is reached.
        let later = now() + Duration::hours(2);
        assert_eq!(fx.repo.count_visible(&filter, later).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_and_category_filters() {
        let fx = setup().await;
        let past = Some(now() - Duration::hours(1));
        let travel = category(&fx, "voyages").await;

        let lisbon = fx
            .repo
            .create(&new_post(fx.author_id, "lisbonne", PostStatus::Published, past))
            .await
            .unwrap();
        fx.repo.create(&new_post(fx.author_id, "recette", PostStatus::Published, past)).await.unwrap();
        fx.repo.set_categories(lisbon.id, &[travel.id]).await.unwrap();

        let by_category = PostFilter::default().category("voyages");
        let found = fx.repo.list_visible(&by_category, now(), 0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].categories[0].slug, "voyages");

        let by_search = PostFilter::default().search("recette");
        assert_eq!(fx.repo.count_visible(&by_search, now()).await.unwrap(), 1);

        let wildcard = PostFilter::default().search("%");
        assert_eq!(fx.repo.count_visible(&wildcard, now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_categories_replaces_links() {
        let fx = setup().await;
        let a = category(&fx, "a").await;
        let b = category(&fx, "b").await;
        let post = fx
            .repo
            .create(&new_post(fx.author_id, "p", PostStatus::Draft, None))
            .await
            .unwrap();

        fx.repo.set_categories(post.id, &[a.id, b.id, a.id]).await.unwrap();
        assert_eq!(fx.repo.get_by_id(post.id).await.unwrap().unwrap().categories.len(), 2);

        fx.repo.set_categories(post.id, &[b.id]).await.unwrap();
        let reloaded = fx.repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(reloaded.categories, vec![CategoryRef::from(&b)]);
    }

    #[tokio::test]
    async fn test_popular_and_views() {
        let fx = setup().await;
        let past = Some(now() - Duration::hours(1));
        let quiet = fx.repo.create(&new_post(fx.author_id, "calme", PostStatus::Published, past)).await.unwrap();
        let busy = fx.repo.create(&new_post(fx.author_id, "couru", PostStatus::Published, past)).await.unwrap();

        for _ in 0..3 {
            fx.repo.increment_view_count(busy.id).await.unwrap();
        }
        fx.repo.increment_view_count(quiet.id).await.unwrap();

        let popular = fx.repo.list_popular(now(), 10).await.unwrap();
        assert_eq!(popular[0].id, busy.id);
        assert_eq!(popular[0].view_count, 3);
    }

    #[tokio::test]
    async fn test_due_selection_and_conditional_publish() {
        let fx = setup().await;
        let due = fx
            .repo
            .create(&new_post(fx.author_id, "due", PostStatus::Scheduled, Some(now())))
            .await
            .unwrap();
        fx.repo
            .create(&new_post(fx.author_id, "later", PostStatus::Scheduled, Some(now() + Duration::seconds(1))))
            .await
            .unwrap();
        let gone = fx
            .repo
            .create(&new_post(fx.author_id, "gone", PostStatus::Scheduled, Some(now() - Duration::days(1))))
            .await
            .unwrap();
        fx.repo.soft_delete(gone.id, now()).await.unwrap();

        let selected = fx.repo.list_due_scheduled(now()).await.unwrap();
        assert_eq!(selected.iter().map(|p| p.id).collect::<Vec<_>>(), vec![due.id]);

        assert!(fx.repo.publish_if_scheduled(due.id, now()).await.unwrap());
        assert!(!fx.repo.publish_if_scheduled(due.id, now()).await.unwrap());
        assert!(!fx.repo.publish_if_scheduled(gone.id, now()).await.unwrap());

        let published = fx.repo.get_by_id(due.id).await.unwrap().unwrap();
        assert_eq!(published.status, PostStatus::Published);
        assert_eq!(published.published_at, Some(now()));
    }

    #[tokio::test]
    async fn test_conditional_publish_skips_post_rescheduled_after_selection() {
        let fx = setup().await;
        let post = fx
            .repo
            .create(&new_post(fx.author_id, "reporte", PostStatus::Scheduled, Some(now() - Duration::hours(1))))
            .await
            .unwrap();

        let selected = fx.repo.list_due_scheduled(now()).await.unwrap();
        assert_eq!(selected.len(), 1);

        let later = now() + Duration::days(7);
        fx.repo
            .update(
                post.id,
                &PostChanges {
                    title: "Reporté".into(),
                    excerpt: "E".into(),
                    content: "C".into(),
                    status: PostStatus::Scheduled,
                    published_at: Some(later),
                    updated_at: now(),
                },
            )
            .await
            .unwrap();

        assert!(!fx.repo.publish_if_scheduled(post.id, now()).await.unwrap());

        let stored = fx.repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Scheduled);
        assert_eq!(stored.published_at, Some(later));
    }

    #[tokio::test]
    async fn test_author_listing() {
        let fx = setup().await;
        fx.repo.create(&new_post(fx.author_id, "a", PostStatus::Draft, None)).await.unwrap();
        fx.repo.create(&new_post(fx.author_id, "b", PostStatus::Archived, None)).await.unwrap();
        fx.repo.create(&new_post(fx.other_id, "c", PostStatus::Draft, None)).await.unwrap();

        assert_eq!(fx.repo.count_by_author(fx.author_id).await.unwrap(), 2);
        assert_eq!(fx.repo.list_by_author(fx.author_id, 0, 1).await.unwrap().len(), 1);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50% de _remise_!"), "50!% de !_remise!_!!");
    }
}
