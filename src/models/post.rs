//! Post model
//!
//! This module provides:
//! - `Post` entity representing a blog post
//! - `PostStatus` with its French labels and the public visibility rule
//! - Input types for creating and updating posts
//! - Read models returned by the post service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CategoryRef, CategoryWithCount, CommentThread, PagedResult, User};

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// Author user ID
    pub user_id: i64,
    /// URL slug, fixed at creation
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub status: PostStatus,
    /// Publication instant; in the future for scheduled posts
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Author display name, filled by repository joins
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
}

impl Post {
    /// Whether anonymous readers may see this post at `now`
    pub fn is_publicly_visible(&self, now: DateTime<Utc>) -> bool {
        is_publicly_visible(self.status, self.published_at, now)
    }

    pub fn is_owned_by(&self, user: &User) -> bool {
        self.user_id == user.id
    }

    /// Published and visible posts are open to everyone; anything else is
    /// reserved for its author.
    pub fn can_be_viewed_by(&self, viewer: Option<&User>, now: DateTime<Utc>) -> bool {
        self.is_publicly_visible(now) || viewer.is_some_and(|user| self.is_owned_by(user))
    }

    /// Only the author may edit or delete a post
    pub fn can_be_modified_by(&self, user: &User) -> bool {
        self.is_owned_by(user)
    }

    /// Scheduled post whose publication instant has been reached
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Scheduled
            && self.deleted_at.is_none()
            && self.published_at.is_some_and(|at| at <= now)
    }
}

/// The public visibility rule: published, with a publication instant that is not
/// in the future. A published post without a date is never visible.
pub fn is_publicly_visible(
    status: PostStatus,
    published_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status == PostStatus::Published && published_at.is_some_and(|at| at <= now)
}

/// Post publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Scheduled,
    Archived,
}

/// Who is asking for a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionActor {
    /// The post's author, through create/update
    Author,
    /// The scheduled publication sweep
    Sweeper,
}

impl PostStatus {
    /// Every status, in the order shown in status pickers
    pub fn all() -> [PostStatus; 4] {
        [
            PostStatus::Draft,
            PostStatus::Published,
            PostStatus::Scheduled,
            PostStatus::Archived,
        ]
    }

    /// Database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Archived => "archived",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            "scheduled" => Some(PostStatus::Scheduled),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }

    /// Human label
    pub fn label(&self) -> &'static str {
        match self {
            PostStatus::Draft => "Brouillon",
            PostStatus::Published => "Publié",
            PostStatus::Scheduled => "Programmé",
            PostStatus::Archived => "Archivé",
        }
    }

    /// Badge color used by front ends
    pub fn color(&self) -> &'static str {
        match self {
            PostStatus::Draft => "gray",
            PostStatus::Published => "green",
            PostStatus::Scheduled => "blue",
            PostStatus::Archived => "orange",
        }
    }

    /// Only published posts can ever reach the public
    pub fn is_public(&self) -> bool {
        *self == PostStatus::Published
    }

    /// Authors may move a post between any two statuses. The sweep may only
    /// publish scheduled posts.
    pub fn can_transition(&self, to: PostStatus, actor: TransitionActor) -> bool {
        match actor {
            TransitionActor::Author => true,
            TransitionActor::Sweeper => {
                *self == PostStatus::Scheduled && to == PostStatus::Published
            }
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    /// Defaults to draft
    #[serde(default)]
    pub status: Option<PostStatus>,
    /// Requested publication instant
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

impl CreatePostInput {
    pub fn new(
        title: impl Into<String>,
        excerpt: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            excerpt: excerpt.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn with_categories(mut self, category_ids: Vec<i64>) -> Self {
        self.category_ids = category_ids;
        self
    }
}

/// Input for updating a post. Text fields replace the stored ones; the slug
/// is never touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Replaces the category set when present
    #[serde(default)]
    pub category_ids: Option<Vec<i64>>,
}

impl UpdatePostInput {
    pub fn new(
        title: impl Into<String>,
        excerpt: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            excerpt: excerpt.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn with_categories(mut self, category_ids: Vec<i64>) -> Self {
        self.category_ids = Some(category_ids);
        self
    }
}

/// Row-level data written when a post is inserted
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row-level data written when a post is updated
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Filters of the public home listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    /// Category slug
    #[serde(default)]
    pub category: Option<String>,
    /// Matched against title and excerpt
    #[serde(default)]
    pub search: Option<String>,
}

impl PostFilter {
    pub fn category(mut self, slug: impl Into<String>) -> Self {
        self.category = Some(slug.into());
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Blank values are treated as absent
    pub fn normalized(&self) -> Self {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            category: clean(&self.category),
            search: clean(&self.search),
        }
    }
}

/// A single post with everything its page shows
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    /// Top-level comments, newest first, each with its replies
    pub comments: Vec<CommentThread>,
    pub comments_count: i64,
    /// Whether the viewer may edit or delete the post
    pub can_edit: bool,
}

/// Public home page
#[derive(Debug, Clone, Serialize)]
pub struct HomePage {
    pub featured: Vec<Post>,
    pub posts: PagedResult<Post>,
    /// Categories holding at least one visible post
    pub categories: Vec<CategoryWithCount>,
    pub filters: PostFilter,
}
