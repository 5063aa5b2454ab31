//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shortest accepted comment body, in characters
pub const COMMENT_MIN_LENGTH: usize = 3;
/// Longest accepted comment body, in characters
pub const COMMENT_MAX_LENGTH: usize = 1000;

/// Comment entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// Author user ID
    pub user_id: i64,
    /// Comment this one replies to
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_edited(&self) -> bool {
        self.updated_at != self.created_at
    }
}

/// Comment with its author, as shown under a post
#[derive(Debug, Clone, Serialize)]
pub struct CommentWithMeta {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: String,
    pub avatar_url: String,
    pub is_edited: bool,
}

impl CommentWithMeta {
    pub fn new(comment: Comment, author_name: String, author_email: &str) -> Self {
        Self {
            is_edited: comment.is_edited(),
            avatar_url: Self::gravatar_url(author_email),
            comment,
            author_name,
        }
    }

    /// Gravatar URL for an email, with the "mystery person" fallback
    pub fn gravatar_url(email: &str) -> String {
        let email = email.trim();
        if email.is_empty() {
            return "https://www.gravatar.com/avatar/?d=mp&s=80".to_string();
        }
        let hash = format!("{:x}", md5::compute(email.to_lowercase()));
        format!("https://www.gravatar.com/avatar/{}?d=mp&s=80", hash)
    }
}

/// A top-level comment and the replies shown under it
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentWithMeta,
    /// Oldest first
    pub replies: Vec<CommentWithMeta>,
}

impl CommentThread {
    /// Number of comments in the thread, the top-level one included
    pub fn comment_count(&self) -> usize {
        1 + self.replies.len()
    }
}

/// Arrange a post's flat comment list into one-level threads.
///
/// Top-level comments come newest first. Every reply is listed under its
/// top-level ancestor, oldest first, whatever its depth. Comments whose
/// ancestry leaves the list are dropped.
pub fn build_thread(comments: Vec<CommentWithMeta>) -> Vec<CommentThread> {
    let parents: HashMap<i64, Option<i64>> = comments
        .iter()
        .map(|c| (c.comment.id, c.comment.parent_id))
        .collect();

    // Walk up to the top-level ancestor; the step bound breaks parent cycles.
    let root_of = |mut id: i64| -> Option<i64> {
        for _ in 0..=parents.len() {
            match parents.get(&id)? {
                None => return Some(id),
                Some(parent) => id = *parent,
            }
        }
        None
    };

    let mut roots = Vec::new();
    let mut replies: HashMap<i64, Vec<CommentWithMeta>> = HashMap::new();
    for comment in comments {
        match comment.comment.parent_id {
            None => roots.push(comment),
            Some(parent) => {
                if let Some(root) = root_of(parent) {
                    replies.entry(root).or_default().push(comment);
                }
            }
        }
    }

    roots.sort_by_key(|c| std::cmp::Reverse((c.comment.created_at, c.comment.id)));
    roots
        .into_iter()
        .map(|root| {
            let mut children = replies.remove(&root.comment.id).unwrap_or_default();
            children.sort_by_key(|c| (c.comment.created_at, c.comment.id));
            CommentThread {
                comment: root,
                replies: children,
            }
        })
        .collect()
}

/// Input for creating a comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl CreateCommentInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            parent_id: None,
        }
    }

    pub fn reply_to(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}
