//! Comment service
//!
//! Comments hang off posts the commenter can see. Replies must stay on the
//! post of their parent.

use crate::clock::DynClock;
use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{
    build_thread, Comment, CommentThread, CreateCommentInput, User, COMMENT_MAX_LENGTH,
    COMMENT_MIN_LENGTH,
};
use std::sync::Arc;

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment not found")]
    NotFound,

    #[error("Post not found")]
    PostNotFound,

    #[error("Forbidden")]
    Forbidden,

    /// Invalid input, with the French message to show
    #[error("{0}")]
    ValidationError(String),

    #[error("Email address not verified")]
    EmailNotVerified,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, CommentServiceError>;

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
    clock: DynClock,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        posts: Arc<dyn PostRepository>,
        clock: DynClock,
    ) -> Self {
        Self {
            comments,
            posts,
            clock,
        }
    }

    /// Comment on a post, or reply to one of its comments
    pub async fn create(
        &self,
        actor: &User,
        post_id: i64,
        input: CreateCommentInput,
    ) -> Result<Comment> {
        if !actor.has_verified_email() {
            return Err(CommentServiceError::EmailNotVerified);
        }

        let now = self.clock.now();
        let post = self
            .posts
            .get_by_id(post_id)
            .await?
            .ok_or(CommentServiceError::PostNotFound)?;
        if !post.can_be_viewed_by(Some(actor), now) {
            return Err(CommentServiceError::Forbidden);
        }

        let content = validate_content(&input.content)?;

        if let Some(parent_id) = input.parent_id {
            let parent = self.comments.get_by_id(parent_id).await?;
            if !parent.is_some_and(|parent| parent.post_id == post.id) {
                return Err(CommentServiceError::ValidationError(
                    "Le commentaire auquel vous répondez n'existe pas.".to_string(),
                ));
            }
        }

        let comment = self
            .comments
            .create(&Comment {
                id: 0,
                post_id: post.id,
                user_id: actor.id,
                parent_id: input.parent_id,
                content,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(
            comment_id = comment.id,
            post_id = post.id,
            reply = comment.is_reply(),
            "Comment created"
        );
        Ok(comment)
    }

    /// Replace a comment's content
    pub async fn update(&self, actor: &User, id: i64, content: &str) -> Result<Comment> {
        let comment = self.find(id).await?;
        if !actor.can_moderate(comment.user_id) {
            return Err(CommentServiceError::Forbidden);
        }

        let content = validate_content(content)?;
        let updated = self
            .comments
            .update_content(id, &content, self.clock.now())
            .await?;

        tracing::info!(comment_id = id, "Comment updated");
        Ok(updated)
    }

    /// Delete a comment and, through the foreign key, its replies
    pub async fn delete(&self, actor: &User, id: i64) -> Result<()> {
        let comment = self.find(id).await?;
        if !actor.can_moderate(comment.user_id) {
            return Err(CommentServiceError::Forbidden);
        }

        self.comments.delete(id).await?;
        tracing::info!(comment_id = id, post_id = comment.post_id, "Comment deleted");
        Ok(())
    }

    /// Comments of a post, one thread per top-level comment
    pub async fn thread(&self, post_id: i64) -> Result<Vec<CommentThread>> {
        Ok(build_thread(self.comments.list_for_post(post_id).await?))
    }

    async fn find(&self, id: i64) -> Result<Comment> {
        self.comments
            .get_by_id(id)
            .await?
            .ok_or(CommentServiceError::NotFound)
    }
}

fn validate_content(content: &str) -> Result<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(CommentServiceError::ValidationError(
            "Le commentaire est obligatoire.".to_string(),
        ));
    }
    let length = content.chars().count();
    if length < COMMENT_MIN_LENGTH {
        return Err(CommentServiceError::ValidationError(
            "Le commentaire doit contenir au moins 3 caractères.".to_string(),
        ));
    }
    if length > COMMENT_MAX_LENGTH {
        return Err(CommentServiceError::ValidationError(
            "Le commentaire ne peut pas dépasser 1000 caractères.".to_string(),
        ));
    }
    Ok(content.to_string())
}
