//! Data models
//!
//! This module contains the data structures used throughout Carnet:
//! - Database entities (Post, Category, Comment, User, EmailVerificationCode)
//! - Service inputs and read models
//! - Pagination types

mod category;
mod comment;
mod pagination;
mod post;
mod user;
mod verification_code;

pub use category::{
    Category, CategoryDetail, CategoryRef, CategoryWithCount, CreateCategoryInput,
    UpdateCategoryInput,
};
pub use comment::{
    build_thread, Comment, CommentThread, CommentWithMeta, CreateCommentInput, COMMENT_MAX_LENGTH,
    COMMENT_MIN_LENGTH,
};
pub use pagination::{ListParams, PagedResult};
pub use post::{
    is_publicly_visible, CreatePostInput, HomePage, NewPost, Post, PostChanges, PostDetail,
    PostFilter, PostStatus, TransitionActor, UpdatePostInput,
};
pub use user::{RegisterInput, User};
pub use verification_code::{
    EmailVerificationCode, NewVerificationCode, CODE_LENGTH, EXPIRATION_MINUTES, MAX_ATTEMPTS,
    RESEND_COOLDOWN_SECONDS,
};
