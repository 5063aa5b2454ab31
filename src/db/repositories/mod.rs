//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod category;
pub mod comment;
pub mod post;
pub mod user;
pub mod verification_code;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use user::{normalize_email, SqlxUserRepository, UserRepository};
pub use verification_code::{SqlxVerificationCodeRepository, VerificationCodeRepository};
