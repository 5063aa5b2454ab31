//! Services layer - Business logic
//!
//! Services implement the business rules of Carnet on top of the
//! repositories:
//! - post lifecycle, visibility and listings
//! - the scheduled publication sweep
//! - registration and email verification codes
//! - comments and categories

pub mod category;
pub mod comment;
pub mod mailer;
pub mod password;
pub mod post;
pub mod publication;
pub mod slug;
pub mod user;
pub mod verification;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use mailer::{create_notifier, DynNotifier, LogNotifier, Notifier, SmtpNotifier, VerificationMessage};
pub use password::{hash_secret, verify_secret};
pub use post::{batch_deleted_message, resolve_published_at, PostService, PostServiceError};
pub use publication::{
    PublicationScheduler, PublicationService, PublishedPost, SweepOutcome, SweepReport,
};
pub use slug::slugify;
pub use user::{Registration, UserService, UserServiceError};
pub use verification::{
    generate_verification_code, VerificationError, VerificationService,
};
