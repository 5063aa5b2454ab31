//! Post service
//!
//! Business rules for posts:
//! - `published_at` resolution on every create and update
//! - author-only modification, soft deletion, batch deletion
//! - the listings behind the post index, the home page and "my posts"
//!
//! Every operation reads "now" once from the injected clock.

use crate::clock::DynClock;
use crate::db::repositories::{CategoryRepository, CommentRepository, PostRepository};
use crate::models::{
    build_thread, CreatePostInput, HomePage, ListParams, NewPost, PagedResult, Post, PostChanges,
    PostDetail, PostFilter, PostStatus, UpdatePostInput, User,
};
use crate::services::slug;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Posts shown in the home page carousel
pub const FEATURED_COUNT: i64 = 5;
/// Page size of the home page listing
pub const HOME_PER_PAGE: u32 = 12;

const TITLE_MAX_LENGTH: usize = 255;
const EXCERPT_MAX_LENGTH: usize = 500;

/// Compute the `published_at` to store for a post moving to `target`.
///
/// - Published keeps an existing publication date, else takes the requested
///   one, else `now`.
/// - Scheduled takes the requested date. Without one the post is inert.
/// - Draft and Archived clear it.
pub fn resolve_published_at(
    target: PostStatus,
    requested: Option<DateTime<Utc>>,
    existing: Option<&Post>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match target {
        PostStatus::Published => existing
            .and_then(|post| post.published_at)
            .or(requested)
            .or(Some(now)),
        PostStatus::Scheduled => requested,
        PostStatus::Draft | PostStatus::Archived => None,
    }
}

/// Flash message after a batch deletion
pub fn batch_deleted_message(count: u64) -> String {
    if count == 1 {
        "1 article supprimé avec succès.".to_string()
    } else {
        format!("{} articles supprimés avec succès.", count)
    }
}

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found")]
    NotFound,

    /// The actor may not see or change this post
    #[error("Forbidden")]
    Forbidden,

    /// Invalid input, with the French message to show
    #[error("{0}")]
    ValidationError(String),

    #[error("Aucun article n'a pu être supprimé.")]
    NothingDeleted,

    #[error("Email address not verified")]
    EmailNotVerified,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, PostServiceError>;

/// Post service
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    comments: Arc<dyn CommentRepository>,
    clock: DynClock,
    per_page: u32,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        comments: Arc<dyn CommentRepository>,
        clock: DynClock,
    ) -> Self {
        Self {
            posts,
            categories,
            comments,
            clock,
            per_page: ListParams::default().per_page,
        }
    }

    /// Page size of the post index
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Create a post owned by `author`
    pub async fn create(&self, author: &User, input: CreatePostInput) -> Result<Post> {
        if !author.has_verified_email() {
            return Err(PostServiceError::EmailNotVerified);
        }
        validate_text(&input.title, &input.excerpt, &input.content)?;
        self.validate_categories(&input.category_ids).await?;

        let now = self.clock.now();
        let status = input.status.unwrap_or_default();
        let slug = self.unique_slug(&input.title).await?;

        let post = self
            .posts
            .create(&NewPost {
                user_id: author.id,
                slug,
                title: input.title.trim().to_string(),
                excerpt: input.excerpt.trim().to_string(),
                content: input.content,
                status,
                published_at: resolve_published_at(status, input.published_at, None, now),
                created_at: now,
            })
            .await?;

        let post = if input.category_ids.is_empty() {
            post
        } else {
            self.posts
                .set_categories(post.id, &input.category_ids)
                .await?;
            self.find(post.id).await?
        };

        tracing::info!(post_id = post.id, status = %post.status, "Post created");
        Ok(post)
    }

    /// Update a post. The slug never changes; the status defaults to the
    /// stored one.
    pub async fn update(&self, actor: &User, id: i64, input: UpdatePostInput) -> Result<Post> {
        let existing = self.find(id).await?;
        if !existing.can_be_modified_by(actor) {
            return Err(PostServiceError::Forbidden);
        }
        validate_text(&input.title, &input.excerpt, &input.content)?;
        if let Some(ids) = &input.category_ids {
            self.validate_categories(ids).await?;
        }

        let now = self.clock.now();
        let status = input.status.unwrap_or(existing.status);
        let changes = PostChanges {
            title: input.title.trim().to_string(),
            excerpt: input.excerpt.trim().to_string(),
            content: input.content,
            status,
            published_at: resolve_published_at(status, input.published_at, Some(&existing), now),
            updated_at: now,
        };

        let mut updated = self.posts.update(id, &changes).await?;
        if let Some(ids) = &input.category_ids {
            self.posts.set_categories(id, ids).await?;
            updated = self.find(id).await?;
        }

        tracing::info!(post_id = id, from = %existing.status, to = %status, "Post updated");
        Ok(updated)
    }

    /// Soft-delete a post
    pub async fn delete(&self, actor: &User, id: i64) -> Result<()> {
        let post = self.find(id).await?;
        if !post.can_be_modified_by(actor) {
            return Err(PostServiceError::Forbidden);
        }

        self.posts.soft_delete(id, self.clock.now()).await?;
        tracing::info!(post_id = id, "Post deleted");
        Ok(())
    }

    /// Soft-delete every listed post the actor owns, skipping the others.
    ///
    /// Returns the number of posts deleted.
    pub async fn batch_delete(&self, actor: &User, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Veuillez sélectionner au moins un article.".to_string(),
            ));
        }

        let mut owned = Vec::with_capacity(ids.len());
        for id in ids {
            let post = self.posts.get_by_id(*id).await?.ok_or_else(|| {
                PostServiceError::ValidationError(
                    "Un des articles sélectionnés n'existe pas.".to_string(),
                )
            })?;
            if post.can_be_modified_by(actor) {
                owned.push(post.id);
            }
        }

        let now = self.clock.now();
        let mut deleted = 0u64;
        for id in owned {
            if self.posts.soft_delete(id, now).await? {
                deleted += 1;
            }
        }

        if deleted == 0 {
            return Err(PostServiceError::NothingDeleted);
        }

        tracing::info!(requested = ids.len(), deleted, "Posts batch deleted");
        Ok(deleted)
    }

    /// A single post page. Counts a view.
    pub async fn show(&self, viewer: Option<&User>, slug: &str) -> Result<PostDetail> {
        let now = self.clock.now();
        let mut post = self
            .posts
            .get_by_slug(slug)
            .await?
            .ok_or(PostServiceError::NotFound)?;

        if !post.can_be_viewed_by(viewer, now) {
            return Err(PostServiceError::Forbidden);
        }

        self.posts.increment_view_count(post.id).await?;
        post.view_count += 1;

        let comments = build_thread(self.comments.list_for_post(post.id).await?);
        let comments_count = self.comments.count_for_post(post.id).await?;
        let can_edit = viewer.is_some_and(|user| post.can_be_modified_by(user));

        Ok(PostDetail {
            post,
            comments,
            comments_count,
            can_edit,
        })
    }

    /// Visible posts plus the viewer's own, newest publication first
    pub async fn index(&self, viewer: Option<&User>, page: u32) -> Result<PagedResult<Post>> {
        let now = self.clock.now();
        let params = ListParams::new(page, self.per_page);
        let viewer_id = viewer.map(|user| user.id);

        let items = self
            .posts
            .list_for_viewer(viewer_id, now, params.offset(), params.limit())
            .await?;
        let total = self.posts.count_for_viewer(viewer_id, now).await?;

        Ok(PagedResult::new(items, total, &params))
    }

    /// Public home page: featured posts, a filtered page and the non-empty
    /// categories
    pub async fn home(&self, filter: PostFilter, page: u32) -> Result<HomePage> {
        let now = self.clock.now();
        let filter = filter.normalized();
        let params = ListParams::new(page, HOME_PER_PAGE);

        let featured = self
            .posts
            .list_visible(&PostFilter::default(), now, 0, FEATURED_COUNT)
            .await?;

        let items = self
            .posts
            .list_visible(&filter, now, params.offset(), params.limit())
            .await?;
        let total = self.posts.count_visible(&filter, now).await?;

        let categories = self.categories.list_with_visible_posts(now).await?;

        Ok(HomePage {
            featured,
            posts: PagedResult::new(items, total, &params),
            categories,
            filters: filter,
        })
    }

    /// Every post of the author, whatever its status
    pub async fn my_posts(&self, author: &User, params: ListParams) -> Result<PagedResult<Post>> {
        let items = self
            .posts
            .list_by_author(author.id, params.offset(), params.limit())
            .await?;
        let total = self.posts.count_by_author(author.id).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    /// Most viewed visible posts
    pub async fn popular(&self, limit: i64) -> Result<Vec<Post>> {
        Ok(self
            .posts
            .list_popular(self.clock.now(), limit.max(0))
            .await?)
    }

    async fn find(&self, id: i64) -> Result<Post> {
        self.posts
            .get_by_id(id)
            .await?
            .ok_or(PostServiceError::NotFound)
    }

    async fn unique_slug(&self, title: &str) -> Result<String> {
        let base = slug::slugify_or(title, "article");
        for candidate in slug::candidates(&base) {
            if !self.posts.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(anyhow::anyhow!("No free slug for {}", base).into())
    }

    async fn validate_categories(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let found = self.categories.existing_ids(ids).await?;
        if ids.iter().any(|id| !found.contains(id)) {
            return Err(PostServiceError::ValidationError(
                "Une des catégories sélectionnées n'existe pas.".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_text(title: &str, excerpt: &str, content: &str) -> Result<()> {
    let invalid = |message: &str| Err(PostServiceError::ValidationError(message.to_string()));

    if title.trim().is_empty() {
        return invalid("Le titre est obligatoire.");
    }
    if title.trim().chars().count() > TITLE_MAX_LENGTH {
        return invalid("Le titre ne peut pas dépasser 255 caractères.");
    }
    if excerpt.trim().is_empty() {
        return invalid("L'extrait est obligatoire.");
    }
    if excerpt.trim().chars().count() > EXCERPT_MAX_LENGTH {
        return invalid("L'extrait ne peut pas dépasser 500 caractères.");
    }
    if content.trim().is_empty() {
        return invalid("Le contenu est obligatoire.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, Comment};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    struct Harness {
        service: PostService,
        categories: Arc<dyn CategoryRepository>,
        comments: Arc<dyn CommentRepository>,
        clock: Arc<FixedClock>,
        author: User,
        reader: User,
    }

    async fn harness() -> Harness {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let mut author = users
            .create(&User::new("Camille".into(), "camille@example.fr".into(), "h".into(), start()))
            .await
            .unwrap();
        let mut reader = users
            .create(&User::new("Dominique".into(), "dom@example.fr".into(), "h".into(), start()))
            .await
            .unwrap();
        for user in [&mut author, &mut reader] {
            users.mark_email_verified(user.id, start()).await.unwrap();
            user.email_verified_at = Some(start());
        }

        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let comments = SqlxCommentRepository::boxed(pool.clone());
        let clock = FixedClock::shared(start());
        let service = PostService::new(
            SqlxPostRepository::boxed(pool),
            categories.clone(),
            comments.clone(),
            clock.clone(),
        );

        Harness {
            service,
            categories,
            comments,
            clock,
            author,
            reader,
        }
    }

    fn input(title: &str) -> CreatePostInput {
        CreatePostInput::new(title, "Un résumé", "Le contenu de l'article")
    }

    fn existing(published_at: Option<DateTime<Utc>>) -> Post {
        Post {
            id: 1,
            user_id: 1,
            slug: "s".into(),
            title: "T".into(),
            excerpt: "E".into(),
            content: "C".into(),
            status: PostStatus::Published,
            published_at,
            view_count: 0,
            created_at: start(),
            updated_at: start(),
            deleted_at: None,
            author_name: None,
            categories: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_published_keeps_existing_date() {
        let original = start() - Duration::days(30);
        let post = existing(Some(original));

        assert_eq!(
            resolve_published_at(PostStatus::Published, None, Some(&post), start()),
            Some(original)
        );
        assert_eq!(
            resolve_published_at(PostStatus::Published, Some(start()), Some(&post), start()),
            Some(original)
        );
    }

    #[test]
    fn test_resolve_published_first_time() {
        let requested = start() - Duration::days(2);
        assert_eq!(
            resolve_published_at(PostStatus::Published, None, None, start()),
            Some(start())
        );
        assert_eq!(
            resolve_published_at(PostStatus::Published, Some(requested), None, start()),
            Some(requested)
        );
        assert_eq!(
            resolve_published_at(PostStatus::Published, None, Some(&existing(None)), start()),
            Some(start())
        );
    }

    #[test]
    fn test_resolve_scheduled_and_unpublished() {
        let tomorrow = start() + Duration::days(1);
        assert_eq!(
            resolve_published_at(PostStatus::Scheduled, Some(tomorrow), None, start()),
            Some(tomorrow)
        );
        assert_eq!(resolve_published_at(PostStatus::Scheduled, None, None, start()), None);

        let post = existing(Some(start()));
        assert_eq!(
            resolve_published_at(PostStatus::Draft, Some(tomorrow), Some(&post), start()),
            None
        );
        assert_eq!(
            resolve_published_at(PostStatus::Archived, None, Some(&post), start()),
            None
        );
    }

    #[test]
    fn test_batch_deleted_message() {
        assert_eq!(batch_deleted_message(1), "1 article supprimé avec succès.");
        assert_eq!(batch_deleted_message(3), "3 articles supprimés avec succès.");
    }

    #[tokio::test]
    async fn test_create_defaults_to_draft() {
        let h = harness().await;
        let post = h.service.create(&h.author, input("Premier billet")).await.unwrap();

        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.published_at, None);
        assert_eq!(post.slug, "premier-billet");
        assert_eq!(post.author_name.as_deref(), Some("Camille"));
    }

    #[tokio::test]
    async fn test_create_requires_verified_email() {
        let h = harness().await;
        let unverified = User {
            email_verified_at: None,
            ..h.author.clone()
        };
        let err = h.service.create(&unverified, input("Titre")).await.unwrap_err();
        assert!(matches!(err, PostServiceError::EmailNotVerified));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let h = harness().await;

        let err = h
            .service
            .create(&h.author, CreatePostInput::new(" ", "E", "C"))
            .await
            .unwrap_err();
        assert!(matches!(err, PostServiceError::ValidationError(ref m) if m == "Le titre est obligatoire."));

        let err = h
            .service
            .create(&h.author, CreatePostInput::new("T", "e".repeat(501), "C"))
            .await
            .unwrap_err();
        assert!(matches!(err, PostServiceError::ValidationError(_)));

        let err = h
            .service
            .create(&h.author, input("T").with_categories(vec![42]))
            .await
            .unwrap_err();
        assert!(matches!(err, PostServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_slugs_are_unique_and_stable() {
        let h = harness().await;
        let first = h.service.create(&h.author, input("Été à Paris")).await.unwrap();
        let second = h.service.create(&h.author, input("Été à Paris")).await.unwrap();
        let third = h.service.create(&h.author, input("Été à Paris")).await.unwrap();

        assert_eq!(first.slug, "ete-a-paris");
        assert_eq!(second.slug, "ete-a-paris-2");
        assert_eq!(third.slug, "ete-a-paris-3");

        let updated = h
            .service
            .update(&h.author, first.id, UpdatePostInput::new("Hiver à Lyon", "E", "C"))
            .await
            .unwrap();
        assert_eq!(updated.slug, "ete-a-paris");
        assert_eq!(updated.title, "Hiver à Lyon");

        let empty = h.service.create(&h.author, input("!!!")).await.unwrap();
        assert_eq!(empty.slug, "article");
    }

    #[tokio::test]
    async fn test_republishing_keeps_publication_date() {
        let h = harness().await;
        let post = h
            .service
            .create(&h.author, input("Billet").with_status(PostStatus::Published))
            .await
            .unwrap();
        assert_eq!(post.published_at, Some(start()));

        h.clock.advance(Duration::days(3));
        let edited = h
            .service
            .update(&h.author, post.id, UpdatePostInput::new("Billet corrigé", "E", "C"))
            .await
            .unwrap();
        assert_eq!(edited.status, PostStatus::Published);
        assert_eq!(edited.published_at, Some(start()));

        let unpublished = h
            .service
            .update(
                &h.author,
                post.id,
                UpdatePostInput::new("Billet", "E", "C").with_status(PostStatus::Draft),
            )
            .await
            .unwrap();
        assert_eq!(unpublished.published_at, None);
    }

    #[tokio::test]
    async fn test_only_author_modifies() {
        let h = harness().await;
        let post = h.service.create(&h.author, input("Billet")).await.unwrap();

        let err = h
            .service
            .update(&h.reader, post.id, UpdatePostInput::new("X", "E", "C"))
            .await
            .unwrap_err();
        assert!(matches!(err, PostServiceError::Forbidden));

        let err = h.service.delete(&h.reader, post.id).await.unwrap_err();
        assert!(matches!(err, PostServiceError::Forbidden));

        h.service.delete(&h.author, post.id).await.unwrap();
        let err = h.service.delete(&h.author, post.id).await.unwrap_err();
        assert!(matches!(err, PostServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_batch_delete_only_removes_owned_posts() {
        let h = harness().await;
        let mine = h.service.create(&h.author, input("A")).await.unwrap();
        let also_mine = h.service.create(&h.author, input("B")).await.unwrap();
        let theirs = h.service.create(&h.reader, input("C")).await.unwrap();

        let deleted = h
            .service
            .batch_delete(&h.author, &[mine.id, also_mine.id, theirs.id])
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let err = h.service.batch_delete(&h.author, &[theirs.id]).await.unwrap_err();
        assert!(matches!(err, PostServiceError::NothingDeleted));
        assert_eq!(err.to_string(), "Aucun article n'a pu être supprimé.");

        let err = h.service.batch_delete(&h.author, &[]).await.unwrap_err();
        assert!(matches!(err, PostServiceError::ValidationError(_)));

        let err = h.service.batch_delete(&h.author, &[9999]).await.unwrap_err();
        assert!(matches!(err, PostServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_show_applies_view_policy_and_threads_comments() {
        let h = harness().await;
        let draft = h.service.create(&h.author, input("Brouillon")).await.unwrap();

        let err = h.service.show(None, &draft.slug).await.unwrap_err();
        assert!(matches!(err, PostServiceError::Forbidden));
        let err = h.service.show(Some(&h.reader), &draft.slug).await.unwrap_err();
        assert!(matches!(err, PostServiceError::Forbidden));

        let own = h.service.show(Some(&h.author), &draft.slug).await.unwrap();
        assert!(own.can_edit);
        assert_eq!(own.post.view_count, 1);

        let live = h
            .service
            .create(&h.author, input("Publié").with_status(PostStatus::Published))
            .await
            .unwrap();
        let root = h
            .comments
            .create(&Comment {
                id: 0,
                post_id: live.id,
                user_id: h.reader.id,
                parent_id: None,
                content: "Bravo".into(),
                created_at: start(),
                updated_at: start(),
            })
            .await
            .unwrap();
        h.comments
            .create(&Comment {
                id: 0,
                post_id: live.id,
                user_id: h.author.id,
                parent_id: Some(root.id),
                content: "Merci".into(),
                created_at: start() + Duration::minutes(1),
                updated_at: start() + Duration::minutes(1),
            })
            .await
            .unwrap();

        let detail = h.service.show(None, &live.slug).await.unwrap();
        assert!(!detail.can_edit);
        assert_eq!(detail.comments_count, 2);
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.comments[0].replies[0].comment.content, "Merci");

        let err = h.service.show(None, "inconnu").await.unwrap_err();
        assert!(matches!(err, PostServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_index_mixes_visible_and_own_posts() {
        let h = harness().await;
        h.service
            .create(&h.author, input("Public").with_status(PostStatus::Published))
            .await
            .unwrap();
        h.service.create(&h.author, input("Brouillon")).await.unwrap();
        h.service.create(&h.reader, input("Autre brouillon")).await.unwrap();

        assert_eq!(h.service.index(None, 1).await.unwrap().total, 1);
        assert_eq!(h.service.index(Some(&h.author), 1).await.unwrap().total, 2);
        assert_eq!(h.service.index(Some(&h.reader), 1).await.unwrap().total, 2);

        let mine = h.service.my_posts(&h.author, ListParams::default()).await.unwrap();
        assert_eq!(mine.total, 2);
    }

    #[tokio::test]
    async fn test_home_page() {
        let h = harness().await;
        let travel = h
            .categories
            .create(&Category {
                id: 0,
                name: "Voyages".into(),
                slug: "voyages".into(),
                description: None,
                created_at: start(),
                updated_at: start(),
            })
            .await
            .unwrap();

        for i in 0..7 {
            h.service
                .create(
                    &h.author,
                    input(&format!("Escale {}", i))
                        .with_status(PostStatus::Published)
                        .with_published_at(start() - Duration::hours(10 - i))
                        .with_categories(if i == 0 { vec![travel.id] } else { vec![] }),
                )
                .await
                .unwrap();
        }
        h.service
            .create(
                &h.author,
                input("Demain")
                    .with_status(PostStatus::Scheduled)
                    .with_published_at(start() + Duration::days(1)),
            )
            .await
            .unwrap();

        let home = h.service.home(PostFilter::default(), 1).await.unwrap();
        assert_eq!(home.featured.len(), 5);
        assert_eq!(home.featured[0].title, "Escale 6");
        assert_eq!(home.posts.total, 7);
        assert_eq!(home.categories.len(), 1);
        assert_eq!(home.categories[0].posts_count, 1);

        let filtered = h
            .service
            .home(PostFilter::default().category("voyages").search(" "), 1)
            .await
            .unwrap();
        assert_eq!(filtered.posts.total, 1);
        assert_eq!(filtered.filters.search, None);

        let searched = h
            .service
            .home(PostFilter::default().search("Escale 3"), 1)
            .await
            .unwrap();
        assert_eq!(searched.posts.items.len(), 1);
    }

    #[tokio::test]
    async fn test_popular_orders_by_views() {
        let h = harness().await;
        let a = h
            .service
            .create(&h.author, input("A").with_status(PostStatus::Published))
            .await
            .unwrap();
        let b = h
            .service
            .create(&h.author, input("B").with_status(PostStatus::Published))
            .await
            .unwrap();

        h.service.show(None, &b.slug).await.unwrap();
        h.service.show(None, &b.slug).await.unwrap();
        h.service.show(None, &a.slug).await.unwrap();

        let popular = h.service.popular(10).await.unwrap();
        assert_eq!(popular[0].id, b.id);
        assert_eq!(popular[0].view_count, 2);
    }

    fn any_status() -> impl Strategy<Value = PostStatus> {
        prop_oneof![
            Just(PostStatus::Draft),
            Just(PostStatus::Published),
            Just(PostStatus::Scheduled),
            Just(PostStatus::Archived),
        ]
    }

    proptest! {
        #[test]
        fn only_published_and_scheduled_keep_a_date(
            status in any_status(),
            requested in proptest::option::of(-100_000i64..100_000),
        ) {
            let requested = requested.map(|s| start() + Duration::seconds(s));
            let resolved = resolve_published_at(status, requested, None, start());
            match status {
                PostStatus::Published => prop_assert_eq!(resolved, Some(requested.unwrap_or(start()))),
                PostStatus::Scheduled => prop_assert_eq!(resolved, requested),
                PostStatus::Draft | PostStatus::Archived => prop_assert_eq!(resolved, None),
            }
        }

        #[test]
        fn published_prefers_the_existing_date(existing_offset in proptest::option::of(-100_000i64..100_000)) {
            let post = existing(existing_offset.map(|s| start() + Duration::seconds(s)));
            let resolved = resolve_published_at(PostStatus::Published, None, Some(&post), start());
            prop_assert!(resolved.is_some());
            prop_assert_eq!(resolved, post.published_at.or(Some(start())));
        }
    }
}
