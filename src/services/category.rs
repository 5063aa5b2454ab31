//! Category service
//!
//! Listing and category pages are public. Changes are reserved to
//! administrators.

use crate::clock::DynClock;
use crate::db::repositories::{CategoryRepository, PostRepository};
use crate::models::{
    Category, CategoryDetail, CategoryWithCount, CreateCategoryInput, ListParams, PagedResult,
    UpdateCategoryInput, User,
};
use crate::services::slug;
use std::sync::Arc;

/// Page size of the category index
pub const CATEGORIES_PER_PAGE: u32 = 15;
/// Posts shown on a category page
pub const CATEGORY_POSTS_LIMIT: i64 = 10;

const NAME_MAX_LENGTH: usize = 255;
const DESCRIPTION_MAX_LENGTH: usize = 1000;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    /// Invalid input, with the French message to show
    #[error("{0}")]
    ValidationError(String),

    #[error("Ce slug est déjà utilisé par une autre catégorie.")]
    DuplicateSlug,

    #[error("Impossible de supprimer cette catégorie car elle contient des articles.")]
    HasPosts,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, CategoryServiceError>;

pub struct CategoryService {
    categories: Arc<dyn CategoryRepository>,
    posts: Arc<dyn PostRepository>,
    clock: DynClock,
}

impl CategoryService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        posts: Arc<dyn PostRepository>,
        clock: DynClock,
    ) -> Self {
        Self {
            categories,
            posts,
            clock,
        }
    }

    /// Categories by name, with their post counts
    pub async fn index(&self, page: u32) -> Result<PagedResult<CategoryWithCount>> {
        let params = ListParams::new(page, CATEGORIES_PER_PAGE);
        let items = self
            .categories
            .list_with_counts(params.offset(), params.limit())
            .await?;
        let total = self.categories.count().await?;
        Ok(PagedResult::new(items, total, &params))
    }

    /// A category with its most recent visible posts
    pub async fn show(&self, slug: &str) -> Result<CategoryDetail> {
        let category = self
            .categories
            .get_by_slug(slug)
            .await?
            .ok_or(CategoryServiceError::NotFound)?;

        let posts = self
            .posts
            .list_visible_in_category(category.id, self.clock.now(), CATEGORY_POSTS_LIMIT)
            .await?;
        let posts_count = self.categories.count_posts(category.id).await?;

        Ok(CategoryDetail {
            category,
            posts_count,
            posts,
        })
    }

    pub async fn create(&self, actor: &User, input: CreateCategoryInput) -> Result<Category> {
        ensure_admin(actor)?;
        let (name, description) = validate(&input.name, input.description.as_deref())?;
        let slug = self.resolve_slug(&name, input.slug.as_deref(), None).await?;

        let now = self.clock.now();
        let category = self
            .categories
            .create(&Category {
                id: 0,
                name,
                slug,
                description,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(category_id = category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    /// Replace name and description. A missing slug is regenerated from
    /// the name.
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category> {
        ensure_admin(actor)?;
        let existing = self.find(id).await?;
        let (name, description) = validate(&input.name, input.description.as_deref())?;
        let slug = self
            .resolve_slug(&name, input.slug.as_deref(), Some(id))
            .await?;

        let updated = self
            .categories
            .update(&Category {
                name,
                slug,
                description,
                updated_at: self.clock.now(),
                ..existing
            })
            .await?;

        tracing::info!(category_id = id, slug = %updated.slug, "Category updated");
        Ok(updated)
    }

    /// Delete a category that no post uses
    pub async fn delete(&self, actor: &User, id: i64) -> Result<()> {
        ensure_admin(actor)?;
        let category = self.find(id).await?;

        let posts = self.categories.count_posts(category.id).await?;
        if posts > 0 {
            tracing::debug!(category_id = id, posts, "Refusing to delete category in use");
            return Err(CategoryServiceError::HasPosts);
        }

        self.categories.delete(category.id).await?;
        tracing::info!(category_id = id, "Category deleted");
        Ok(())
    }

    async fn find(&self, id: i64) -> Result<Category> {
        self.categories
            .get_by_id(id)
            .await?
            .ok_or(CategoryServiceError::NotFound)
    }

    /// An explicit slug must be free; a generated one takes the first free
    /// suffix.
    async fn resolve_slug(
        &self,
        name: &str,
        requested: Option<&str>,
        except_id: Option<i64>,
    ) -> Result<String> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => {
                let slug = slug::slugify(requested);
                if slug.is_empty() {
                    return Err(CategoryServiceError::ValidationError(
                        "Le slug n'est pas valide.".to_string(),
                    ));
                }
                if self.categories.slug_exists(&slug, except_id).await? {
                    return Err(CategoryServiceError::DuplicateSlug);
                }
                Ok(slug)
            }
            None => {
                let base = slug::slugify_or(name, "categorie");
                for candidate in slug::candidates(&base) {
                    if !self.categories.slug_exists(&candidate, except_id).await? {
                        return Ok(candidate);
                    }
                }
                Err(anyhow::anyhow!("No free slug for {}", base).into())
            }
        }
    }
}

fn ensure_admin(actor: &User) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CategoryServiceError::Forbidden)
    }
}

fn validate(name: &str, description: Option<&str>) -> Result<(String, Option<String>)> {
    let invalid = |message: &str| Err(CategoryServiceError::ValidationError(message.to_string()));

    let name = name.trim();
    if name.is_empty() {
        return invalid("Le nom est obligatoire.");
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return invalid("Le nom ne peut pas dépasser 255 caractères.");
    }

    let description = description.map(str::trim).filter(|d| !d.is_empty());
    if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_LENGTH) {
        return invalid("La description ne peut pas dépasser 1000 caractères.");
    }

    Ok((name.to_string(), description.map(str::to_string)))
}
