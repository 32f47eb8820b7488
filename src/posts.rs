use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BlogError, Result};
use crate::order::PostOrder;
use crate::pager::Pager;
use crate::slug::{ensure_unique_slug, trim_slug};
use crate::store::Store;
use crate::tags::{associate_tags, Tag};
use crate::{excerpt, html_to_text};

/// Length of the plain-text excerpt shown in post listings.
pub const EXCERPT_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Post {
    pub id: Option<u64>, // assigned on first save
    pub title: String,
    pub slug: String,
    pub markdown: String,
    pub html: String,
    pub image: String,
    pub is_featured: bool,
    pub is_page: bool,
    pub allow_comment: bool,
    pub is_published: bool,
    pub created_at: NaiveDateTime,
    pub created_by: u64,
    pub updated_at: Option<NaiveDateTime>,
    pub updated_by: u64,
    pub published_at: Option<NaiveDateTime>,
    pub published_by: u64,
}

impl Post {
    /// A new unsaved post, created now.
    pub fn new(title: &str, slug: &str) -> Self {
        Post {
            id: None,
            title: title.to_string(),
            slug: slug.to_string(),
            markdown: String::new(),
            html: String::new(),
            image: String::new(),
            is_featured: false,
            is_page: false,
            allow_comment: true,
            is_published: false,
            created_at: Utc::now().naive_utc(),
            created_by: 0,
            updated_at: None,
            updated_by: 0,
            published_at: None,
            published_by: 0,
        }
    }

    pub fn url(&self) -> String {
        format!("/{}", self.slug)
    }

    /// Plain-text excerpt of the rendered body.
    pub fn excerpt(&self) -> String {
        excerpt(&html_to_text(&self.html), EXCERPT_CHARS)
    }
}

/// Which rows a listing covers. Pages and posts are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostFilter {
    pub only_pages: bool,
    pub only_published: bool,
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        post.is_page == self.only_pages && (!self.only_published || post.is_published)
    }
}

/// Saves `post` and rewrites its tag links.
///
/// Must run inside a transaction: slug resolution, the post row and the
/// link rewrite commit or roll back together.
pub fn save_post<S: Store + ?Sized>(store: &mut S, post: &mut Post, tags: &[Tag]) -> Result<Vec<Tag>> {
    post.slug = trim_slug(&post.slug)?;
    let now = Utc::now().naive_utc();
    post.updated_at = Some(now);
    post.updated_by = post.created_by;

    match post.id {
        None => {
            if post.is_published {
                post.published_at = Some(now);
                post.published_by = post.created_by;
            }
            post.slug = ensure_unique_slug(store, &post.slug)?;
            let id = store.insert_post(post)?;
            post.id = Some(id);
            tracing::info!("save_post inserted post {} with slug {}", id, post.slug);
        }
        Some(id) => {
            let current = store
                .lock_post(id)?
                .ok_or(BlogError::NotFound { entity: "post", id })?;
            if post.slug != current.slug {
                post.slug = ensure_unique_slug(store, &post.slug)?;
            }
            post.created_at = current.created_at;
            if post.is_published && (!current.is_published || current.published_at.is_none()) {
                post.published_at = Some(now);
                post.published_by = post.created_by;
            } else if post.is_published {
                post.published_at = current.published_at;
                post.published_by = current.published_by;
            }
            store.update_post(post)?;
            tracing::info!("save_post updated post {} with slug {}", id, post.slug);
        }
    }

    associate_tags(store, post, tags)
}

/// Removes a post together with its tag links.
pub fn delete_post<S: Store + ?Sized>(store: &mut S, id: u64) -> Result<()> {
    if store.lock_post(id)?.is_none() {
        return Err(BlogError::NotFound { entity: "post", id });
    }
    store.delete_post_tags(id)?;
    store.delete_post(id)?;
    tracing::info!("delete_post removed post {}", id);
    Ok(())
}

fn check_page(page: u64, page_size: u64) -> Result<()> {
    if page == 0 || page_size == 0 {
        return Err(BlogError::InvalidPage { page, page_size });
    }
    Ok(())
}

/// One page of posts (or pages), ordered by an allowlisted key.
pub fn list_posts<S: Store + ?Sized>(
    store: &mut S,
    page: u64,
    page_size: u64,
    only_pages: bool,
    only_published: bool,
    order_by: &str,
) -> Result<(Vec<Post>, Pager)> {
    check_page(page, page_size)?;
    let filter = PostFilter {
        only_pages,
        only_published,
    };
    let total = store.count_posts(&filter)?;
    let pager = Pager::new(page, page_size, total);
    if !pager.is_valid {
        return Err(BlogError::PageNotFound { page });
    }

    let posts = store.list_posts(
        &filter,
        PostOrder::resolve(order_by),
        pager.page_size,
        pager.offset,
    )?;
    Ok((posts, pager))
}

/// One page of the posts linked to a tag, newest publication first.
pub fn list_posts_by_tag<S: Store + ?Sized>(
    store: &mut S,
    tag_id: u64,
    page: u64,
    page_size: u64,
    only_published: bool,
) -> Result<(Vec<Post>, Pager)> {
    check_page(page, page_size)?;
    let total = store.count_posts_by_tag(tag_id, only_published)?;
    let pager = Pager::new(page, page_size, total);
    if !pager.is_valid {
        return Err(BlogError::PageNotFound { page });
    }

    let posts = store.list_posts_by_tag(tag_id, only_published, pager.page_size, pager.offset)?;
    Ok((posts, pager))
}
