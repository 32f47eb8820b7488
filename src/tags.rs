use std::collections::HashSet;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BlogError, Result};
use crate::posts::Post;
use crate::slug::slugify;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tag {
    pub id: u64, // 0 until stored
    pub name: String,
    pub slug: String,
    pub hidden: bool,
    pub created_at: NaiveDateTime,
    pub created_by: u64,
    pub updated_at: Option<NaiveDateTime>,
    pub updated_by: u64,
}

impl Tag {
    /// A proposed tag, slug derived from the name.
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        Tag {
            id: 0,
            name: name.to_string(),
            slug: slugify(name),
            hidden: false,
            created_at: Utc::now().naive_utc(),
            created_by: 0,
            updated_at: None,
            updated_by: 0,
        }
    }

    pub fn url(&self) -> String {
        format!("/tag/{}", self.slug)
    }
}

/// Builds proposed tags from a form value such as `"news, tech,outdoors"`.
/// Blank entries and names without any slug characters are skipped.
pub fn tags_from_comma_string(input: &str) -> Vec<Tag> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Tag::new)
        .filter(|tag| !tag.slug.is_empty())
        .collect()
}

/// Names joined for display in an edit form.
pub fn tag_string(tags: &[Tag]) -> String {
    tags.iter()
        .map(|tag| tag.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Finds or creates the catalog row for `proposed` and settles its
/// visibility against the post being saved.
///
/// A tag is unhidden as soon as a published post uses it. It is hidden
/// again only when no published post links to it any more, never merely
/// because the current post is a draft.
fn resolve_tag<S: Store + ?Sized>(store: &mut S, proposed: &Tag, post: &Post) -> Result<Tag> {
    let want_hidden = !post.is_published;
    let now = Utc::now().naive_utc();

    let Some(mut existing) = store.tag_by_slug(&proposed.slug)? else {
        let mut tag = proposed.clone();
        tag.hidden = want_hidden;
        tag.created_at = now;
        tag.created_by = post.created_by;
        tag.id = store.insert_tag(&tag)?;
        tracing::debug!("inserted tag {} ({})", tag.slug, tag.id);
        return Ok(tag);
    };

    let hide = match (existing.hidden, want_hidden) {
        (true, false) => Some(false),
        (false, true) if !store.tag_has_published_post(existing.id)? => Some(true),
        _ => None,
    };
    if let Some(hidden) = hide {
        store.set_tag_hidden(existing.id, hidden, now, post.created_by)?;
        existing.hidden = hidden;
        existing.updated_at = Some(now);
        existing.updated_by = post.created_by;
        tracing::debug!("tag {} hidden={}", existing.slug, hidden);
    }
    Ok(existing)
}

/// Resolves every proposed tag, then replaces all link rows of the post.
///
/// Links are deleted and reinserted rather than diffed. Callers run this
/// inside the post's save transaction.
pub fn associate_tags<S: Store + ?Sized>(store: &mut S, post: &Post, tags: &[Tag]) -> Result<Vec<Tag>> {
    let post_id = post.id.ok_or_else(|| {
        BlogError::Validation("tags can only be linked to a saved post".to_string())
    })?;

    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(tags.len());
    for proposed in tags {
        if proposed.slug.is_empty() || !seen.insert(proposed.slug.as_str()) {
            continue;
        }
        resolved.push(resolve_tag(store, proposed, post)?);
    }

    store.delete_post_tags(post_id)?;
    for tag in &resolved {
        store.insert_post_tag(post_id, tag.id)?;
    }
    tracing::info!("post {} linked to {} tags", post_id, resolved.len());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::posts::save_post;
    use crate::store::{Database, Transaction};
    use assert_matches::assert_matches;

    fn save(db: &MemoryDatabase, post: &mut Post, tags: &[&str]) -> Result<Vec<Tag>> {
        let tags: Vec<Tag> = tags.iter().map(|name| Tag::new(name)).collect();
        let mut tx = db.begin()?;
        let saved = save_post(&mut tx, post, &tags)?;
        tx.commit()?;
        Ok(saved)
    }

    fn linked(db: &MemoryDatabase, post: &Post) -> Vec<String> {
        let mut tx = db.begin().unwrap();
        tx.tags_by_post(post.id.unwrap())
            .unwrap()
            .into_iter()
            .map(|tag| tag.slug)
            .collect()
    }

    fn hidden(db: &MemoryDatabase, slug: &str) -> bool {
        let mut tx = db.begin().unwrap();
        tx.tag_by_slug(slug).unwrap().unwrap().hidden
    }

    #[test]
    fn parses_comma_string() {
        let tags = tags_from_comma_string(" News, tech,, ,Rust Lang ");
        let slugs: Vec<_> = tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, ["news", "tech", "rust-lang"]);
        assert_eq!(tag_string(&tags), "News, tech, Rust Lang");
    }

    #[test]
    fn resave_replaces_links() {
        let db = MemoryDatabase::new();
        let mut post = Post::new("One", "one");
        save(&db, &mut post, &["news", "tech"]).unwrap();
        assert_eq!(linked(&db, &post), ["news", "tech"]);

        save(&db, &mut post, &["tech"]).unwrap();
        assert_eq!(linked(&db, &post), ["tech"]);
        assert_eq!(db.link_count(), 1);

        // Unlinked tags stay in the catalog.
        let mut tx = db.begin().unwrap();
        assert!(tx.tag_by_slug("news").unwrap().is_some());
    }

    #[test]
    fn duplicate_proposals_link_once() {
        let db = MemoryDatabase::new();
        let mut post = Post::new("One", "one");
        let saved = save(&db, &mut post, &["Tech", "tech", "TECH"]).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(db.link_count(), 1);
    }

    #[test]
    fn resave_is_idempotent() {
        let db = MemoryDatabase::new();
        let mut post = Post::new("One", "one");
        save(&db, &mut post, &["a", "b"]).unwrap();
        save(&db, &mut post, &["a", "b"]).unwrap();
        assert_eq!(linked(&db, &post), ["a", "b"]);
        assert_eq!(db.link_count(), 2);
    }

    #[test]
    fn tag_of_drafts_stays_hidden() {
        let db = MemoryDatabase::new();
        let mut one = Post::new("One", "one");
        let mut two = Post::new("Two", "two");
        save(&db, &mut one, &["draft-only"]).unwrap();
        save(&db, &mut two, &["draft-only"]).unwrap();
        assert!(hidden(&db, "draft-only"));
    }

    #[test]
    fn tag_visibility_follows_published_posts() {
        let db = MemoryDatabase::new();
        let mut one = Post::new("One", "one");
        let mut two = Post::new("Two", "two");
        save(&db, &mut one, &["shared"]).unwrap();
        assert!(hidden(&db, "shared"));

        one.is_published = true;
        save(&db, &mut one, &["shared"]).unwrap();
        assert!(!hidden(&db, "shared"));

        two.is_published = true;
        save(&db, &mut two, &["shared"]).unwrap();

        // One published post still references the tag.
        one.is_published = false;
        save(&db, &mut one, &["shared"]).unwrap();
        assert!(!hidden(&db, "shared"));

        // Last published reference gone.
        two.is_published = false;
        save(&db, &mut two, &["shared"]).unwrap();
        assert!(hidden(&db, "shared"));
    }

    #[test]
    fn failed_link_insert_rolls_back_everything() {
        let db = MemoryDatabase::new();
        let mut post = Post::new("One", "one");
        save(&db, &mut post, &["news", "tech"]).unwrap();
        let before = linked(&db, &post);

        db.fail_link_inserts(true);
        post.title = "One, edited".to_string();
        assert_matches!(
            save(&db, &mut post, &["rust", "tech"]),
            Err(BlogError::Persistence(_))
        );
        db.fail_link_inserts(false);

        assert_eq!(linked(&db, &post), before);
        let mut tx = db.begin().unwrap();
        assert!(tx.tag_by_slug("rust").unwrap().is_none());
        assert_eq!(tx.post_by_id(post.id.unwrap()).unwrap().unwrap().title, "One");
    }

    #[test]
    fn unsaved_post_cannot_be_linked() {
        let db = MemoryDatabase::new();
        let post = Post::new("One", "one");
        let mut tx = db.begin().unwrap();
        assert_matches!(
            associate_tags(&mut tx, &post, &[Tag::new("x")]),
            Err(BlogError::Validation(_))
        );
    }
}
