//! In-memory [`Database`] used by the tests.
//!
//! A transaction works on a private copy of the tables and publishes it on
//! commit, so an aborted save leaves the committed state untouched.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;

use crate::comments::Comment;
use crate::error::{BlogError, Result};
use crate::messages::Message;
use crate::order::PostOrder;
use crate::posts::{Post, PostFilter};
use crate::store::{Database, Store, Transaction};
use crate::tags::Tag;

#[derive(Debug, Clone, Default)]
struct Tables {
    posts: BTreeMap<u64, Post>,
    tags: BTreeMap<u64, Tag>,
    links: Vec<(u64, u64)>,
    comments: BTreeMap<u64, Comment>,
    messages: BTreeMap<u64, Message>,
    last_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    fail_links: Arc<AtomicBool>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following link insert fail, to exercise rollback.
    pub fn fail_link_inserts(&self, fail: bool) {
        self.fail_links.store(fail, Ordering::SeqCst);
    }

    /// Committed number of post-tag links.
    pub fn link_count(&self) -> usize {
        self.lock().map(|tables| tables.links.len()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| BlogError::Persistence("memory store poisoned".to_string()))
    }
}

impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    fn begin(&self) -> Result<Self::Tx> {
        let working = self.lock()?.clone();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.tables),
            fail_links: Arc::clone(&self.fail_links),
            working,
        })
    }
}

#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Mutex<Tables>>,
    fail_links: Arc<AtomicBool>,
    working: Tables,
}

impl Transaction for MemoryTransaction {
    fn commit(self) -> Result<()> {
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| BlogError::Persistence("memory store poisoned".to_string()))?;
        *shared = self.working;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        Ok(())
    }
}

fn page<T: Clone>(rows: Vec<&T>, limit: u64, offset: u64) -> Vec<T> {
    rows.into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

fn sort_posts(posts: &mut [&Post], order: PostOrder) {
    fn key(post: &Post, order: PostOrder) -> (Option<NaiveDateTime>, u64) {
        let at = match order {
            PostOrder::CreatedAt | PostOrder::CreatedAtDesc => Some(post.created_at),
            PostOrder::UpdatedAt | PostOrder::UpdatedAtDesc => post.updated_at,
            PostOrder::PublishedAt | PostOrder::PublishedAtDesc => post.published_at,
        };
        (at, post.id.unwrap_or_default())
    }
    match order {
        PostOrder::CreatedAt | PostOrder::UpdatedAt | PostOrder::PublishedAt => {
            posts.sort_by_key(|post| key(post, order))
        }
        PostOrder::CreatedAtDesc | PostOrder::UpdatedAtDesc | PostOrder::PublishedAtDesc => {
            posts.sort_by_key(|post| Reverse(key(post, order)))
        }
    }
}

fn newest_first(comments: &mut [&Comment]) {
    comments.sort_by_key(|c| Reverse((c.created_at, c.id)));
}

impl MemoryTransaction {
    fn posts_tagged(&self, tag_id: u64) -> impl Iterator<Item = &Post> + '_ {
        self.working
            .links
            .iter()
            .filter(move |(_, tag)| *tag == tag_id)
            .filter_map(move |(post, _)| self.working.posts.get(post))
    }
}

impl Store for MemoryTransaction {
    fn post_by_id(&mut self, id: u64) -> Result<Option<Post>> {
        Ok(self.working.posts.get(&id).cloned())
    }

    fn post_by_slug(&mut self, slug: &str) -> Result<Option<Post>> {
        Ok(self
            .working
            .posts
            .values()
            .find(|post| post.slug == slug)
            .cloned())
    }

    fn lock_post(&mut self, id: u64) -> Result<Option<Post>> {
        self.post_by_id(id)
    }

    fn insert_post(&mut self, post: &Post) -> Result<u64> {
        if self.working.posts.values().any(|p| p.slug == post.slug) {
            return Err(BlogError::SlugConflict(post.slug.clone()));
        }
        let id = self.working.next_id();
        let mut row = post.clone();
        row.id = Some(id);
        self.working.posts.insert(id, row);
        Ok(id)
    }

    fn update_post(&mut self, post: &Post) -> Result<()> {
        let id = post.id.unwrap_or_default();
        if self
            .working
            .posts
            .values()
            .any(|p| p.slug == post.slug && p.id != post.id)
        {
            return Err(BlogError::SlugConflict(post.slug.clone()));
        }
        match self.working.posts.get_mut(&id) {
            Some(row) => {
                *row = post.clone();
                Ok(())
            }
            None => Err(BlogError::NotFound { entity: "post", id }),
        }
    }

    fn delete_post(&mut self, id: u64) -> Result<()> {
        self.working.posts.remove(&id);
        Ok(())
    }

    fn count_posts(&mut self, filter: &PostFilter) -> Result<u64> {
        Ok(self.working.posts.values().filter(|p| filter.matches(p)).count() as u64)
    }

    fn list_posts(
        &mut self,
        filter: &PostFilter,
        order: PostOrder,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>> {
        let mut rows: Vec<&Post> = self
            .working
            .posts
            .values()
            .filter(|p| filter.matches(p))
            .collect();
        sort_posts(&mut rows, order);
        Ok(page(rows, limit, offset))
    }

    fn count_posts_by_tag(&mut self, tag_id: u64, only_published: bool) -> Result<u64> {
        Ok(self
            .posts_tagged(tag_id)
            .filter(|p| !only_published || p.is_published)
            .count() as u64)
    }

    fn list_posts_by_tag(
        &mut self,
        tag_id: u64,
        only_published: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>> {
        let mut rows: Vec<&Post> = self
            .posts_tagged(tag_id)
            .filter(|p| !only_published || p.is_published)
            .collect();
        sort_posts(&mut rows, PostOrder::PublishedAtDesc);
        Ok(page(rows, limit, offset))
    }

    fn tag_by_slug(&mut self, slug: &str) -> Result<Option<Tag>> {
        Ok(self
            .working
            .tags
            .values()
            .find(|tag| tag.slug == slug)
            .cloned())
    }

    fn insert_tag(&mut self, tag: &Tag) -> Result<u64> {
        let id = self.working.next_id();
        let mut row = tag.clone();
        row.id = id;
        self.working.tags.insert(id, row);
        Ok(id)
    }

    fn set_tag_hidden(
        &mut self,
        tag_id: u64,
        hidden: bool,
        updated_at: NaiveDateTime,
        updated_by: u64,
    ) -> Result<()> {
        let tag = self
            .working
            .tags
            .get_mut(&tag_id)
            .ok_or(BlogError::NotFound {
                entity: "tag",
                id: tag_id,
            })?;
        tag.hidden = hidden;
        tag.updated_at = Some(updated_at);
        tag.updated_by = updated_by;
        Ok(())
    }

    fn tag_has_published_post(&mut self, tag_id: u64) -> Result<bool> {
        Ok(self.posts_tagged(tag_id).any(|p| p.is_published))
    }

    fn tags_by_post(&mut self, post_id: u64) -> Result<Vec<Tag>> {
        Ok(self
            .working
            .links
            .iter()
            .filter(|(post, _)| *post == post_id)
            .filter_map(|(_, tag)| self.working.tags.get(tag).cloned())
            .collect())
    }

    fn delete_post_tags(&mut self, post_id: u64) -> Result<()> {
        self.working.links.retain(|(post, _)| *post != post_id);
        Ok(())
    }

    fn insert_post_tag(&mut self, post_id: u64, tag_id: u64) -> Result<()> {
        if self.fail_links.load(Ordering::SeqCst) {
            return Err(BlogError::Persistence(format!(
                "link insert failed for post {post_id} tag {tag_id}"
            )));
        }
        self.working.links.push((post_id, tag_id));
        Ok(())
    }

    fn comment_by_id(&mut self, id: u64) -> Result<Option<Comment>> {
        Ok(self.working.comments.get(&id).cloned())
    }

    fn top_level_comments(&mut self, post_id: u64) -> Result<Vec<Comment>> {
        let mut rows: Vec<&Comment> = self
            .working
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.approved && c.parent_id == 0)
            .collect();
        newest_first(&mut rows);
        Ok(rows.into_iter().cloned().collect())
    }

    fn replies_for_post(&mut self, post_id: u64) -> Result<Vec<Comment>> {
        let mut rows: Vec<&Comment> = self
            .working
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.approved && c.parent_id != 0)
            .collect();
        newest_first(&mut rows);
        Ok(rows.into_iter().cloned().collect())
    }

    fn insert_comment(&mut self, comment: &Comment) -> Result<u64> {
        let id = self.working.next_id();
        let mut row = comment.clone();
        row.id = id;
        self.working.comments.insert(id, row);
        Ok(id)
    }

    fn set_comment_approved(&mut self, id: u64, approved: bool) -> Result<bool> {
        Ok(match self.working.comments.get_mut(&id) {
            Some(comment) => {
                comment.approved = approved;
                true
            }
            None => false,
        })
    }

    fn delete_comment(&mut self, id: u64) -> Result<bool> {
        Ok(self.working.comments.remove(&id).is_some())
    }

    fn count_comments(&mut self, only_approved: bool) -> Result<u64> {
        Ok(self
            .working
            .comments
            .values()
            .filter(|c| !only_approved || c.approved)
            .count() as u64)
    }

    fn list_comments(
        &mut self,
        only_approved: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Comment>> {
        let mut rows: Vec<&Comment> = self
            .working
            .comments
            .values()
            .filter(|c| !only_approved || c.approved)
            .collect();
        newest_first(&mut rows);
        Ok(page(rows, limit, offset))
    }

    fn insert_message(&mut self, message: &Message) -> Result<u64> {
        let id = self.working.next_id();
        let mut row = message.clone();
        row.id = id;
        self.working.messages.insert(id, row);
        Ok(id)
    }

    fn unread_messages(&mut self, limit: u64) -> Result<Vec<Message>> {
        let mut rows: Vec<&Message> = self
            .working
            .messages
            .values()
            .filter(|m| !m.is_read)
            .collect();
        rows.sort_by_key(|m| Reverse((m.created_at, m.id)));
        Ok(page(rows, limit, 0))
    }
}
