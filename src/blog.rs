//! The entry point used by the web layer.
//!
//! [`Blog`] owns the storage handle and runs every operation inside its own
//! transaction: committed when the operation succeeds, rolled back when it
//! fails.

use crate::comments::{self, Comment, CommentDraft, CommentListing, CommentThread};
use crate::error::{BlogError, Result};
use crate::messages::{self, Message};
use crate::pager::Pager;
use crate::posts::{self, Post};
use crate::store::{Database, Store, Transaction};
use crate::tags::Tag;

/// Unread messages shown on the admin dashboard.
const UNREAD_LIMIT: u64 = 10;

pub struct Blog<D> {
    db: D,
}

impl<D: Database> Blog<D> {
    pub fn new(db: D) -> Self {
        Blog { db }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    fn in_transaction<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut D::Tx) -> Result<T>,
    ) -> Result<T> {
        let mut tx = self.db.begin()?;
        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tracing::error!("{} failed, rolling back: {}", operation, err);
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!("{} rollback failed: {}", operation, rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Saves the post, resolving its slug and replacing its tag links.
    /// Returns the saved post with its id and final slug.
    pub fn save_post(&self, mut post: Post, tags: &[Tag]) -> Result<Post> {
        self.in_transaction("save_post", |tx| {
            posts::save_post(tx, &mut post, tags)?;
            Ok(())
        })?;
        Ok(post)
    }

    pub fn delete_post(&self, id: u64) -> Result<()> {
        self.in_transaction("delete_post", |tx| posts::delete_post(tx, id))
    }

    pub fn post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        self.in_transaction("post_by_slug", |tx| tx.post_by_slug(slug))
    }

    pub fn list_posts(
        &self,
        page: u64,
        page_size: u64,
        only_pages: bool,
        only_published: bool,
        order_by: &str,
    ) -> Result<(Vec<Post>, Pager)> {
        self.in_transaction("list_posts", |tx| {
            posts::list_posts(tx, page, page_size, only_pages, only_published, order_by)
        })
    }

    pub fn list_posts_by_tag(
        &self,
        tag_slug: &str,
        page: u64,
        page_size: u64,
        only_published: bool,
    ) -> Result<(Tag, Vec<Post>, Pager)> {
        self.in_transaction("list_posts_by_tag", |tx| {
            let tag = tx
                .tag_by_slug(tag_slug)?
                .ok_or_else(|| BlogError::UnknownSlug {
                    entity: "tag",
                    slug: tag_slug.to_string(),
                })?;
            let (posts, pager) =
                posts::list_posts_by_tag(tx, tag.id, page, page_size, only_published)?;
            Ok((tag, posts, pager))
        })
    }

    pub fn tags_for_post(&self, post_id: u64) -> Result<Vec<Tag>> {
        self.in_transaction("tags_for_post", |tx| tx.tags_by_post(post_id))
    }

    pub fn comment_thread(&self, post_id: u64) -> Result<CommentThread> {
        self.in_transaction("comment_thread", |tx| comments::build_thread(tx, post_id))
    }

    pub fn submit_comment(&self, draft: CommentDraft, approved: bool) -> Result<Comment> {
        self.in_transaction("submit_comment", |tx| {
            comments::submit_comment(tx, draft, approved)
        })
    }

    pub fn list_comments(
        &self,
        page: u64,
        page_size: u64,
        only_approved: bool,
    ) -> Result<(Vec<CommentListing>, Pager)> {
        self.in_transaction("list_comments", |tx| {
            comments::list_comments(tx, page, page_size, only_approved)
        })
    }

    pub fn set_comment_approved(&self, id: u64, approved: bool) -> Result<()> {
        self.in_transaction("set_comment_approved", |tx| {
            comments::set_comment_approved(tx, id, approved)
        })
    }

    pub fn delete_comment(&self, id: u64) -> Result<()> {
        self.in_transaction("delete_comment", |tx| comments::delete_comment(tx, id))
    }

    pub fn unread_messages(&self) -> Result<Vec<Message>> {
        self.in_transaction("unread_messages", |tx| {
            messages::unread_messages(tx, UNREAD_LIMIT)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::CommentNode;
    use crate::memory::MemoryDatabase;
    use crate::tags::tags_from_comma_string;
    use assert_matches::assert_matches;

    fn blog() -> Blog<MemoryDatabase> {
        Blog::new(MemoryDatabase::new())
    }

    fn published(title: &str, slug: &str) -> Post {
        let mut post = Post::new(title, slug);
        post.is_published = true;
        post
    }

    #[test]
    fn save_then_retag_keeps_only_new_links() {
        let blog = blog();
        let post = blog
            .save_post(published("News", "news-post"), &tags_from_comma_string("news, tech"))
            .unwrap();
        let post = blog.save_post(post, &tags_from_comma_string("tech")).unwrap();

        let tags = blog.tags_for_post(post.id.unwrap()).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].slug, "tech");
        assert_eq!(blog.database().link_count(), 1);
    }

    #[test]
    fn failed_save_rolls_back_post_row() {
        let blog = blog();
        blog.database().fail_link_inserts(true);
        assert_matches!(
            blog.save_post(published("One", "one"), &tags_from_comma_string("a")),
            Err(BlogError::Persistence(_))
        );
        blog.database().fail_link_inserts(false);
        assert!(blog.post_by_slug("one").unwrap().is_none());
    }

    #[test]
    fn listing_and_tag_listing() {
        let blog = blog();
        for i in 0..3 {
            blog.save_post(published(&format!("P{i}"), &format!("p{i}")), &tags_from_comma_string("rust"))
                .unwrap();
        }
        let (posts, pager) = blog.list_posts(1, 2, false, true, "published_at DESC").unwrap();
        assert_eq!(posts.len(), 2);
        assert!(pager.has_next());

        let (tag, posts, _) = blog.list_posts_by_tag("rust", 2, 2, true).unwrap();
        assert_eq!(tag.slug, "rust");
        assert_eq!(posts.len(), 1);
        assert_matches!(
            blog.list_posts_by_tag("missing", 1, 2, true),
            Err(BlogError::UnknownSlug { entity: "tag", .. })
        );
    }

    #[test]
    fn comment_round_trip_through_context() {
        let blog = blog();
        let post = blog.save_post(published("Talk", "talk"), &[]).unwrap();
        let draft = CommentDraft {
            post_id: post.id.unwrap(),
            author: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            website: Some("https://ann.example.com".to_string()),
            content: "<p>First!</p>".to_string(),
            parent_id: 0,
        };
        let root = blog.submit_comment(draft.clone(), true).unwrap();
        let reply = blog
            .submit_comment(CommentDraft { parent_id: root.id, ..draft }, true)
            .unwrap();

        let thread = blog.comment_thread(post.id.unwrap()).unwrap();
        assert_matches!(&thread.roots[..], [CommentNode::Comment { children, .. }] if children.len() == 1);

        let unread = blog.unread_messages().unwrap();
        assert_eq!(unread.len(), 2);
        assert_eq!(unread[0].kind, "reply");
        assert!(unread[0].data.contains("First!"));

        blog.delete_comment(root.id).unwrap();
        let thread = blog.comment_thread(post.id.unwrap()).unwrap();
        assert_matches!(&thread.roots[..], [CommentNode::Placeholder { .. }]);
        assert_eq!(thread.roots[0].children()[0].comment().unwrap().id, reply.id);
    }
}
