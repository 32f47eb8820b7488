//! The persistence seam.
//!
//! Core operations are written against [`Store`] and never see a connection
//! directly. A [`Database`] hands out transactions; everything a workflow
//! does happens inside one of them.

use chrono::NaiveDateTime;

use crate::comments::Comment;
use crate::error::Result;
use crate::messages::Message;
use crate::order::PostOrder;
use crate::posts::{Post, PostFilter};
use crate::tags::Tag;

pub trait Store {
    // posts

    fn post_by_id(&mut self, id: u64) -> Result<Option<Post>>;
    fn post_by_slug(&mut self, slug: &str) -> Result<Option<Post>>;
    /// Reads the post and holds a write lock on its row until the
    /// transaction ends.
    fn lock_post(&mut self, id: u64) -> Result<Option<Post>>;
    fn insert_post(&mut self, post: &Post) -> Result<u64>;
    fn update_post(&mut self, post: &Post) -> Result<()>;
    fn delete_post(&mut self, id: u64) -> Result<()>;
    fn count_posts(&mut self, filter: &PostFilter) -> Result<u64>;
    fn list_posts(
        &mut self,
        filter: &PostFilter,
        order: PostOrder,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>>;
    fn count_posts_by_tag(&mut self, tag_id: u64, only_published: bool) -> Result<u64>;
    fn list_posts_by_tag(
        &mut self,
        tag_id: u64,
        only_published: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>>;

    // tags

    fn tag_by_slug(&mut self, slug: &str) -> Result<Option<Tag>>;
    fn insert_tag(&mut self, tag: &Tag) -> Result<u64>;
    fn set_tag_hidden(
        &mut self,
        tag_id: u64,
        hidden: bool,
        updated_at: NaiveDateTime,
        updated_by: u64,
    ) -> Result<()>;
    /// True when at least one published post links to the tag.
    fn tag_has_published_post(&mut self, tag_id: u64) -> Result<bool>;
    fn tags_by_post(&mut self, post_id: u64) -> Result<Vec<Tag>>;
    fn delete_post_tags(&mut self, post_id: u64) -> Result<()>;
    fn insert_post_tag(&mut self, post_id: u64, tag_id: u64) -> Result<()>;

    // comments

    fn comment_by_id(&mut self, id: u64) -> Result<Option<Comment>>;
    /// Approved comments with no parent, newest first.
    fn top_level_comments(&mut self, post_id: u64) -> Result<Vec<Comment>>;
    /// Approved comments of the post that reply to another comment.
    fn replies_for_post(&mut self, post_id: u64) -> Result<Vec<Comment>>;
    fn insert_comment(&mut self, comment: &Comment) -> Result<u64>;
    fn set_comment_approved(&mut self, id: u64, approved: bool) -> Result<bool>;
    fn delete_comment(&mut self, id: u64) -> Result<bool>;
    fn count_comments(&mut self, only_approved: bool) -> Result<u64>;
    fn list_comments(&mut self, only_approved: bool, limit: u64, offset: u64)
        -> Result<Vec<Comment>>;

    // messages

    fn insert_message(&mut self, message: &Message) -> Result<u64>;
    fn unread_messages(&mut self, limit: u64) -> Result<Vec<Message>>;
}

/// A unit of work. Dropping it without committing discards its writes.
pub trait Transaction: Store {
    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

pub trait Database {
    type Tx: Transaction;

    fn begin(&self) -> Result<Self::Tx>;
}
