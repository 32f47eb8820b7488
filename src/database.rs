use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use mysql::prelude::{FromValue, Queryable};
use mysql::{params, Opts, Pool, Row, TxOpts, Value};

use crate::comments::Comment;
use crate::config::Config;
use crate::error::{BlogError, Result};
use crate::messages::Message;
use crate::order::PostOrder;
use crate::posts::{Post, PostFilter};
use crate::store::{Database, Store, Transaction};
use crate::tags::Tag;

/// MySQL error code for a duplicate key.
const ER_DUP_ENTRY: u16 = 1062;

const POST_COLUMNS: &str = "id, title, slug, markdown, html, image, featured, page, \
    allow_comment, published, created_at, created_by, updated_at, updated_by, \
    published_at, published_by";

const TAG_COLUMNS: &str =
    "id, name, slug, hidden, created_at, created_by, updated_at, updated_by";

const COMMENT_COLUMNS: &str =
    "id, post_id, author, author_email, author_url, content, approved, parent, created_at";

const MESSAGE_COLUMNS: &str = "id, type, data, is_read, created_at";

/// `parent` may be NULL on older tables; NULL and 0 both mean top-level.
const TOP_LEVEL_PARENT: &str = "(parent = 0 OR parent IS NULL)";
const REPLY_PARENT: &str = "parent IS NOT NULL AND parent <> 0";

pub fn connect_to_database(config: &Config) -> Result<Pool> {
    let opts = Opts::from_url(&config.db_url)
        .map_err(|err| BlogError::Config(format!("invalid DB_URL: {err}")))?;
    let pool = Pool::new_manual(config.pool_min, config.pool_max, opts).map_err(|err| {
        tracing::error!("failed to create connection pool: {:?}", err);
        BlogError::from(err)
    })?;
    tracing::info!("connection pool ready ({}..{})", config.pool_min, config.pool_max);
    Ok(pool)
}

#[derive(Clone)]
pub struct MySqlDatabase {
    pool: Pool,
}

impl MySqlDatabase {
    pub fn new(pool: Pool) -> Self {
        MySqlDatabase { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Database for MySqlDatabase {
    type Tx = MySqlTransaction;

    fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.start_transaction(TxOpts::default())?;
        Ok(MySqlTransaction { tx })
    }
}

pub struct MySqlTransaction {
    tx: mysql::Transaction<'static>,
}

impl Transaction for MySqlTransaction {
    fn commit(self) -> Result<()> {
        Ok(self.tx.commit()?)
    }

    fn rollback(self) -> Result<()> {
        Ok(self.tx.rollback()?)
    }
}

fn column<T: FromValue>(row: &mut Row, name: &str) -> Result<T> {
    match row.take_opt::<T, _>(name) {
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(BlogError::Persistence(format!("column {name}: {err}"))),
        None => Err(BlogError::Persistence(format!("missing column {name}"))),
    }
}

fn datetime_column(row: &mut Row, name: &str) -> Result<Option<NaiveDateTime>> {
    match column::<Value>(row, name)? {
        Value::NULL => Ok(None),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
                .and_then(|date| {
                    date.and_hms_micro_opt(hour.into(), minute.into(), second.into(), micros)
                })
                .map(Some)
                .ok_or_else(|| BlogError::Persistence(format!("column {name}: invalid date")))
        }
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                .map(Some)
                .map_err(|err| BlogError::Persistence(format!("column {name}: {err}")))
        }
        other => Err(BlogError::Persistence(format!(
            "column {name}: unexpected value {other:?}"
        ))),
    }
}

fn required_datetime(row: &mut Row, name: &str) -> Result<NaiveDateTime> {
    datetime_column(row, name)?
        .ok_or_else(|| BlogError::Persistence(format!("column {name} is NULL")))
}

fn datetime_value(at: Option<&NaiveDateTime>) -> Result<Value> {
    let Some(at) = at else {
        return Ok(Value::NULL);
    };
    let year = u16::try_from(at.year())
        .map_err(|_| BlogError::Persistence(format!("date {at} is out of range")))?;
    Ok(Value::Date(
        year,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
        at.nanosecond() / 1_000,
    ))
}

fn post_from_row(mut row: Row) -> Result<Post> {
    Ok(Post {
        id: Some(column(&mut row, "id")?),
        title: column(&mut row, "title")?,
        slug: column(&mut row, "slug")?,
        markdown: column(&mut row, "markdown")?,
        html: column(&mut row, "html")?,
        image: column(&mut row, "image")?,
        is_featured: column(&mut row, "featured")?,
        is_page: column(&mut row, "page")?,
        allow_comment: column(&mut row, "allow_comment")?,
        is_published: column(&mut row, "published")?,
        created_at: required_datetime(&mut row, "created_at")?,
        created_by: column(&mut row, "created_by")?,
        updated_at: datetime_column(&mut row, "updated_at")?,
        updated_by: column::<Option<u64>>(&mut row, "updated_by")?.unwrap_or_default(),
        published_at: datetime_column(&mut row, "published_at")?,
        published_by: column::<Option<u64>>(&mut row, "published_by")?.unwrap_or_default(),
    })
}

fn tag_from_row(mut row: Row) -> Result<Tag> {
    Ok(Tag {
        id: column(&mut row, "id")?,
        name: column(&mut row, "name")?,
        slug: column(&mut row, "slug")?,
        hidden: column(&mut row, "hidden")?,
        created_at: required_datetime(&mut row, "created_at")?,
        created_by: column(&mut row, "created_by")?,
        updated_at: datetime_column(&mut row, "updated_at")?,
        updated_by: column::<Option<u64>>(&mut row, "updated_by")?.unwrap_or_default(),
    })
}

fn comment_from_row(mut row: Row) -> Result<Comment> {
    Ok(Comment {
        id: column(&mut row, "id")?,
        post_id: column(&mut row, "post_id")?,
        author: column(&mut row, "author")?,
        email: column(&mut row, "author_email")?,
        website: column(&mut row, "author_url")?,
        content: column(&mut row, "content")?,
        approved: column(&mut row, "approved")?,
        parent_id: column::<Option<u64>>(&mut row, "parent")?.unwrap_or_default(),
        created_at: required_datetime(&mut row, "created_at")?,
    })
}

fn message_from_row(mut row: Row) -> Result<Message> {
    Ok(Message {
        id: column(&mut row, "id")?,
        kind: column(&mut row, "type")?,
        data: column(&mut row, "data")?,
        is_read: column(&mut row, "is_read")?,
        created_at: required_datetime(&mut row, "created_at")?,
    })
}

fn insert_params(post: &Post) -> Result<mysql::Params> {
    Ok(params! {
        "title" => &post.title,
        "slug" => &post.slug,
        "markdown" => &post.markdown,
        "html" => &post.html,
        "image" => &post.image,
        "featured" => post.is_featured,
        "page" => post.is_page,
        "allow_comment" => post.allow_comment,
        "published" => post.is_published,
        "created_at" => datetime_value(Some(&post.created_at))?,
        "created_by" => post.created_by,
        "updated_at" => datetime_value(post.updated_at.as_ref())?,
        "updated_by" => post.updated_by,
        "published_at" => datetime_value(post.published_at.as_ref())?,
        "published_by" => post.published_by,
    })
}

fn filter_clause(filter: &PostFilter) -> &'static str {
    match (filter.only_pages, filter.only_published) {
        (true, true) => "page = 1 AND published = 1",
        (true, false) => "page = 1",
        (false, true) => "page = 0 AND published = 1",
        (false, false) => "page = 0",
    }
}

/// Maps a duplicate key on the slug index to a conflict.
fn slug_write_error(err: mysql::Error, slug: &str) -> BlogError {
    match err {
        mysql::Error::MySqlError(ref server) if server.code == ER_DUP_ENTRY => {
            BlogError::SlugConflict(slug.to_string())
        }
        other => other.into(),
    }
}

impl MySqlTransaction {
    fn inserted_id(&self, entity: &str) -> Result<u64> {
        self.tx
            .last_insert_id()
            .ok_or_else(|| BlogError::Persistence(format!("no id returned for new {entity}")))
    }

    fn posts(&mut self, query: &str, params: mysql::Params) -> Result<Vec<Post>> {
        self.tx
            .exec::<Row, _, _>(query, params)?
            .into_iter()
            .map(post_from_row)
            .collect()
    }

    fn comments(&mut self, query: &str, params: mysql::Params) -> Result<Vec<Comment>> {
        self.tx
            .exec::<Row, _, _>(query, params)?
            .into_iter()
            .map(comment_from_row)
            .collect()
    }

    fn count(&mut self, query: &str, params: mysql::Params) -> Result<u64> {
        Ok(self.tx.exec_first::<u64, _, _>(query, params)?.unwrap_or_default())
    }
}

impl Store for MySqlTransaction {
    fn post_by_id(&mut self, id: u64) -> Result<Option<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = :id");
        self.tx
            .exec_first::<Row, _, _>(query, params! { "id" => id })?
            .map(post_from_row)
            .transpose()
    }

    fn post_by_slug(&mut self, slug: &str) -> Result<Option<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = :slug");
        self.tx
            .exec_first::<Row, _, _>(query, params! { "slug" => slug })?
            .map(post_from_row)
            .transpose()
    }

    fn lock_post(&mut self, id: u64) -> Result<Option<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = :id FOR UPDATE");
        self.tx
            .exec_first::<Row, _, _>(query, params! { "id" => id })?
            .map(post_from_row)
            .transpose()
    }

    fn insert_post(&mut self, post: &Post) -> Result<u64> {
        self.tx
            .exec_drop(
                "INSERT INTO posts
                    (title, slug, markdown, html, image, featured, page, allow_comment,
                     published, created_at, created_by, updated_at, updated_by,
                     published_at, published_by)
                VALUES
                    (:title, :slug, :markdown, :html, :image, :featured, :page, :allow_comment,
                     :published, :created_at, :created_by, :updated_at, :updated_by,
                     :published_at, :published_by)",
                insert_params(post)?,
            )
            .map_err(|err| slug_write_error(err, &post.slug))?;
        self.inserted_id("post")
    }

    fn update_post(&mut self, post: &Post) -> Result<()> {
        let id = post.id.ok_or_else(|| {
            BlogError::Validation("cannot update a post that was never saved".to_string())
        })?;
        self.tx
            .exec_drop(
                "UPDATE posts SET
                    title = :title, slug = :slug, markdown = :markdown, html = :html,
                    image = :image, featured = :featured, page = :page,
                    allow_comment = :allow_comment, published = :published,
                    created_at = :created_at, created_by = :created_by,
                    updated_at = :updated_at, updated_by = :updated_by,
                    published_at = :published_at, published_by = :published_by
                WHERE id = :id",
                params! {
                    "id" => id,
                    "title" => &post.title,
                    "slug" => &post.slug,
                    "markdown" => &post.markdown,
                    "html" => &post.html,
                    "image" => &post.image,
                    "featured" => post.is_featured,
                    "page" => post.is_page,
                    "allow_comment" => post.allow_comment,
                    "published" => post.is_published,
                    "created_at" => datetime_value(Some(&post.created_at))?,
                    "created_by" => post.created_by,
                    "updated_at" => datetime_value(post.updated_at.as_ref())?,
                    "updated_by" => post.updated_by,
                    "published_at" => datetime_value(post.published_at.as_ref())?,
                    "published_by" => post.published_by,
                },
            )
            .map_err(|err| slug_write_error(err, &post.slug))
    }

    fn delete_post(&mut self, id: u64) -> Result<()> {
        Ok(self
            .tx
            .exec_drop("DELETE FROM posts WHERE id = :id", params! { "id" => id })?)
    }

    fn count_posts(&mut self, filter: &PostFilter) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM posts WHERE {}", filter_clause(filter));
        self.count(&query, mysql::Params::Empty)
    }

    fn list_posts(
        &mut self,
        filter: &PostFilter,
        order: PostOrder,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE {} ORDER BY {}, id LIMIT :limit OFFSET :offset",
            filter_clause(filter),
            order.as_sql()
        );
        self.posts(&query, params! { "limit" => limit, "offset" => offset })
    }

    fn count_posts_by_tag(&mut self, tag_id: u64, only_published: bool) -> Result<u64> {
        let published = if only_published { "AND posts.published = 1" } else { "" };
        let query = format!(
            "SELECT COUNT(*) FROM posts, posts_tags
            WHERE posts_tags.post_id = posts.id AND posts_tags.tag_id = :tag_id {published}"
        );
        self.count(&query, params! { "tag_id" => tag_id })
    }

    fn list_posts_by_tag(
        &mut self,
        tag_id: u64,
        only_published: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>> {
        let published = if only_published { "published = 1 AND" } else { "" };
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
            WHERE {published} id IN (SELECT post_id FROM posts_tags WHERE tag_id = :tag_id)
            ORDER BY published_at DESC, id DESC LIMIT :limit OFFSET :offset"
        );
        self.posts(
            &query,
            params! { "tag_id" => tag_id, "limit" => limit, "offset" => offset },
        )
    }

    fn tag_by_slug(&mut self, slug: &str) -> Result<Option<Tag>> {
        let query = format!("SELECT {TAG_COLUMNS} FROM tags WHERE slug = :slug");
        self.tx
            .exec_first::<Row, _, _>(query, params! { "slug" => slug })?
            .map(tag_from_row)
            .transpose()
    }

    fn insert_tag(&mut self, tag: &Tag) -> Result<u64> {
        self.tx.exec_drop(
            "INSERT INTO tags (name, slug, hidden, created_at, created_by)
            VALUES (:name, :slug, :hidden, :created_at, :created_by)",
            params! {
                "name" => &tag.name,
                "slug" => &tag.slug,
                "hidden" => tag.hidden,
                "created_at" => datetime_value(Some(&tag.created_at))?,
                "created_by" => tag.created_by,
            },
        )?;
        self.inserted_id("tag")
    }

    fn set_tag_hidden(
        &mut self,
        tag_id: u64,
        hidden: bool,
        updated_at: NaiveDateTime,
        updated_by: u64,
    ) -> Result<()> {
        Ok(self.tx.exec_drop(
            "UPDATE tags SET hidden = :hidden, updated_at = :updated_at, updated_by = :updated_by
            WHERE id = :id",
            params! {
                "hidden" => hidden,
                "updated_at" => datetime_value(Some(&updated_at))?,
                "updated_by" => updated_by,
                "id" => tag_id,
            },
        )?)
    }

    fn tag_has_published_post(&mut self, tag_id: u64) -> Result<bool> {
        let found = self.tx.exec_first::<u64, _, _>(
            "SELECT posts.id FROM posts, posts_tags
            WHERE posts_tags.post_id = posts.id AND posts_tags.tag_id = :tag_id
              AND posts.published = 1
            LIMIT 1",
            params! { "tag_id" => tag_id },
        )?;
        Ok(found.is_some())
    }

    fn tags_by_post(&mut self, post_id: u64) -> Result<Vec<Tag>> {
        let query = format!(
            "SELECT {} FROM tags JOIN posts_tags ON posts_tags.tag_id = tags.id
            WHERE posts_tags.post_id = :post_id ORDER BY posts_tags.id",
            TAG_COLUMNS
                .split(", ")
                .map(|column| format!("tags.{column}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.tx
            .exec::<Row, _, _>(query, params! { "post_id" => post_id })?
            .into_iter()
            .map(tag_from_row)
            .collect()
    }

    fn delete_post_tags(&mut self, post_id: u64) -> Result<()> {
        Ok(self.tx.exec_drop(
            "DELETE FROM posts_tags WHERE post_id = :post_id",
            params! { "post_id" => post_id },
        )?)
    }

    fn insert_post_tag(&mut self, post_id: u64, tag_id: u64) -> Result<()> {
        Ok(self.tx.exec_drop(
            "INSERT INTO posts_tags (post_id, tag_id) VALUES (:post_id, :tag_id)",
            params! { "post_id" => post_id, "tag_id" => tag_id },
        )?)
    }

    fn comment_by_id(&mut self, id: u64) -> Result<Option<Comment>> {
        let query = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = :id");
        self.tx
            .exec_first::<Row, _, _>(query, params! { "id" => id })?
            .map(comment_from_row)
            .transpose()
    }

    fn top_level_comments(&mut self, post_id: u64) -> Result<Vec<Comment>> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
            WHERE post_id = :post_id AND approved = 1 AND {TOP_LEVEL_PARENT}
            ORDER BY created_at DESC, id DESC"
        );
        self.comments(&query, params! { "post_id" => post_id })
    }

    fn replies_for_post(&mut self, post_id: u64) -> Result<Vec<Comment>> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
            WHERE post_id = :post_id AND approved = 1 AND {REPLY_PARENT}
            ORDER BY created_at DESC, id DESC"
        );
        self.comments(&query, params! { "post_id" => post_id })
    }

    fn insert_comment(&mut self, comment: &Comment) -> Result<u64> {
        self.tx.exec_drop(
            "INSERT INTO comments
                (post_id, author, author_email, author_url, content, approved, parent, created_at)
            VALUES
                (:post_id, :author, :email, :website, :content, :approved, :parent, :created_at)",
            params! {
                "post_id" => comment.post_id,
                "author" => &comment.author,
                "email" => &comment.email,
                "website" => &comment.website,
                "content" => &comment.content,
                "approved" => comment.approved,
                "parent" => comment.parent_id,
                "created_at" => datetime_value(Some(&comment.created_at))?,
            },
        )?;
        self.inserted_id("comment")
    }

    fn set_comment_approved(&mut self, id: u64, approved: bool) -> Result<bool> {
        self.tx.exec_drop(
            "UPDATE comments SET approved = :approved WHERE id = :id",
            params! { "approved" => approved, "id" => id },
        )?;
        if self.tx.affected_rows() > 0 {
            return Ok(true);
        }
        // MySQL reports zero affected rows when the value did not change.
        Ok(self.comment_by_id(id)?.is_some())
    }

    fn delete_comment(&mut self, id: u64) -> Result<bool> {
        self.tx
            .exec_drop("DELETE FROM comments WHERE id = :id", params! { "id" => id })?;
        Ok(self.tx.affected_rows() > 0)
    }

    fn count_comments(&mut self, only_approved: bool) -> Result<u64> {
        let query = if only_approved {
            "SELECT COUNT(*) FROM comments WHERE approved = 1"
        } else {
            "SELECT COUNT(*) FROM comments"
        };
        self.count(query, mysql::Params::Empty)
    }

    fn list_comments(
        &mut self,
        only_approved: bool,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Comment>> {
        let approved = if only_approved { "WHERE approved = 1" } else { "" };
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments {approved}
            ORDER BY created_at DESC, id DESC LIMIT :limit OFFSET :offset"
        );
        self.comments(&query, params! { "limit" => limit, "offset" => offset })
    }

    fn insert_message(&mut self, message: &Message) -> Result<u64> {
        self.tx.exec_drop(
            "INSERT INTO messages (type, data, is_read, created_at)
            VALUES (:kind, :data, :is_read, :created_at)",
            params! {
                "kind" => &message.kind,
                "data" => &message.data,
                "is_read" => message.is_read,
                "created_at" => datetime_value(Some(&message.created_at))?,
            },
        )?;
        self.inserted_id("message")
    }

    fn unread_messages(&mut self, limit: u64) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE is_read = 0
            ORDER BY created_at DESC, id DESC LIMIT :limit"
        );
        self.tx
            .exec::<Row, _, _>(query, params! { "limit" => limit })?
            .into_iter()
            .map(message_from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn filter_clause_never_mixes_pages_and_posts() {
        let pages = PostFilter { only_pages: true, only_published: false };
        let published = PostFilter { only_pages: false, only_published: true };
        assert_eq!(filter_clause(&pages), "page = 1");
        assert_eq!(filter_clause(&published), "page = 0 AND published = 1");
    }

    #[test]
    fn datetime_values_carry_microseconds() {
        let at = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(23, 59, 58, 123_456)
            .unwrap();
        assert_eq!(
            datetime_value(Some(&at)).unwrap(),
            Value::Date(2024, 2, 29, 23, 59, 58, 123_456)
        );
        assert_eq!(datetime_value(None).unwrap(), Value::NULL);
    }

    #[test]
    fn dates_before_year_zero_are_rejected() {
        let at = NaiveDate::from_ymd_opt(-1, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_matches!(datetime_value(Some(&at)), Err(BlogError::Persistence(_)));
    }

    #[test]
    fn null_parent_counts_as_top_level() {
        assert!(TOP_LEVEL_PARENT.contains("parent IS NULL"));
        assert!(REPLY_PARENT.contains("parent IS NOT NULL"));
    }

    fn server_error(code: u16) -> mysql::Error {
        mysql::Error::MySqlError(mysql::MySqlError {
            state: "23000".to_string(),
            message: "Duplicate entry 'hello' for key 'slug'".to_string(),
            code,
        })
    }

    #[test]
    fn duplicate_slug_key_is_a_conflict() {
        assert_matches!(
            slug_write_error(server_error(ER_DUP_ENTRY), "hello"),
            BlogError::SlugConflict(slug) if slug == "hello"
        );
        assert_matches!(
            slug_write_error(server_error(1452), "hello"),
            BlogError::Persistence(_)
        );
    }
}
