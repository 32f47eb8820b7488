use mysql::prelude::Queryable;
use mysql::Pool;

use crate::error::Result;

const POSTS: &str = "
CREATE TABLE IF NOT EXISTS posts (
  id                BIGINT UNSIGNED NOT NULL PRIMARY KEY AUTO_INCREMENT,
  title             varchar(150) NOT NULL,
  slug              varchar(150) NOT NULL,
  markdown          mediumtext NOT NULL,
  html              mediumtext NOT NULL,
  image             text NOT NULL,
  featured          boolean NOT NULL DEFAULT 0,
  page              boolean NOT NULL DEFAULT 0,
  allow_comment     boolean NOT NULL DEFAULT 0,
  published         boolean NOT NULL DEFAULT 0,
  created_at        datetime(6) NOT NULL,
  created_by        BIGINT UNSIGNED NOT NULL,
  updated_at        datetime(6),
  updated_by        BIGINT UNSIGNED,
  published_at      datetime(6),
  published_by      BIGINT UNSIGNED,
  UNIQUE KEY posts_slug (slug)
)";

const TAGS: &str = "
CREATE TABLE IF NOT EXISTS tags (
  id                BIGINT UNSIGNED NOT NULL PRIMARY KEY AUTO_INCREMENT,
  name              varchar(150) NOT NULL,
  slug              varchar(150) NOT NULL,
  hidden            boolean NOT NULL DEFAULT 0,
  created_at        datetime(6) NOT NULL,
  created_by        BIGINT UNSIGNED NOT NULL,
  updated_at        datetime(6),
  updated_by        BIGINT UNSIGNED,
  UNIQUE KEY tags_slug (slug)
)";

const POSTS_TAGS: &str = "
CREATE TABLE IF NOT EXISTS posts_tags (
  id       BIGINT UNSIGNED NOT NULL PRIMARY KEY AUTO_INCREMENT,
  post_id  BIGINT UNSIGNED NOT NULL,
  tag_id   BIGINT UNSIGNED NOT NULL,
  KEY posts_tags_post (post_id),
  KEY posts_tags_tag (tag_id)
)";

const COMMENTS: &str = "
CREATE TABLE IF NOT EXISTS comments (
  id            BIGINT UNSIGNED NOT NULL PRIMARY KEY AUTO_INCREMENT,
  post_id       BIGINT UNSIGNED NOT NULL,
  author        varchar(150) NOT NULL,
  author_email  varchar(150) NOT NULL,
  author_url    varchar(200) NOT NULL,
  content       text NOT NULL,
  approved      boolean NOT NULL DEFAULT 0,
  parent        BIGINT UNSIGNED NOT NULL DEFAULT 0,
  created_at    datetime(6) NOT NULL,
  KEY comments_post (post_id, approved, parent)
)";

const MESSAGES: &str = "
CREATE TABLE IF NOT EXISTS messages (
  id          BIGINT UNSIGNED NOT NULL PRIMARY KEY AUTO_INCREMENT,
  type        varchar(20) NOT NULL,
  data        text NOT NULL,
  is_read     boolean NOT NULL DEFAULT 0,
  created_at  datetime(6) NOT NULL
)";

pub const TABLES: [(&str, &str); 5] = [
    ("posts", POSTS),
    ("tags", TAGS),
    ("posts_tags", POSTS_TAGS),
    ("comments", COMMENTS),
    ("messages", MESSAGES),
];

/// Creates any missing table. Existing tables are left alone.
pub fn ensure_schema(pool: &Pool) -> Result<()> {
    let mut conn = pool.get_conn()?;
    for (name, ddl) in TABLES {
        conn.query_drop(ddl).map_err(|err| {
            tracing::error!("failed to create table {}: {:?}", name, err);
            err
        })?;
        tracing::debug!("table {} ready", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_statement_creates_its_table() {
        for (name, ddl) in TABLES {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {name} (")));
        }
    }

    #[test]
    fn slugs_are_unique() {
        assert!(POSTS.contains("UNIQUE KEY posts_slug (slug)"));
        assert!(TAGS.contains("UNIQUE KEY tags_slug (slug)"));
    }
}
