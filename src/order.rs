//! Allowlist for the `ORDER BY` clause of post listings.
//!
//! Ordering cannot be bound as a query parameter, so the clause is spliced
//! into the SQL text. Only the fragments produced by [`PostOrder::as_sql`]
//! ever reach a query.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PostOrder {
    CreatedAt,
    CreatedAtDesc,
    UpdatedAt,
    UpdatedAtDesc,
    PublishedAt,
    #[default]
    PublishedAtDesc,
}

impl PostOrder {
    /// Maps a caller-supplied sort key to an allowlisted order, falling back
    /// to the default for anything unknown.
    pub fn resolve(requested: &str) -> Self {
        match requested {
            "created_at" => PostOrder::CreatedAt,
            "created_at DESC" => PostOrder::CreatedAtDesc,
            "updated_at" => PostOrder::UpdatedAt,
            "updated_at DESC" => PostOrder::UpdatedAtDesc,
            "published_at" => PostOrder::PublishedAt,
            "published_at DESC" => PostOrder::PublishedAtDesc,
            _ => PostOrder::default(),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            PostOrder::CreatedAt => "created_at",
            PostOrder::CreatedAtDesc => "created_at DESC",
            PostOrder::UpdatedAt => "updated_at",
            PostOrder::UpdatedAtDesc => "updated_at DESC",
            PostOrder::PublishedAt => "published_at",
            PostOrder::PublishedAtDesc => "published_at DESC",
        }
    }
}

/// Returns a safe `ORDER BY` fragment for `requested`.
pub fn resolve_order(requested: &str) -> &'static str {
    PostOrder::resolve(requested).as_sql()
}
