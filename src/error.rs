use mysql::Error as MySqlError;

/// Error type shared by every operation of the crate.
#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    #[error("slug may not be empty")]
    EmptySlug,

    #[error("slug conflict: {0}")]
    SlugConflict(String),

    #[error("invalid page {page} with page size {page_size}")]
    InvalidPage { page: u64, page_size: u64 },

    #[error("page {page} not found")]
    PageNotFound { page: u64 },

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("{entity} with slug {slug} not found")]
    UnknownSlug { entity: &'static str, slug: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<MySqlError> for BlogError {
    fn from(err: MySqlError) -> Self {
        BlogError::Persistence(err.to_string())
    }
}

impl From<validator::ValidationErrors> for BlogError {
    fn from(errors: validator::ValidationErrors) -> Self {
        BlogError::Validation(errors.to_string())
    }
}

pub type Result<T, E = BlogError> = std::result::Result<T, E>;
