use crate::error::{BlogError, Result};
use crate::store::Store;

/// Strips leading and trailing separators from a slug.
pub fn trim_slug(candidate: &str) -> Result<String> {
    let trimmed = candidate.trim_matches(|c: char| c == '/' || c.is_whitespace());
    if trimmed.is_empty() {
        return Err(BlogError::EmptySlug);
    }
    Ok(trimmed.to_string())
}

/// True iff no post currently holds `slug`.
pub fn slug_available<S: Store + ?Sized>(store: &mut S, slug: &str) -> Result<bool> {
    Ok(store.post_by_slug(slug)?.is_none())
}

/// Returns `candidate` if no post holds it, otherwise the first free
/// `candidate-N` for N = 1, 2, ...
pub fn ensure_unique_slug<S: Store + ?Sized>(store: &mut S, candidate: &str) -> Result<String> {
    let base = trim_slug(candidate)?;
    if slug_available(store, &base)? {
        return Ok(base);
    }

    let mut suffix: u64 = 1;
    loop {
        let next = format!("{base}-{suffix}");
        if slug_available(store, &next)? {
            tracing::debug!("slug {} taken, resolved to {}", base, next);
            return Ok(next);
        }
        suffix = suffix
            .checked_add(1)
            .ok_or_else(|| BlogError::SlugConflict(base.clone()))?;
    }
}

/// Derives a slug from free text such as a tag name.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::posts::Post;
    use crate::store::{Database, Store, Transaction};
    use assert_matches::assert_matches;

    fn seed(db: &MemoryDatabase, slugs: &[&str]) {
        let mut tx = db.begin().unwrap();
        for slug in slugs {
            tx.insert_post(&Post::new("title", slug)).unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn trims_separators() {
        assert_eq!(trim_slug("/hello-world/").unwrap(), "hello-world");
        assert_eq!(trim_slug("  //about ").unwrap(), "about");
    }

    #[test]
    fn empty_slug_is_rejected() {
        assert_matches!(trim_slug(""), Err(BlogError::EmptySlug));
        assert_matches!(trim_slug("///"), Err(BlogError::EmptySlug));
        assert_matches!(trim_slug(" / "), Err(BlogError::EmptySlug));
    }

    #[test]
    fn free_slug_is_kept() {
        let db = MemoryDatabase::new();
        seed(&db, &["other"]);
        let mut tx = db.begin().unwrap();
        assert_eq!(ensure_unique_slug(&mut tx, "/hello/").unwrap(), "hello");
    }

    #[test]
    fn taken_slug_gets_first_free_suffix() {
        let db = MemoryDatabase::new();
        seed(&db, &["hello", "hello-1", "hello-3"]);
        let mut tx = db.begin().unwrap();
        assert_eq!(ensure_unique_slug(&mut tx, "hello").unwrap(), "hello-2");
        // Same data, same answer.
        assert_eq!(ensure_unique_slug(&mut tx, "hello").unwrap(), "hello-2");
        assert!(!slug_available(&mut tx, "hello-3").unwrap());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Rust & Go"), "rust-go");
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("v2.0"), "v2-0");
        assert_eq!(slugify("---"), "");
    }
}
