use std::env;

use crate::error::{BlogError, Result};

const DEFAULT_POOL_MIN: usize = 1;
const DEFAULT_POOL_MAX: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_url: String,
    pub pool_min: usize,
    pub pool_max: usize,
}

impl Config {
    /// Reads `DB_URL`, `DB_POOL_MIN` and `DB_POOL_MAX` from the process
    /// environment. Call `dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_url = lookup("DB_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| BlogError::Config("DB_URL is not set".to_string()))?;
        let pool_min = parse_bound(&lookup, "DB_POOL_MIN", DEFAULT_POOL_MIN)?;
        let pool_max = parse_bound(&lookup, "DB_POOL_MAX", DEFAULT_POOL_MAX)?;
        if pool_max == 0 || pool_min > pool_max {
            return Err(BlogError::Config(format!(
                "DB_POOL_MIN ({pool_min}) must not exceed DB_POOL_MAX ({pool_max}), which must be positive"
            )));
        }

        Ok(Config {
            db_url,
            pool_min,
            pool_max,
        })
    }
}

fn parse_bound(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> Result<usize> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BlogError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_pool_bounds() {
        let config = load(&[("DB_URL", "mysql://blog@localhost/blog")]).unwrap();
        assert_eq!(config.pool_min, 1);
        assert_eq!(config.pool_max, 10);
    }

    #[test]
    fn missing_url_is_an_error() {
        assert_matches!(load(&[]), Err(BlogError::Config(_)));
        assert_matches!(load(&[("DB_URL", "  ")]), Err(BlogError::Config(_)));
    }

    #[test]
    fn bad_bounds_are_rejected() {
        let url = ("DB_URL", "mysql://blog@localhost/blog");
        assert_matches!(load(&[url, ("DB_POOL_MAX", "lots")]), Err(BlogError::Config(_)));
        assert_matches!(
            load(&[url, ("DB_POOL_MIN", "5"), ("DB_POOL_MAX", "2")]),
            Err(BlogError::Config(_))
        );
        let config = load(&[url, ("DB_POOL_MIN", "2"), ("DB_POOL_MAX", " 4 ")]).unwrap();
        assert_eq!((config.pool_min, config.pool_max), (2, 4));
    }
}
