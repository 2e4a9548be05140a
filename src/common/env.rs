//! Environment variable helpers.

use std::str::FromStr;

use crate::{Error, Result};

/// Get an optional, non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional boolean environment variable.
///
/// `"1"` and `"true"` (case-insensitive) are true; `"0"` and `"false"` are
/// false; anything else is a configuration error.
pub fn env_bool_opt(key: &str) -> Result<Option<bool>> {
    match env_opt(key) {
        None => Ok(None),
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(v) => Err(Error::config(format!("{} must be a boolean, got '{}'", key, v))),
    }
}

/// Parse an optional environment variable with [`FromStr`].
pub fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_opt(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{} has an invalid value '{}'", key, v))),
    }
}
