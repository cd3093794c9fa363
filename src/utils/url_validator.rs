//! Long URL validation

use url::Url;

use crate::errors::{Result, ShortenerError};

/// Schemes a long URL may use.
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Parses `raw` and checks it is an absolute http(s) URL with a host.
///
/// The input is trimmed; the trimmed string is what gets stored, not the
/// normalised form `url` would print.
pub fn validate_url(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShortenerError::validation("URL cannot be empty"));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| ShortenerError::validation(format!("Invalid URL '{}': {}", trimmed, e)))?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(ShortenerError::validation(format!(
            "Unsupported scheme '{}': only http:// and https:// are allowed",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ShortenerError::validation(format!(
            "URL '{}' has no host",
            trimmed
        )));
    }

    Ok(trimmed)
}
