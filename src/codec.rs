//! Short key derivation.
//!
//! A short key is the first [`KEY_BYTES`] bytes of the MD5 digest of the
//! long URL, rendered as lowercase hex. Same input, same key, on every
//! backend, and the same keys the historical deployment handed out.
//! Collisions are not resolved.

use md5::{Digest, Md5};
use std::fmt::Write;

/// Digest prefix length in bytes.
pub const KEY_BYTES: usize = 5;

/// Length of a derived key in characters.
pub const KEY_LEN: usize = KEY_BYTES * 2;

/// Derive the short key for `original_url`.
pub fn derive_key(original_url: &str) -> String {
    let digest = Md5::digest(original_url.as_bytes());
    digest[..KEY_BYTES]
        .iter()
        .fold(String::with_capacity(KEY_LEN), |mut out, byte| {
            let _ = write!(out, "{:02x}", byte);
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_stable() {
        let url = "https://example.com/x";
        assert_eq!(derive_key(url), derive_key(url));
    }

    #[test]
    fn test_derive_key_shape() {
        for url in ["", "https://example.com", "https://практикум.рф/путь?q=1"] {
            let key = derive_key(url);
            assert_eq!(key.len(), KEY_LEN);
            assert!(
                key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
                "bad key {key} for {url}"
            );
        }
    }

    #[test]
    fn test_derive_key_known_vectors() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(derive_key(""), "d41d8cd98f");
        // md5("abc") = 900150983cd24fb0d6963f7d28e17f72
        assert_eq!(derive_key("abc"), "900150983c");
    }

    #[test]
    fn test_seed_fixture_key_is_derived() {
        use crate::storage::SEED_SHORT_KEY;
        assert_eq!(derive_key(""), SEED_SHORT_KEY);
    }

    #[test]
    fn test_distinct_urls_get_distinct_keys() {
        assert_ne!(
            derive_key("https://example.com/a"),
            derive_key("https://example.com/b")
        );
    }
}
