//! Stable identifiers for manga, derived from their canonical url

use crate::error::{Error, Result};

use reqwest::Url;
use sha2::{Digest, Sha512};

/// Length of the user-facing handle, and the minimum accepted prefix length
pub const SHORT_HASH_LEN: usize = 8;

/// Canonical form of a manga url. Urls that fail to parse are only trimmed
pub fn normalize(url: &str) -> String {
    let url = url.trim();

    match Url::parse(url) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_owned(),
    }
}

/// Hex encoded SHA-512 of the normalized url
pub fn digest(url: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(normalize(url).as_bytes());

    hex::encode(hasher.finalize())
}

pub fn short_hash(full: &str) -> &str {
    full.get(..SHORT_HASH_LEN).unwrap_or(full)
}

/// Whether `input` could be a hash or a prefix of one
pub fn looks_like_hash(input: &str) -> bool {
    !input.is_empty() && input.chars().all(|c| c.is_ascii_hexdigit())
}

/// Finds the single full hash among `candidates` that starts with `prefix`
pub fn resolve<I>(prefix: &str, candidates: I) -> Result<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    if prefix.chars().count() < SHORT_HASH_LEN {
        return Err(Error::InvalidArgument(format!(
            "'{prefix}' is too short, at least {SHORT_HASH_LEN} characters are required"
        )));
    }

    let prefix_lower = prefix.to_ascii_lowercase();

    let mut matching: Vec<String> = candidates
        .into_iter()
        .filter(|hash| hash.as_ref().starts_with(&prefix_lower))
        .map(|hash| hash.as_ref().to_owned())
        .collect();

    match matching.len() {
        0 => Err(Error::NotFound(format!("no manga with hash '{prefix}'"))),
        1 => Ok(matching.remove(0)),
        _ => {
            matching.sort();
            Err(Error::Ambiguous {
                prefix: prefix.to_owned(),
                // short hashes would all look the same here
                candidates: matching
                    .iter()
                    .map(|hash| hash.chars().take(2 * SHORT_HASH_LEN).collect())
                    .collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let url = "https://mangadex.org/title/a96676e5-8ae2-425e-b549-7f15dd34a6d8";

        assert_eq!(digest(url), digest(url));
        assert_eq!(digest(url).len(), 128);
        assert!(digest(url).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_differs_per_url() {
        assert_ne!(
            digest("https://example.com/manga/1"),
            digest("https://example.com/manga/2")
        );
    }

    #[test]
    fn test_digest_uses_normalized_url() {
        assert_eq!(
            digest("  https://EXAMPLE.com/manga/1 "),
            digest("https://example.com/manga/1")
        );
        assert_eq!(digest("https://example.com"), digest("https://example.com/"));
    }

    #[test]
    fn test_short_hash() {
        let full = digest("https://example.com/manga/1");

        assert_eq!(short_hash(&full), &full[..8]);
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_looks_like_hash() {
        assert!(looks_like_hash("3a6005c4"));
        assert!(looks_like_hash("ABCDEF0123"));
        assert!(!looks_like_hash(""));
        assert!(!looks_like_hash("https://example.com/manga/1"));
    }

    #[test]
    fn test_resolve_rejects_short_prefix() {
        let hashes = vec![digest("https://example.com/manga/1")];

        for prefix in ["", "a", &hashes[0][..7]] {
            assert!(matches!(
                resolve(prefix, &hashes),
                Err(Error::InvalidArgument(_))
            ));
        }

        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            resolve("abc", &empty),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_unique_prefix() {
        let hashes = vec![
            "aaaaaaaa11".to_owned(),
            "aaaaaaaa22".to_owned(),
            "bbbbbbbb33".to_owned(),
        ];

        assert_eq!(resolve("bbbbbbbb", &hashes).unwrap(), "bbbbbbbb33");
        assert_eq!(resolve("aaaaaaaa2", &hashes).unwrap(), "aaaaaaaa22");
        assert_eq!(resolve("AAAAAAAA1", &hashes).unwrap(), "aaaaaaaa11");
    }

    #[test]
    fn test_resolve_failures() {
        let hashes = vec!["aaaaaaaa11".to_owned(), "aaaaaaaa22".to_owned()];

        assert!(matches!(
            resolve("cccccccc", &hashes),
            Err(Error::NotFound(_))
        ));

        match resolve("aaaaaaaa", &hashes) {
            Err(Error::Ambiguous { prefix, candidates }) => {
                assert_eq!(prefix, "aaaaaaaa");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }
}
