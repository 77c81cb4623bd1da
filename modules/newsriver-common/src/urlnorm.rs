//! URL normalization and hashing.
//!
//! Every URL that enters the system passes through [`normalize`] so that
//! dedup by `url_hash` is sound. Two URLs differing only in scheme case,
//! default port, fragment, query order, or tracking parameters collide to
//! the same hash.

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::NewsriverError;

/// Query parameters dropped during normalization (in addition to `utm_*`).
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "msclkid", "dclid", "ref", "gclsrc"];

/// A URL in canonical form, with its identity hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// The canonical URL string.
    pub url: String,
    /// Lowercased host.
    pub host: String,
    /// Hex SHA-256 of the canonical URL string.
    pub hash: String,
}

impl NormalizedUrl {
    /// First 16 hex characters of the hash, for compact derived identifiers.
    pub fn short_hash(&self) -> &str {
        &self.hash[..16]
    }
}

/// Normalize a URL. Rules, in order: upgrade `http` to `https`; lowercase
/// host; strip default ports; resolve dot segments; strip the fragment;
/// sort query parameters lexicographically and drop tracking parameters;
/// strip the trailing slash except at the root.
///
/// Non-parseable input and non-http(s) schemes return
/// [`NewsriverError::InvalidUrl`]; those URLs never enter the frontier.
pub fn normalize(raw: &str) -> Result<NormalizedUrl, NewsriverError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| NewsriverError::InvalidUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            // Infallible for http → https, but the API is fallible.
            url.set_scheme("https")
                .map_err(|_| NewsriverError::InvalidUrl(format!("{raw}: cannot set scheme")))?;
        }
        other => {
            return Err(NewsriverError::InvalidUrl(format!(
                "{raw}: unsupported scheme {other}"
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| NewsriverError::InvalidUrl(format!("{raw}: no host")))?
        .to_lowercase();

    // The url crate strips scheme-default ports on parse, but an explicit
    // :80 survives the http → https upgrade.
    if matches!(url.port(), Some(80) | Some(443)) {
        let _ = url.set_port(None);
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !is_tracking_param(k))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        let mut qp = url.query_pairs_mut();
        qp.clear();
        for (k, v) in &pairs {
            qp.append_pair(k, v);
        }
        drop(qp);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let normalized = url.to_string();
    let hash = hex::encode(Sha256::digest(normalized.as_bytes()));

    Ok(NormalizedUrl {
        url: normalized,
        host,
        hash,
    })
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Hex SHA-256 of arbitrary content. Used for body-level dedup.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_is_upgraded_to_https() {
        let n = normalize("http://Example.com/Path").unwrap();
        assert_eq!(n.url, "https://example.com/Path");
        assert_eq!(n.host, "example.com");
    }

    #[test]
    fn default_ports_are_stripped() {
        let a = normalize("http://example.com:80/a").unwrap();
        let b = normalize("https://example.com:443/a").unwrap();
        let c = normalize("https://example.com/a").unwrap();
        assert_eq!(a.hash, c.hash);
        assert_eq!(b.hash, c.hash);
    }

    #[test]
    fn explicit_port_survives() {
        let n = normalize("https://example.com:8080/a").unwrap();
        assert_eq!(n.url, "https://example.com:8080/a");
    }

    #[test]
    fn fragment_is_stripped() {
        let n = normalize("https://example.com/a#section-2").unwrap();
        assert_eq!(n.url, "https://example.com/a");
    }

    #[test]
    fn dot_segments_are_resolved() {
        let n = normalize("https://example.com/a/./b/../c").unwrap();
        assert_eq!(n.url, "https://example.com/a/c");
    }

    #[test]
    fn query_params_are_sorted() {
        let a = normalize("https://example.com/a?b=2&a=1").unwrap();
        let b = normalize("https://example.com/a?a=1&b=2").unwrap();
        assert_eq!(a.url, "https://example.com/a?a=1&b=2");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn tracking_params_are_dropped() {
        let tracked =
            normalize("https://example.com/a?utm_source=x&utm_medium=y&fbclid=z&gclid=1").unwrap();
        let clean = normalize("https://example.com/a").unwrap();
        assert_eq!(tracked.url, "https://example.com/a");
        assert_eq!(tracked.hash, clean.hash);
    }

    #[test]
    fn tracking_params_dropped_but_real_params_kept() {
        let n = normalize("https://example.com/a?utm_source=x&page=2").unwrap();
        assert_eq!(n.url, "https://example.com/a?page=2");
    }

    #[test]
    fn trailing_slash_stripped_except_root() {
        let n = normalize("https://example.com/a/b/").unwrap();
        assert_eq!(n.url, "https://example.com/a/b");
        let root = normalize("https://example.com/").unwrap();
        assert_eq!(root.url, "https://example.com/");
        let bare = normalize("https://example.com").unwrap();
        assert_eq!(bare.hash, root.hash);
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "http://Example.COM:80/a/../b/?z=1&a=2&utm_campaign=spring#frag",
            "https://example.com/",
            "https://example.com/a?x=%20y",
        ];
        for input in inputs {
            let once = normalize(input).unwrap();
            let twice = normalize(&once.url).unwrap();
            assert_eq!(once.url, twice.url, "not idempotent for {input}");
            assert_eq!(once.hash, twice.hash);
        }
    }

    #[test]
    fn hash_is_deterministic_and_hex() {
        let a = normalize("https://example.com/a").unwrap();
        let b = normalize("https://example.com/a").unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert!(a.hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.short_hash().len(), 16);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(normalize("not a url").is_err());
        assert!(normalize("ftp://example.com/file").is_err());
        assert!(normalize("mailto:someone@example.com").is_err());
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("hello"));
        assert_ne!(h, content_hash("world"));
    }
}
