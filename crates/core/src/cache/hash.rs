//! Request-identity cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::Request;

/// Compute the hash identifying a cached request.
pub fn compute_cache_key(method: &str, url: &str, vary_headers: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary_headers.as_bytes());
    hex::encode(hasher.finalize())
}

/// URL form used for keying: fragment dropped, everything else kept verbatim.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Identity of a cached request: method, normalized URL and the values of the
/// configured vary headers, folded into a SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub hash: String,
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn for_request(request: &Request, vary_headers: &[String]) -> Self {
        let vary = vary_headers
            .iter()
            .map(|name| format!("{}={}", name.to_ascii_lowercase(), request.header(name).unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n");
        let url = normalize_url(&request.url);
        let hash = compute_cache_key(&request.method, &url, &vary);
        Self { hash, method: request.method.clone(), url }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://example.com/", "");
        let hash2 = compute_cache_key("GET", "https://example.com/", "");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", "https://example.com/", "");
        let head = compute_cache_key("HEAD", "https://example.com/", "");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://example.com/", "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fragment_ignored() {
        let a = RequestKey::for_request(&get("https://example.com/page.html#top"), &[]);
        let b = RequestKey::for_request(&get("https://example.com/page.html"), &[]);
        assert_eq!(a, b);
        assert_eq!(a.url, "https://example.com/page.html");
    }

    #[test]
    fn test_host_case_ignored() {
        let a = RequestKey::for_request(&get("https://EXAMPLE.com/data.json"), &[]);
        let b = RequestKey::for_request(&get("https://example.com/data.json"), &[]);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_query_distinguishes() {
        let a = RequestKey::for_request(&get("https://example.com/data.json?v=1"), &[]);
        let b = RequestKey::for_request(&get("https://example.com/data.json?v=2"), &[]);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_vary_headers_distinguish() {
        let vary = vec!["Accept-Language".to_string()];
        let en = get("https://example.com/").with_header("accept-language", "en");
        let az = get("https://example.com/").with_header("accept-language", "az");
        assert_ne!(RequestKey::for_request(&en, &vary).hash, RequestKey::for_request(&az, &vary).hash);
        // unlisted headers never affect identity
        assert_eq!(RequestKey::for_request(&en, &[]).hash, RequestKey::for_request(&az, &[]).hash);
    }
}
