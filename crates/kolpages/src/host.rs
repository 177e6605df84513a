//! Host matching and cache-busting for destination URLs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

/// Query parameter appended to http(s) navigations.
pub const CACHE_BUST_PARAM: &str = "timestamp";

/// Compare the host component of two absolute URLs, ignoring ASCII case.
///
/// Scheme, port, path, query and fragment are ignored. If either side does not
/// parse as an absolute URL the hosts are treated as different.
pub fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a.trim()), Url::parse(b.trim())) {
        (Ok(a), Ok(b)) => a
            .host_str()
            .unwrap_or("")
            .eq_ignore_ascii_case(b.host_str().unwrap_or("")),
        _ => false,
    }
}

/// Hands out strictly increasing timestamps in 100ns ticks since the epoch.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicU64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp; never repeats, even if the wall clock stalls or steps back.
    pub fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            / 100;
        let now = u64::try_from(now).unwrap_or(u64::MAX);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Append `timestamp=<T>` to http(s) URLs; everything else passes through.
    pub fn apply(&self, url: &str) -> String {
        bust_url(url, self.next_timestamp())
    }
}

/// Append the cache-bust pair with an explicit timestamp.
pub fn bust_url(url: &str, timestamp: u64) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return url.to_string();
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return url.to_string();
    }
    parsed
        .query_pairs_mut()
        .append_pair(CACHE_BUST_PARAM, &timestamp.to_string());
    parsed.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_host_ignores_path_and_query() {
        assert!(same_host(
            "https://a.example/page",
            "https://a.example/other?x=1"
        ));
        assert!(same_host(
            "https://A.Example/page",
            "http://a.example/page?timestamp=5"
        ));
    }

    #[test]
    fn test_same_host_detects_cross_site() {
        assert!(!same_host("https://a.example/page", "https://b.example/x"));
        assert!(!same_host("https://a.example/", "https://sub.a.example/"));
    }

    #[test]
    fn test_same_host_fails_closed_on_relative() {
        assert!(!same_host("https://a.example/page", "/page"));
        assert!(!same_host("not a url", "https://a.example/"));
        assert!(!same_host("", ""));
    }

    #[test]
    fn test_bust_url_appends_query() {
        assert_eq!(
            bust_url("https://tora.example/home", 42),
            "https://tora.example/home?timestamp=42"
        );
        assert_eq!(
            bust_url("https://tora.example/home?lang=he", 42),
            "https://tora.example/home?lang=he&timestamp=42"
        );
    }

    #[test]
    fn test_bust_url_keeps_fragment_last() {
        assert_eq!(
            bust_url("https://a.example/p#top", 7),
            "https://a.example/p?timestamp=7#top"
        );
    }

    #[test]
    fn test_bust_url_skips_non_http() {
        assert_eq!(bust_url("file:///C:/kiosk/index.html", 1), "file:///C:/kiosk/index.html");
        assert_eq!(bust_url("about:blank", 1), "about:blank");
        assert_eq!(bust_url("relative/path", 1), "relative/path");
    }

    #[test]
    fn test_cache_buster_is_strictly_increasing() {
        let buster = CacheBuster::new();
        let mut prev = buster.next_timestamp();
        for _ in 0..1000 {
            let next = buster.next_timestamp();
            assert!(next > prev);
            prev = next;
        }
    }
}
