//! User-agent and proxy rotation pools (spec §4.5 "Rotation pools").

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed pool of 10 realistic desktop/mobile user agents, generated once
/// at startup; consumers round-robin through it.
const USER_AGENTS: [&str; 10] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

#[derive(Default)]
pub struct UserAgentRotator {
    cursor: AtomicUsize,
}

impl UserAgentRotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> &'static str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
        USER_AGENTS[idx]
    }
}

/// A single proxy entry with optional basic-auth credentials, HTTP/HTTPS
/// only (spec §4.5).
#[derive(Debug, Clone)]
pub struct ProxyEntry {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Caller-supplied round-robin proxy pool.
pub struct ProxyRotator {
    proxies: Vec<ProxyEntry>,
    cursor: AtomicUsize,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<ProxyEntry>) -> Self {
        ProxyRotator {
            proxies,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn next(&self) -> Option<&ProxyEntry> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        self.proxies.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_rotator_cycles_through_the_full_pool() {
        let rotator = UserAgentRotator::new();
        let first = rotator.next();
        for _ in 0..9 {
            rotator.next();
        }
        assert_eq!(rotator.next(), first);
    }

    #[test]
    fn proxy_rotator_round_robins() {
        let rotator = ProxyRotator::new(vec![
            ProxyEntry { url: "http://a".into(), username: None, password: None },
            ProxyEntry { url: "http://b".into(), username: None, password: None },
        ]);
        assert_eq!(rotator.next().unwrap().url, "http://a");
        assert_eq!(rotator.next().unwrap().url, "http://b");
        assert_eq!(rotator.next().unwrap().url, "http://a");
    }

    #[test]
    fn empty_proxy_rotator_yields_none() {
        let rotator = ProxyRotator::new(vec![]);
        assert!(rotator.next().is_none());
    }
}
