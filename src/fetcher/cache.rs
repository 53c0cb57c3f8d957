//! Response cache (spec §4.5 "Response cache"): content-addressable by
//! hash(URL + cacheable options), LRU-bounded, each entry expiring
//! independently on its own TTL.
//!
//! SPEC_FULL.md §10 decision: the cacheable-option salient set is
//! `extractor_format`, `wait_for_selector`, and `actions` — the three
//! options that change what the fetch actually returns. Everything else
//! (timeouts, rotation, proxy) only changes *how* the page is fetched,
//! not its content, so two requests that differ only in those options
//! correctly share a cache entry.

use crate::models::{ExtractorFormat, PageAction, ScraperOptions, ScraperResponse};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    response: ScraperResponse,
    expires_at: Instant,
}

pub struct ResponseCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        ResponseCache {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn key_for(url: &str, options: &ScraperOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"|");
        hasher.update(format_extractor(options.extractor_format).as_bytes());
        hasher.update(b"|");
        hasher.update(options.wait_for_selector.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(format_actions(&options.actions).as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<ScraperResponse> {
        let mut cache = self.inner.lock().expect("response cache lock poisoned");
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, response: ScraperResponse, ttl: Duration) {
        let mut cache = self.inner.lock().expect("response cache lock poisoned");
        cache.put(
            key,
            Entry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

fn format_extractor(format: ExtractorFormat) -> &'static str {
    match format {
        ExtractorFormat::Html => "html",
        ExtractorFormat::Markdown => "markdown",
        ExtractorFormat::Text => "text",
    }
}

fn format_actions(actions: &[PageAction]) -> String {
    serde_json::to_string(actions).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapeMetadata;
    use std::collections::HashMap;

    fn sample_response(url: &str) -> ScraperResponse {
        ScraperResponse {
            url: url.to_string(),
            title: None,
            html: None,
            content: "hi".to_string(),
            content_type: ExtractorFormat::Markdown,
            links: vec![],
            metadata: ScrapeMetadata {
                status: 200,
                headers: HashMap::new(),
                load_time_ms: 1,
                processing_time_ms: 1,
                used_browser: false,
                ..Default::default()
            },
            error: None,
            extracted_data: None,
            page_analysis: None,
        }
    }

    #[test]
    fn different_salient_options_produce_different_keys() {
        let mut a = ScraperOptions::default();
        a.extractor_format = ExtractorFormat::Html;
        let mut b = ScraperOptions::default();
        b.extractor_format = ExtractorFormat::Markdown;
        assert_ne!(
            ResponseCache::key_for("https://example.com", &a),
            ResponseCache::key_for("https://example.com", &b)
        );
    }

    #[test]
    fn non_salient_options_share_a_cache_key() {
        let mut a = ScraperOptions::default();
        a.timeout_ms = 1_000;
        let mut b = ScraperOptions::default();
        b.timeout_ms = 99_000;
        assert_eq!(
            ResponseCache::key_for("https://example.com", &a),
            ResponseCache::key_for("https://example.com", &b)
        );
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ResponseCache::new(10);
        let key = "k".to_string();
        cache.put(key.clone(), sample_response("https://example.com"), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn fresh_entries_round_trip() {
        let cache = ResponseCache::new(10);
        let key = "k".to_string();
        cache.put(key.clone(), sample_response("https://example.com"), Duration::from_secs(60));
        assert_eq!(cache.get(&key).unwrap().url, "https://example.com");
    }
}
