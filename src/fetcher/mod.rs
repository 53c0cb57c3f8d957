//! Fetcher (spec §4.5, component C5): two strategies behind one
//! contract — headless browser and plain HTTP — with rate limiting,
//! rotation, retry, and a shared response cache.

pub mod browser;
pub mod cache;
pub mod http;
pub mod rotation;

use crate::models::{ScraperOptions, ScraperResponse, ScrapeMetadata};
use cache::ResponseCache;
use rotation::{ProxyRotator, UserAgentRotator};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch timed out")]
    Timeout,
    #[error("rate limited (429)")]
    TooManyRequests,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("browser error: {0}")]
    Browser(String),
}

/// The shape every fetch returns, browser or HTTP (spec §4.5: "fetch(url,
/// options) -> {status, content, content-type, title, discovered-links[],
/// headers, timing, error?}").
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub content: String,
    pub content_type: String,
    pub title: Option<String>,
    pub discovered_links: Vec<String>,
    pub headers: HashMap<String, String>,
    pub load_time_ms: u64,
    pub used_browser: bool,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn into_scraper_response(self, url: &str, processing_time_ms: u64) -> ScraperResponse {
        ScraperResponse {
            url: url.to_string(),
            title: self.title,
            html: Some(self.content.clone()),
            content: self.content,
            content_type: crate::models::ExtractorFormat::Html,
            links: self.discovered_links,
            metadata: ScrapeMetadata {
                status: self.status,
                headers: self.headers,
                load_time_ms: self.load_time_ms,
                processing_time_ms,
                used_browser: self.used_browser,
                ..Default::default()
            },
            error: self.error,
            extracted_data: None,
            page_analysis: None,
        }
    }
}

/// Top-level fetch entry point: dispatches to the browser fetcher when
/// `use_browser` is set, falling back to plain HTTP if the browser
/// launcher itself fails (spec §4.5: "used as a fallback when the
/// browser launcher fails"). Wraps the whole thing in the response
/// cache.
pub struct Fetcher {
    http: http::HttpFetcher,
    browser: browser::BrowserFetcher,
    cache: ResponseCache,
}

impl Fetcher {
    pub fn new(cache_capacity: usize) -> Self {
        let ua_rotator = Arc::new(UserAgentRotator::new());
        let proxy_rotator = Arc::new(ProxyRotator::new(Vec::new()));
        Fetcher {
            http: http::HttpFetcher::new(ua_rotator.clone(), proxy_rotator.clone()),
            browser: browser::BrowserFetcher::new(ua_rotator, proxy_rotator),
            cache: ResponseCache::new(cache_capacity),
        }
    }

    pub async fn fetch(&self, url: &str, options: &ScraperOptions) -> Result<FetchOutcome, FetchError> {
        let cache_key = ResponseCache::key_for(url, options);
        if !options.skip_cache {
            if let Some(cached) = self.cache.get(&cache_key) {
                return Ok(FetchOutcome {
                    status: cached.metadata.status,
                    content: cached.content,
                    content_type: format!("{:?}", cached.content_type).to_lowercase(),
                    title: cached.title,
                    discovered_links: cached.links,
                    headers: cached.metadata.headers,
                    load_time_ms: 0,
                    used_browser: cached.metadata.used_browser,
                    error: cached.error,
                });
            }
        }

        let outcome = if options.use_browser {
            match self.browser.fetch(url, options).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(url, error = %e, "browser fetch failed, falling back to http");
                    self.http.fetch(url, options).await?
                }
            }
        } else {
            self.http.fetch(url, options).await?
        };

        if !options.skip_cache && outcome.error.is_none() {
            let response = outcome.clone().into_scraper_response(url, 0);
            self.cache
                .put(cache_key, response, Duration::from_secs(options.cache_ttl_s));
        }

        Ok(outcome)
    }
}
