//! Plain HTTP fetcher (spec §4.5 "HTTP fetcher"): used directly when
//! `use_browser` is unset, and as the fallback when the browser launcher
//! fails.

use super::rotation::{ProxyRotator, UserAgentRotator};
use super::{FetchError, FetchOutcome};
use crate::models::ScraperOptions;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use rand::Rng;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

type HostLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Per-host token bucket, built lazily the first time a host is seen
/// (SPEC_FULL.md §10 decision: rate limiting scope is per-host, not
/// global — a slow host shouldn't throttle requests to every other
/// host in the same crawl).
pub struct HttpFetcher {
    client: reqwest::Client,
    limiters: RwLock<HashMap<String, Arc<HostLimiter>>>,
    proxy_clients: RwLock<HashMap<String, reqwest::Client>>,
    ua_rotator: Arc<UserAgentRotator>,
    proxy_rotator: Arc<ProxyRotator>,
}

impl HttpFetcher {
    pub fn new(ua_rotator: Arc<UserAgentRotator>, proxy_rotator: Arc<ProxyRotator>) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(false)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");

        HttpFetcher {
            client,
            limiters: RwLock::new(HashMap::new()),
            proxy_clients: RwLock::new(HashMap::new()),
            ua_rotator,
            proxy_rotator,
        }
    }

    /// Build (or reuse) a client configured to route through `proxy_url`.
    /// Reqwest proxies are a client-level setting, so rotation means
    /// keeping a small pool of pre-built clients keyed by proxy URL
    /// rather than rebuilding one per request.
    async fn client_for_proxy(
        &self,
        proxy_url: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> reqwest::Client {
        if let Some(client) = self.proxy_clients.read().await.get(proxy_url) {
            return client.clone();
        }

        let mut proxy = match reqwest::Proxy::all(proxy_url) {
            Ok(p) => p,
            Err(_) => return self.client.clone(),
        };
        if let (Some(user), Some(pass)) = (username, password) {
            proxy = proxy.basic_auth(user, pass);
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(false)
            .timeout(Duration::from_secs(30))
            .proxy(proxy)
            .build()
            .unwrap_or_else(|_| self.client.clone());

        self.proxy_clients
            .write()
            .await
            .insert(proxy_url.to_string(), client.clone());
        client
    }

    async fn limiter_for(&self, host: &str, min_delay: Duration) -> Arc<HostLimiter> {
        if let Some(limiter) = self.limiters.read().await.get(host) {
            return limiter.clone();
        }
        let per_sec = NonZeroU32::new((1000 / min_delay.as_millis().max(1)).max(1) as u32)
            .unwrap_or(nonzero!(1u32));
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_sec)));
        self.limiters
            .write()
            .await
            .insert(host.to_string(), limiter.clone());
        limiter
    }

    pub async fn fetch(&self, url: &str, options: &ScraperOptions) -> Result<FetchOutcome, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        let mut delay = Duration::from_millis(options.min_delay_ms);
        let mut last_err = None;

        for attempt in 0..=options.max_retries {
            let limiter = self.limiter_for(&host, delay).await;
            limiter.until_ready().await;

            let started = Instant::now();
            match self.try_once(&parsed, options, attempt).await {
                Ok(mut outcome) => {
                    outcome.load_time_ms = started.elapsed().as_millis() as u64;
                    return Ok(outcome);
                }
                Err(e) if is_retryable(&e) && attempt < options.max_retries => {
                    let jitter = rand::rng().random_range(-0.2..=0.2);
                    let jittered = delay.mul_f64(1.0 + jitter).max(Duration::from_millis(1));
                    tracing::warn!(url, attempt, delay_ms = jittered.as_millis(), "retrying fetch");
                    tokio::time::sleep(jittered).await;
                    delay = (delay.mul_f64(options.backoff_factor))
                        .min(Duration::from_millis(options.max_delay_ms));
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(FetchError::Timeout))
    }

    async fn try_once(
        &self,
        url: &url::Url,
        options: &ScraperOptions,
        attempt: u32,
    ) -> Result<FetchOutcome, FetchError> {
        let user_agent = if options.rotate_user_agent || attempt > 0 {
            self.ua_rotator.next().to_string()
        } else {
            options
                .user_agent
                .clone()
                .unwrap_or_else(|| self.ua_rotator.next().to_string())
        };

        let client = if let Some(proxy_url) = options.proxy.as_deref() {
            self.client_for_proxy(
                proxy_url,
                options.proxy_username.as_deref(),
                options.proxy_password.as_deref(),
            )
            .await
        } else if options.proxy_rotation {
            match self.proxy_rotator.next() {
                Some(entry) => {
                    self.client_for_proxy(&entry.url, entry.username.as_deref(), entry.password.as_deref())
                        .await
                }
                None => self.client.clone(),
            }
        } else {
            self.client.clone()
        };

        let builder = client
            .get(url.as_str())
            .timeout(Duration::from_millis(options.timeout_ms))
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9");

        let resp = builder.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status();

        if status.as_u16() == 429 {
            return Err(FetchError::TooManyRequests);
        }

        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "text/html".to_string());

        let body = resp.text().await.map_err(classify_reqwest_error)?;

        if !status.is_success() {
            return Ok(FetchOutcome {
                status: status.as_u16(),
                content: body,
                content_type,
                title: None,
                discovered_links: Vec::new(),
                headers,
                load_time_ms: 0,
                used_browser: false,
                error: Some(format!("HTTP {}", status.as_u16())),
            });
        }

        let (title, links) = extract_title_and_links(&body, url);

        Ok(FetchOutcome {
            status: status.as_u16(),
            content: body,
            content_type,
            title,
            discovered_links: links,
            headers,
            load_time_ms: 0,
            used_browser: false,
            error: None,
        })
    }
}

fn extract_title_and_links(body: &str, base: &url::Url) -> (Option<String>, Vec<String>) {
    let doc = Html::parse_document(body);
    let title_sel = Selector::parse("title").unwrap();
    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let a_sel = Selector::parse("a[href]").unwrap();
    let links = doc
        .select(&a_sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.is_empty() && !href.starts_with("javascript:"))
        .filter_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .collect();

    (title, links)
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.to_string().to_lowercase().contains("too many requests") {
        FetchError::TooManyRequests
    } else {
        FetchError::Transport(e.to_string())
    }
}

fn is_retryable(e: &FetchError) -> bool {
    matches!(e, FetchError::Timeout | FetchError::TooManyRequests | FetchError::Transport(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_resolves_relative_links() {
        let html = r#"<html><head><title> Hi </title></head><body>
            <a href="/a">A</a><a href="javascript:void(0)">skip</a><a href="">skip2</a>
            </body></html>"#;
        let base = url::Url::parse("https://example.com/page").unwrap();
        let (title, links) = extract_title_and_links(html, &base);
        assert_eq!(title.unwrap(), "Hi");
        assert_eq!(links, vec!["https://example.com/a".to_string()]);
    }
}
