//! Shared data types that cross module boundaries: crawl/scrape options,
//! the crawl record persisted in the KV store, job payloads, and the
//! scraper response shape returned by every fetch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Crawl strategy & options -------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStrategy {
    Bfs,
    Dfs,
    BestFirst,
}

impl Default for CrawlStrategy {
    fn default() -> Self {
        CrawlStrategy::Bfs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorFormat {
    Html,
    Markdown,
    Text,
}

impl Default for ExtractorFormat {
    fn default() -> Self {
        ExtractorFormat::Markdown
    }
}

/// Closed set of per-fetch/per-page scrape options (spec §9: "Dynamic
/// option bags -> closed configuration records").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperOptions {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub viewport: Option<(u32, u32)>,
    #[serde(default)]
    pub wait_for_selector: Option<String>,
    #[serde(default)]
    pub wait_for_timeout_ms: Option<u64>,
    #[serde(default)]
    pub actions: Vec<PageAction>,
    #[serde(default = "default_true")]
    pub block_ads: bool,
    #[serde(default)]
    pub block_resources: bool,
    #[serde(default)]
    pub stealth_mode: bool,
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: u32,
    #[serde(default)]
    pub use_browser: bool,
    #[serde(default)]
    pub skip_tls_verification: bool,
    #[serde(default)]
    pub extractor_format: ExtractorFormat,
    #[serde(default)]
    pub skip_cache: bool,
    #[serde(default = "default_cache_ttl_s")]
    pub cache_ttl_s: u64,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default)]
    pub rotate_user_agent: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub proxy_username: Option<String>,
    #[serde(default)]
    pub proxy_password: Option<String>,
    #[serde(default)]
    pub proxy_rotation: bool,
    #[serde(default)]
    pub proxy_list: Vec<String>,
    #[serde(default)]
    pub run_lighthouse: bool,
    #[serde(default)]
    pub run_js_render: bool,
    #[serde(default)]
    pub custom_extractors: Vec<crate::analysis::extractor::ExtractorConfig>,
}

fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_scrolls() -> u32 {
    3
}
fn default_cache_ttl_s() -> u64 {
    3600
}
fn default_min_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for ScraperOptions {
    fn default() -> Self {
        ScraperOptions {
            timeout_ms: default_timeout_ms(),
            user_agent: None,
            viewport: None,
            wait_for_selector: None,
            wait_for_timeout_ms: None,
            actions: Vec::new(),
            block_ads: true,
            block_resources: false,
            stealth_mode: false,
            max_scrolls: default_max_scrolls(),
            use_browser: false,
            skip_tls_verification: false,
            extractor_format: ExtractorFormat::default(),
            skip_cache: false,
            cache_ttl_s: default_cache_ttl_s(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            rotate_user_agent: false,
            proxy: None,
            proxy_username: None,
            proxy_password: None,
            proxy_rotation: false,
            proxy_list: Vec::new(),
            run_lighthouse: false,
            run_js_render: false,
            custom_extractors: Vec::new(),
        }
    }
}

/// A single scripted browser action (scroll/click/wait), run in order
/// before link extraction when `use_browser` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageAction {
    Click { selector: String },
    Wait { ms: u64 },
    Scroll,
}

/// Crawl-wide policy: discovery rules, depth/page limits, and strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default)]
    pub allow_backward: bool,
    #[serde(default)]
    pub allow_external: bool,
    #[serde(default)]
    pub ignore_robots: bool,
    #[serde(default)]
    pub strategy: CrawlStrategy,
    #[serde(default)]
    pub use_browser_discovery: bool,
    #[serde(default = "default_max_discovery_depth")]
    pub max_discovery_depth: u32,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub report_backlinks: bool,
}

fn default_max_depth() -> u32 {
    3
}
fn default_max_pages() -> u32 {
    100
}
fn default_max_discovery_depth() -> u32 {
    2
}

impl Default for CrawlOptions {
    fn default() -> Self {
        CrawlOptions {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            allow_subdomains: false,
            allow_backward: false,
            allow_external: false,
            ignore_robots: false,
            strategy: CrawlStrategy::default(),
            use_browser_discovery: false,
            max_discovery_depth: default_max_discovery_depth(),
            webhook_url: None,
            report_backlinks: false,
        }
    }
}

/// One crawl, keyed by `crawl_id`. Persisted at `crawl:{id}` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub id: String,
    pub origin_url: String,
    pub options: CrawlOptions,
    pub scrape_options: ScraperOptions,
    pub created_at_ms: u64,
    #[serde(default)]
    pub robots_txt: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub extraction: Option<ExtractionOptions>,
}

// --- Jobs ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Kickoff,
    Page,
    BatchPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Success,
    Failed,
}

/// A queued unit of work (spec §3 "Job"). `id` is opaque and, for page
/// jobs, derived from a hash of (crawl_id, normalized url) so the queue
/// can reject duplicates (spec §4.3 "Duplicate suppression").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub parent_crawl_id: Option<String>,
    pub mode: JobMode,
    pub target_url: String,
    pub scrape_options: ScraperOptions,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub priority: i64,
}

// --- Scrape result shape (spec §6) ---------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeMetadata {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub load_time_ms: u64,
    pub processing_time_ms: u64,
    pub used_browser: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighthouse: Option<crate::lighthouse::LighthouseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_links: Option<Vec<crate::renderer::RenderedLink>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub content: String,
    pub content_type: ExtractorFormat,
    pub links: Vec<String>,
    pub metadata: ScrapeMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_analysis: Option<crate::analysis::parser::ParsedPage>,
}

/// Schema-guided extraction request, passed to the LLM extractor
/// collaborator (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub schema: serde_json::Value,
    #[serde(default)]
    pub prompt: Option<String>,
}

// --- Progress / discovery events -----------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CrawlEvent {
    #[serde(rename = "url-discovered")]
    UrlDiscovered { url: String, total_discovered: u64 },
    #[serde(rename = "url-crawled")]
    UrlCrawled {
        url: String,
        total_crawled: u64,
        new_urls: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub discovered: u64,
    pub crawled: u64,
    pub failed: u64,
}

// --- Batch orchestrator (C7) ----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_timeout_s")]
    pub per_url_timeout_s: u64,
    #[serde(default = "default_batch_retries")]
    pub retry_count: u32,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub scrape_options: ScraperOptions,
}

fn default_batch_concurrency() -> usize {
    5
}
fn default_batch_timeout_s() -> u64 {
    30
}
fn default_batch_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatusKind {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: String,
    pub status: BatchStatusKind,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}
