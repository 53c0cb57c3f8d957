//! Crawl Orchestrator (spec §4.6, component C6): kickoff → discover →
//! fan-out → per-page scrape → completion, with content transforms,
//! export, and the completion webhook.

pub mod export;

use crate::analysis::Parser as PageParser;
use crate::content::{cleaner, markdown};
use crate::fetcher::Fetcher;
use crate::lighthouse::LighthouseRunner;
use crate::llm::LlmExtractor;
use crate::models::{CrawlProgress, CrawlRecord, ExtractionOptions, Job, JobMode, JobState};
use crate::policy::robots::RobotsChecker;
use crate::policy::{filter_links, sitemap};
use crate::queue::{hash_job_id, EnqueueOrder, JobQueue};
use crate::renderer::JsRenderer;
use crate::store::crawl_state::CrawlStateStore;
use export::{ConsolidatedFormat, Exporter};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("fetch error: {0}")]
    Fetch(#[from] crate::fetcher::FetchError),
    #[error("export error: {0}")]
    Export(#[from] export::ExportError),
    #[error("crawl {0} not found")]
    CrawlNotFound(String),
}

/// Outcome of a `page` job — distinguishes the at-most-once no-op paths
/// (cancelled / lock contention) from a real fetch result, per spec
/// §4.6 and §7.
pub enum PageOutcome {
    Success,
    SkippedCancelled,
    SkippedAlreadyLocked,
}

pub struct Orchestrator {
    pub crawl_state: CrawlStateStore,
    pub queue: Arc<JobQueue>,
    fetcher: Arc<Fetcher>,
    exporter: Exporter,
    http: reqwest::Client,
    llm: LlmExtractor,
    webhook_secret: Option<String>,
    lighthouse: LighthouseRunner,
    renderer: JsRenderer,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        crawl_state: CrawlStateStore,
        queue: Arc<JobQueue>,
        fetcher: Arc<Fetcher>,
        exporter: Exporter,
        llm: LlmExtractor,
        webhook_secret: Option<String>,
        lighthouse: LighthouseRunner,
        renderer: JsRenderer,
    ) -> Self {
        Orchestrator {
            crawl_state,
            queue,
            fetcher,
            exporter,
            http: reqwest::Client::new(),
            llm,
            webhook_secret,
            lighthouse,
            renderer,
        }
    }

    /// `kickoff(crawl_id, seed_url)` (spec §4.6).
    pub async fn kickoff(&self, crawl_id: &str) -> Result<usize, OrchestratorError> {
        let record = self
            .crawl_state
            .get_crawl(crawl_id)
            .await?
            .ok_or_else(|| OrchestratorError::CrawlNotFound(crawl_id.to_string()))?;

        let seed_url = &record.origin_url;
        let normalized_seed = crate::policy::normalize::normalize(seed_url).unwrap_or_else(|| seed_url.clone());
        self.crawl_state.lock_url(crawl_id, &normalized_seed).await?;

        let mut scrape_options = record.scrape_options.clone();
        if record.options.use_browser_discovery {
            scrape_options.use_browser = true;
        }
        let outcome = self.fetcher.fetch(seed_url, &scrape_options).await?;

        let robots = match &record.robots_txt {
            Some(text) => RobotsChecker::parse(text),
            None => RobotsChecker::empty(),
        };

        let mut candidates = outcome.discovered_links.clone();
        candidates.extend(sitemap::discover(&self.http, seed_url).await);

        let base = Url::parse(seed_url).map_err(|_| OrchestratorError::CrawlNotFound(crawl_id.to_string()))?;
        let already_locked: std::collections::HashSet<String> =
            [normalized_seed.clone()].into_iter().collect();
        let survivors = filter_links(&candidates, &base, &record.options, &robots, &already_locked);

        let newly_locked = self.crawl_state.lock_urls(crawl_id, &survivors).await?;

        let ordering = match record.options.strategy {
            crate::models::CrawlStrategy::Dfs => EnqueueOrder::Prepend,
            _ => EnqueueOrder::Append,
        };

        let mut job_ids = Vec::with_capacity(newly_locked.len());
        let mut jobs = Vec::with_capacity(newly_locked.len());
        for url in &newly_locked {
            let id = hash_job_id(crawl_id, url);
            job_ids.push(id.clone());
            jobs.push(Job {
                id,
                parent_crawl_id: Some(crawl_id.to_string()),
                mode: JobMode::Page,
                target_url: url.clone(),
                scrape_options: record.scrape_options.clone(),
                retry_count: 0,
                priority: 0,
            });
        }
        self.queue.add_bulk(&jobs, ordering).await?;
        self.crawl_state.add_jobs(crawl_id, &job_ids).await?;

        if jobs.is_empty() {
            // No survivors past filtering — no page job will ever call
            // maybe_finish, so the crawl would otherwise wait forever.
            self.maybe_finish(crawl_id).await?;
        }

        Ok(jobs.len())
    }

    /// `page(crawl_id, url)` (spec §4.6). Errors propagate so the queue
    /// retries; the caller is responsible for counting failures once
    /// the retry budget is exhausted.
    pub async fn page(
        &self,
        crawl_id: &str,
        url: &str,
        scrape_options: &crate::models::ScraperOptions,
        extraction: Option<&ExtractionOptions>,
    ) -> Result<PageOutcome, OrchestratorError> {
        if self.crawl_state.is_cancelled(crawl_id).await? {
            return Ok(PageOutcome::SkippedCancelled);
        }

        let normalized = crate::policy::normalize::normalize(url).unwrap_or_else(|| url.to_string());
        if !self.crawl_state.lock_url(crawl_id, &normalized).await? {
            return Ok(PageOutcome::SkippedAlreadyLocked);
        }

        let outcome = self.fetcher.fetch(url, scrape_options).await?;
        let started = std::time::Instant::now();
        let mut response = outcome.into_scraper_response(url, 0);

        response = cleaner::clean(response);

        if let Some(html) = response.html.as_deref() {
            response.page_analysis = Some(PageParser::parse_with_extractors(
                html,
                url,
                &scrape_options.custom_extractors,
            ));
        }

        if scrape_options.run_lighthouse {
            match self.lighthouse.run_lighthouse(url).await {
                Ok(result) => response.metadata.lighthouse = Some(result),
                Err(e) => tracing::warn!(url, error = %e, "lighthouse audit failed, continuing without it"),
            }
        }
        if scrape_options.run_js_render {
            match self.renderer.render_links(url).await {
                Ok(links) => response.metadata.rendered_links = Some(links),
                Err(e) => tracing::warn!(url, error = %e, "js render failed, continuing without it"),
            }
        }

        response = markdown::transform(response, scrape_options.extractor_format);

        if let Some(extraction_options) = extraction {
            let fallback = response.clone();
            response = match self.llm.extract(response, extraction_options).await {
                Ok(extracted) => extracted,
                Err(e) => {
                    tracing::warn!(url, error = %e, "llm extraction failed, continuing without it");
                    fallback
                }
            };
        }
        response.metadata.processing_time_ms = started.elapsed().as_millis() as u64;

        let now_ms = now_ms();
        let path = self
            .exporter
            .export_page(
                url,
                &response.content,
                response.title.as_deref(),
                crawl_id,
                &response.metadata,
                now_ms,
            )
            .await?;
        self.crawl_state
            .add_exported_file(crawl_id, &path.to_string_lossy())
            .await?;

        let url_hash = hash_job_id(crawl_id, &normalized);
        if self.crawl_state.mark_success(crawl_id, &url_hash).await? {
            self.maybe_finish(crawl_id).await?;
        }

        Ok(PageOutcome::Success)
    }

    /// Record a page job's permanent failure (spec §4.2: "after retry
    /// budget exhausted, C2 records the failure"), called once the queue
    /// has exhausted `job`'s retry budget. `job_id` is the same hash used
    /// for the job's entry in the `jobs` set, so it counts toward
    /// completion the same way a success does.
    pub async fn record_failure(&self, crawl_id: &str, job_id: &str) -> Result<(), OrchestratorError> {
        if self.crawl_state.mark_failed(crawl_id, job_id).await? {
            self.maybe_finish(crawl_id).await?;
        }
        Ok(())
    }

    /// Run the consolidation exports and completion webhook once every
    /// enqueued job has reached a terminal state, but only for the single
    /// caller that wins the write-once `finish` marker (invariant #3:
    /// `finish` is set exactly once) — otherwise every page completing
    /// after the crawl is already finished would re-fire the webhook.
    async fn maybe_finish(&self, crawl_id: &str) -> Result<(), OrchestratorError> {
        if !self.crawl_state.is_finished(crawl_id).await? {
            return Ok(());
        }
        if !self.crawl_state.try_finish(crawl_id).await? {
            return Ok(());
        }

        let record = self.crawl_state.get_crawl(crawl_id).await?;
        let files = self.crawl_state.get_exported_files(crawl_id).await?;
        let progress = CrawlProgress {
            discovered: self.crawl_state.locked_count(crawl_id).await?,
            crawled: self.crawl_state.done_success_count(crawl_id).await?,
            failed: self.crawl_state.done_failed_count(crawl_id).await?,
        };

        self.exporter.export_summary(crawl_id, &progress).await?;
        self.exporter
            .export_consolidated(crawl_id, ConsolidatedFormat::Markdown, &files)
            .await?;
        self.exporter
            .export_consolidated(crawl_id, ConsolidatedFormat::Json, &files)
            .await?;

        if let Some(record) = record {
            self.fire_webhook(&record, &progress).await;
        }
        Ok(())
    }

    async fn fire_webhook(&self, record: &CrawlRecord, progress: &CrawlProgress) {
        let Some(webhook_url) = record.options.webhook_url.as_deref() else {
            return;
        };
        let body = serde_json::json!({
            "crawl_id": record.id,
            "discovered": progress.discovered,
            "crawled": progress.crawled,
            "failed": progress.failed,
        })
        .to_string();

        let mut request = self.http.post(webhook_url).header("Content-Type", "application/json");
        if let Some(secret) = &self.webhook_secret {
            let timestamp = now_ms().to_string();
            if let Ok(signature) = sign(secret, &timestamp, &body) {
                request = request
                    .header("X-Signature", signature)
                    .header("X-Timestamp", timestamp);
            }
        }

        if let Err(e) = request.body(body).send().await {
            tracing::warn!(crawl_id = %record.id, error = %e, "completion webhook failed");
        }
    }

    pub async fn cancel(&self, crawl_id: &str) -> Result<(), OrchestratorError> {
        self.crawl_state.cancel(crawl_id).await?;
        Ok(())
    }

    /// Drain the job queue forever, dispatching each dequeued page job
    /// through [`Self::page`] and reporting the outcome back to the
    /// queue for retry/backoff bookkeeping (spec §4.3/§4.6 worker loop).
    /// Several of these can run concurrently; each one processes at most
    /// one job at a time, so fan-out comes from running several workers,
    /// not from concurrency inside this loop.
    pub async fn run_worker(self: Arc<Self>, max_retries: u32, retry_base_delay: Duration, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = self.queue.dequeue() => next,
            };
            let (job, lease) = match next {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to dequeue job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(crawl_id) = job.parent_crawl_id.clone() else {
                lease.cancel();
                continue;
            };

            let extraction = match self.crawl_state.get_crawl(&crawl_id).await {
                Ok(Some(record)) => record.extraction,
                _ => None,
            };

            let result = match job.mode {
                JobMode::Page | JobMode::BatchPage => {
                    self.page(&crawl_id, &job.target_url, &job.scrape_options, extraction.as_ref())
                        .await
                }
                JobMode::Kickoff => self.kickoff(&crawl_id).await.map(|_| PageOutcome::Success),
            };
            lease.cancel();

            let state = match result {
                Ok(_) => JobState::Success,
                Err(e) => {
                    tracing::warn!(crawl_id, url = job.target_url, error = %e, "page job failed");
                    JobState::Failed
                }
            };
            match self.queue.complete(&job, state, max_retries, retry_base_delay).await {
                Ok(crate::queue::CompletionOutcome::PermanentlyFailed) => {
                    if let Err(e) = self.record_failure(&crawl_id, &job.id).await {
                        tracing::error!(crawl_id, error = %e, "failed to record permanent job failure");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(crawl_id, error = %e, "failed to record job completion"),
            }
        }
    }

    /// Maintain a pool of [`Self::run_worker`] tasks whose size tracks
    /// `JobQueue::current_concurrency()` (spec §4.3 "dynamic concurrency"),
    /// spawning or retiring individual worker tasks as the target moves.
    /// This is what makes [`JobQueue::run_dynamic_scaling`]'s concurrency
    /// atomic actually change the number of jobs processed at once —
    /// without it, adjusting the atomic has no effect on dispatch.
    pub async fn run_pool(self: Arc<Self>, max_retries: u32, retry_base_delay: Duration, cancel: CancellationToken) {
        let mut workers: Vec<(CancellationToken, tokio::task::JoinHandle<()>)> = Vec::new();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let target = self.queue.current_concurrency().max(1);
            while workers.len() < target {
                let worker_cancel = CancellationToken::new();
                let token = worker_cancel.clone();
                let orchestrator = self.clone();
                let handle =
                    tokio::spawn(async move { orchestrator.run_worker(max_retries, retry_base_delay, token).await });
                workers.push((worker_cancel, handle));
            }
            while workers.len() > target {
                if let Some((token, handle)) = workers.pop() {
                    token.cancel();
                    let _ = handle.await;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
        }
        for (token, handle) in workers {
            token.cancel();
            let _ = handle.await;
        }
    }
}

fn sign(secret: &str, timestamp: &str, body: &str) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Clock-drift tolerance applied by webhook receivers, not the sender —
/// documented here since this is the one place a timestamp is minted.
pub const WEBHOOK_CLOCK_DRIFT_TOLERANCE_SECS: u64 = 300;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_the_same_inputs() {
        let a = sign("secret", "1000", "body").unwrap();
        let b = sign("secret", "1000", "body").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_body() {
        let a = sign("secret", "1000", "body1").unwrap();
        let b = sign("secret", "1000", "body2").unwrap();
        assert_ne!(a, b);
    }
}
