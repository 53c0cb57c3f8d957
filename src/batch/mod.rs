//! Batch Orchestrator (spec §4.7, component C7): an ad-hoc N-URL batch
//! with bounded concurrency, cancellation, and a completion webhook.
//! Shares the Fetcher (C5) with the crawl orchestrator; unlike a crawl,
//! a batch has no discovery step and no persistent crawl record.

use crate::fetcher::Fetcher;
use crate::models::{BatchRequest, BatchStatus, BatchStatusKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("too many urls: {0} (max 100)")]
    TooManyUrls(usize),
    #[error("concurrency {0} out of range (1-10)")]
    InvalidConcurrency(usize),
    #[error("per-url timeout {0}s too low (min 10s)")]
    TimeoutTooLow(u64),
    #[error("batch {0} not found")]
    NotFound(String),
}

const MAX_URLS: usize = 100;
const MAX_CONCURRENCY: usize = 10;
const MIN_PER_URL_TIMEOUT_S: u64 = 10;

fn validate(request: &BatchRequest) -> Result<(), BatchError> {
    if request.urls.len() > MAX_URLS {
        return Err(BatchError::TooManyUrls(request.urls.len()));
    }
    if request.concurrency == 0 || request.concurrency > MAX_CONCURRENCY {
        return Err(BatchError::InvalidConcurrency(request.concurrency));
    }
    if request.per_url_timeout_s < MIN_PER_URL_TIMEOUT_S {
        return Err(BatchError::TimeoutTooLow(request.per_url_timeout_s));
    }
    Ok(())
}

struct BatchEntry {
    status: BatchStatusKind,
    total: usize,
    succeeded: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

pub struct BatchOrchestrator {
    fetcher: Arc<Fetcher>,
    batches: Arc<RwLock<HashMap<String, BatchEntry>>>,
    http: reqwest::Client,
}

impl BatchOrchestrator {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        BatchOrchestrator {
            fetcher,
            batches: Arc::new(RwLock::new(HashMap::new())),
            http: reqwest::Client::new(),
        }
    }

    /// Validate and submit a batch; the controller coroutine runs in
    /// the background and this returns immediately with the batch id.
    pub async fn submit(&self, request: BatchRequest) -> Result<String, BatchError> {
        validate(&request)?;

        let batch_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let succeeded = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        self.batches.write().await.insert(
            batch_id.clone(),
            BatchEntry {
                status: BatchStatusKind::Running,
                total: request.urls.len(),
                succeeded: succeeded.clone(),
                failed: failed.clone(),
                cancel: cancel.clone(),
            },
        );

        let fetcher = self.fetcher.clone();
        let http = self.http.clone();
        let batches = self.batches.clone();
        let id_for_task = batch_id.clone();

        tokio::spawn(async move {
            run_controller(fetcher, request, cancel, succeeded, failed, http, batches, id_for_task).await;
        });

        Ok(batch_id)
    }

    pub async fn status(&self, batch_id: &str) -> Result<BatchStatus, BatchError> {
        let batches = self.batches.read().await;
        let entry = batches.get(batch_id).ok_or_else(|| BatchError::NotFound(batch_id.to_string()))?;
        Ok(BatchStatus {
            batch_id: batch_id.to_string(),
            status: entry.status,
            total: entry.total,
            succeeded: entry.succeeded.load(Ordering::Relaxed),
            failed: entry.failed.load(Ordering::Relaxed),
        })
    }

    /// Flip the batch to cancelled and halt further dispatch; in-flight
    /// fetches are not interrupted (spec §5 "Batch cancellation").
    pub async fn cancel(&self, batch_id: &str) -> Result<(), BatchError> {
        let mut batches = self.batches.write().await;
        let entry = batches.get_mut(batch_id).ok_or_else(|| BatchError::NotFound(batch_id.to_string()))?;
        entry.status = BatchStatusKind::Cancelled;
        entry.cancel.cancel();
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_controller(
    fetcher: Arc<Fetcher>,
    request: BatchRequest,
    cancel: CancellationToken,
    succeeded: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    http: reqwest::Client,
    batches: Arc<RwLock<HashMap<String, BatchEntry>>>,
    batch_id: String,
) {
    let semaphore = Arc::new(Semaphore::new(request.concurrency));
    let mut tasks = JoinSet::new();

    for url in request.urls.clone() {
        if cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let fetcher = fetcher.clone();
        let options = request.scrape_options.clone();
        let timeout = std::time::Duration::from_secs(request.per_url_timeout_s);
        let retries = request.retry_count;
        let fail_fast = request.fail_fast;
        let cancel = cancel.clone();
        let succeeded = succeeded.clone();
        let failed = failed.clone();

        tasks.spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return;
            }
            let mut attempt = 0;
            loop {
                let result = tokio::time::timeout(timeout, fetcher.fetch(&url, &options)).await;
                match result {
                    Ok(Ok(_)) => {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    _ if attempt < retries => {
                        attempt += 1;
                        continue;
                    }
                    _ => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        if fail_fast {
                            cancel.cancel();
                        }
                        return;
                    }
                }
            }
        });
    }

    while tasks.join_next().await.is_some() {}

    let final_status = if cancel.is_cancelled() {
        BatchStatusKind::Cancelled
    } else {
        BatchStatusKind::Completed
    };

    if let Some(entry) = batches.write().await.get_mut(&batch_id) {
        entry.status = final_status;
    }

    if let Some(webhook_url) = request.webhook_url {
        let body = serde_json::json!({
            "batch_id": batch_id,
            "succeeded": succeeded.load(Ordering::Relaxed),
            "failed": failed.load(Ordering::Relaxed),
        });
        if let Err(e) = http.post(&webhook_url).json(&body).send().await {
            tracing::warn!(batch_id, error = %e, "batch completion webhook failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScraperOptions;

    fn sample_request(urls: Vec<&str>) -> BatchRequest {
        BatchRequest {
            urls: urls.into_iter().map(String::from).collect(),
            concurrency: 5,
            per_url_timeout_s: 30,
            retry_count: 2,
            fail_fast: false,
            webhook_url: None,
            scrape_options: ScraperOptions::default(),
        }
    }

    #[test]
    fn rejects_more_than_100_urls() {
        let urls: Vec<&str> = (0..101).map(|_| "https://example.com").collect();
        assert!(matches!(validate(&sample_request(urls)), Err(BatchError::TooManyUrls(101))));
    }

    #[test]
    fn rejects_concurrency_out_of_range() {
        let mut req = sample_request(vec!["https://example.com"]);
        req.concurrency = 11;
        assert!(matches!(validate(&req), Err(BatchError::InvalidConcurrency(11))));
        req.concurrency = 0;
        assert!(validate(&req).is_err());
    }

    #[test]
    fn rejects_timeout_below_minimum() {
        let mut req = sample_request(vec!["https://example.com"]);
        req.per_url_timeout_s = 5;
        assert!(matches!(validate(&req), Err(BatchError::TimeoutTooLow(5))));
    }

    #[test]
    fn accepts_a_valid_request() {
        let req = sample_request(vec!["https://example.com"]);
        assert!(validate(&req).is_ok());
    }
}
