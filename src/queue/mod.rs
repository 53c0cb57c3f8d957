//! Job Queue (spec §4.3, component C3): durable FIFO with priority,
//! retries with exponential backoff, lease renewal, bulk enqueue, and
//! dynamic concurrency.

use crate::models::{Job, JobState};
use crate::store::{RedisStore, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const LEASE_DURATION: Duration = Duration::from_secs(60);
/// Lease is renewed once it's 80% through its life (spec §4.3 "lease
/// renewal").
const LEASE_RENEW_FRACTION: f64 = 0.8;

fn queue_key() -> &'static str {
    "queue:pending"
}
fn job_key(job_id: &str) -> String {
    format!("queue:job:{job_id}")
}
fn lease_key(job_id: &str) -> String {
    format!("queue:lease:{job_id}")
}
fn seen_key() -> &'static str {
    "queue:seen"
}
fn processing_key() -> &'static str {
    "queue:processing"
}

/// Queue ordering matches the crawl strategy chosen at kickoff (spec
/// §4.4 "Queue ordering strategies"): BFS appends right, DFS appends
/// left, best-first is handled by the caller pre-sorting before bulk
/// enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOrder {
    Append,
    Prepend,
}

pub struct JobQueue {
    store: RedisStore,
    concurrency: Arc<AtomicUsize>,
    min_concurrency: usize,
    max_concurrency: usize,
    paused: Arc<RwLock<bool>>,
}

#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub pending: u64,
    pub active_concurrency: usize,
}

/// Terminal-ness of a [`JobQueue::complete`] call, used by the caller to
/// decide whether to record a success/failure in the crawl state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Succeeded,
    Retrying,
    PermanentlyFailed,
}

impl JobQueue {
    pub fn new(store: RedisStore, initial_concurrency: usize, min: usize, max: usize) -> Self {
        JobQueue {
            store,
            concurrency: Arc::new(AtomicUsize::new(initial_concurrency)),
            min_concurrency: min,
            max_concurrency: max,
            paused: Arc::new(RwLock::new(false)),
        }
    }

    /// Enqueue a single job. Duplicate ids (hash of crawl_id + normalized
    /// url, per spec's "Duplicate suppression") are silently dropped.
    pub async fn add(&self, job: &Job, ordering: EnqueueOrder) -> Result<bool, StoreError> {
        if !self.store.sadd(seen_key(), &job.id).await? {
            return Ok(false);
        }
        self.store
            .set(&job_key(&job.id), &serde_json::to_string(job).unwrap())
            .await?;
        let payload = serde_json::to_string(&JobRef {
            id: job.id.clone(),
            priority: job.priority,
        })
        .unwrap();
        match ordering {
            EnqueueOrder::Append => self.store.rpush(queue_key(), &payload).await?,
            EnqueueOrder::Prepend => self.store.lpush(queue_key(), &payload).await?,
        }
        Ok(true)
    }

    pub async fn add_bulk(&self, jobs: &[Job], ordering: EnqueueOrder) -> Result<usize, StoreError> {
        let mut added = 0;
        for job in jobs {
            if self.add(job, ordering).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Pop the next job if the queue isn't paused, acquiring a
    /// renewable lease. Spawns a background renewal task that refreshes
    /// the lease at 80% of its lifetime until `token` is cancelled or the
    /// caller drops the returned handle's cancel guard.
    pub async fn dequeue(&self) -> Result<Option<(Job, CancellationToken)>, StoreError> {
        if *self.paused.read().await {
            return Ok(None);
        }
        let Some(raw) = self.store.lpop(queue_key()).await? else {
            return Ok(None);
        };
        let job_ref: JobRef = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };
        let Some(job_raw) = self.store.get(&job_key(&job_ref.id)).await? else {
            return Ok(None);
        };
        let job: Job = match serde_json::from_str(&job_raw) {
            Ok(j) => j,
            Err(_) => return Ok(None),
        };

        self.store.sadd(processing_key(), &job.id).await?;
        self.store
            .setnx_ex(&lease_key(&job.id), "locked", LEASE_DURATION)
            .await?;

        let token = CancellationToken::new();
        let renew_token = token.clone();
        let store = self.store.clone();
        let lease_key_owned = lease_key(&job.id);
        let renew_after = Duration::from_secs_f64(LEASE_DURATION.as_secs_f64() * LEASE_RENEW_FRACTION);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = renew_token.cancelled() => break,
                    _ = tokio::time::sleep(renew_after) => {
                        if store.expire(&lease_key_owned, LEASE_DURATION).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Some((job, token)))
    }

    /// Mark a job's outcome, retrying with exponential backoff until its
    /// attempt budget is exhausted (spec §4.3 "Failure semantics"). The
    /// caller uses the returned [`CompletionOutcome`] to decide whether to
    /// record a terminal success/failure in the crawl state store — a
    /// job that's still being retried hasn't reached a terminal state yet.
    pub async fn complete(
        &self,
        job: &Job,
        state: JobState,
        max_retries: u32,
        base_delay: Duration,
    ) -> Result<CompletionOutcome, StoreError> {
        match state {
            JobState::Success => {
                self.store.srem(processing_key(), &job.id).await?;
                self.store.del(&job_key(&job.id)).await?;
                self.store.del(&lease_key(&job.id)).await?;
                Ok(CompletionOutcome::Succeeded)
            }
            JobState::Failed if job.retry_count < max_retries => {
                let mut retried = job.clone();
                retried.retry_count += 1;
                let delay = base_delay.mul_f64(2f64.powi(retried.retry_count as i32 - 1));
                self.store
                    .set(&job_key(&job.id), &serde_json::to_string(&retried).unwrap())
                    .await?;
                self.store.srem(processing_key(), &job.id).await?;
                self.store.del(&lease_key(&job.id)).await?;
                tokio::time::sleep(delay.min(Duration::from_secs(300))).await;
                // The id is still in `seen` from the original enqueue, so
                // `add` would otherwise treat this as a duplicate and drop
                // it silently; clear it first so the retry is actually
                // re-dispatched.
                self.store.srem(seen_key(), &retried.id).await?;
                self.add(&retried, EnqueueOrder::Append).await?;
                Ok(CompletionOutcome::Retrying)
            }
            _ => {
                self.store.srem(processing_key(), &job.id).await?;
                self.store.del(&job_key(&job.id)).await?;
                self.store.del(&lease_key(&job.id)).await?;
                Ok(CompletionOutcome::PermanentlyFailed)
            }
        }
    }

    /// Reclaim jobs whose lease expired without the job reaching a
    /// terminal state — the worker that leased them crashed or was killed
    /// mid-processing (spec §4.3 "lease renewal"; S6 "another worker
    /// picks up the same job id"). Re-pushes each reclaimed job onto the
    /// pending list at its existing retry count, so the normal retry
    /// budget in [`Self::complete`] still bounds repeated crash-reclaims
    /// of a pathological job.
    pub async fn reap_expired(&self) -> Result<usize, StoreError> {
        let processing = self.store.smembers(processing_key()).await?;
        let mut reclaimed = 0;
        for job_id in processing {
            if self.store.get(&lease_key(&job_id)).await?.is_some() {
                continue;
            }
            let Some(job_raw) = self.store.get(&job_key(&job_id)).await? else {
                // Already completed and cleaned up; just drop the stray entry.
                self.store.srem(processing_key(), &job_id).await?;
                continue;
            };
            let Ok(job): Result<Job, _> = serde_json::from_str(&job_raw) else {
                self.store.srem(processing_key(), &job_id).await?;
                continue;
            };
            self.store.srem(processing_key(), &job_id).await?;
            let payload = serde_json::to_string(&JobRef {
                id: job.id.clone(),
                priority: job.priority,
            })
            .unwrap();
            self.store.rpush(queue_key(), &payload).await?;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    /// Periodically reclaim crashed workers' jobs (spec §4.3). Runs
    /// alongside [`Self::run_dynamic_scaling`], independent of it.
    pub async fn run_lease_reaper(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(LEASE_DURATION);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.reap_expired().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(reclaimed = n, "reaped crashed workers' jobs"),
                        Err(e) => tracing::error!(error = %e, "lease reaper failed"),
                    }
                }
            }
        }
    }

    pub async fn pause(&self) {
        *self.paused.write().await = true;
    }

    pub async fn resume(&self) {
        *self.paused.write().await = false;
    }

    pub async fn stats(&self) -> Result<QueueStats, StoreError> {
        Ok(QueueStats {
            pending: self.store.llen(queue_key()).await?,
            active_concurrency: self.concurrency.load(AtomicOrdering::Relaxed),
        })
    }

    pub async fn clean(&self) -> Result<(), StoreError> {
        self.store.del(queue_key()).await?;
        self.store.del(processing_key()).await?;
        self.store.del(seen_key()).await
    }

    pub fn current_concurrency(&self) -> usize {
        self.concurrency.load(AtomicOrdering::Relaxed)
    }

    /// Dynamic concurrency control loop (spec §4.3 "Dynamic
    /// concurrency"): every 30s, read queue depth and a coarse load
    /// signal, and move concurrency by 1 step within bounds.
    pub async fn run_dynamic_scaling(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let Ok(stats) = self.stats().await else { continue };
                    let load = coarse_load_signal();
                    let current = self.concurrency.load(AtomicOrdering::Relaxed);
                    if stats.pending > (current as u64) * 4 && load < 0.7 && current < self.max_concurrency {
                        self.concurrency.store(current + 1, AtomicOrdering::Relaxed);
                    } else if load > 0.9 && current > self.min_concurrency {
                        self.concurrency.store(current - 1, AtomicOrdering::Relaxed);
                    }
                }
            }
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct JobRef {
    id: String,
    #[allow(dead_code)]
    priority: i64,
}

/// 1-minute load average normalized to roughly [0, 1]; a coarse signal,
/// not a precise scheduler input (spec: "a coarse system-load reading").
fn coarse_load_signal() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/loadavg") {
            if let Some(one_min) = contents.split_whitespace().next() {
                if let Ok(load) = one_min.parse::<f64>() {
                    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f64;
                    return (load / cores).min(1.0);
                }
            }
        }
    }
    0.5
}

/// Tracks which job ids currently belong to a crawl, used only for
/// local bookkeeping of generated ids (duplicate suppression itself
/// lives in the `seen` set above).
pub fn hash_job_id(crawl_id: &str, normalized_url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(crawl_id.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_url.as_bytes());
    hex::encode(hasher.finalize())
}

#[allow(dead_code)]
fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert((*id).clone())).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_job_id_is_deterministic_and_sensitive_to_both_inputs() {
        let a = hash_job_id("crawl1", "https://example.com/a");
        let b = hash_job_id("crawl1", "https://example.com/a");
        let c = hash_job_id("crawl1", "https://example.com/b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
