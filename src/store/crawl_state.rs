//! Crawl State Store (spec §4.2, component C2): everything a crawl needs
//! to coordinate across workers — the crawl record itself, URL locks that
//! give at-most-once page processing, completion markers, and the list of
//! files the exporter has written.
//!
//! Every key under a crawl lives for [`CRAWL_STATE_TTL`] and that TTL is
//! refreshed on each mutating access, so a crawl that's actively being
//! worked never expires out from under it, but an abandoned one reaps
//! itself after 24h.

use super::{RedisStore, StoreError};
use crate::models::CrawlRecord;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// All crawl state keys live for this long from their last write; expired
/// crawls are simply gone rather than leaving partial state behind.
pub const CRAWL_STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn crawl_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}")
}
fn jobs_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:jobs")
}
fn locks_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:locked_urls")
}
fn done_success_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:done:success")
}
fn done_failed_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:done:failed")
}
fn finish_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:finish")
}
fn completed_at_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:completed_at")
}
fn cancelled_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:cancelled")
}
fn files_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:files")
}

#[derive(Clone)]
pub struct CrawlStateStore {
    store: RedisStore,
}

impl CrawlStateStore {
    pub fn new(store: RedisStore) -> Self {
        CrawlStateStore { store }
    }

    /// Persist (or overwrite) the crawl record and refresh its TTL.
    pub async fn save_crawl(&self, record: &CrawlRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record).expect("CrawlRecord is always serializable");
        self.store.set(&crawl_key(&record.id), &json).await?;
        self.store.expire(&crawl_key(&record.id), CRAWL_STATE_TTL).await
    }

    /// Fetch the crawl record, refreshing its TTL on read so a crawl
    /// that's still being polled doesn't expire mid-flight.
    pub async fn get_crawl(&self, crawl_id: &str) -> Result<Option<CrawlRecord>, StoreError> {
        let key = crawl_key(crawl_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        self.store.expire(&key, CRAWL_STATE_TTL).await?;
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::error!(error = %e, crawl_id, "corrupt crawl record in store");
                Ok(None)
            }
        }
    }

    /// Track a job id as belonging to this crawl (used for progress
    /// accounting and cancellation fan-out, independent of the job
    /// queue's own bookkeeping).
    pub async fn add_job(&self, crawl_id: &str, job_id: &str) -> Result<(), StoreError> {
        let key = jobs_key(crawl_id);
        self.store.sadd(&key, job_id).await?;
        self.store.expire(&key, CRAWL_STATE_TTL).await
    }

    pub async fn add_jobs(&self, crawl_id: &str, job_ids: &[String]) -> Result<u64, StoreError> {
        let key = jobs_key(crawl_id);
        let added = self.store.sadd_many(&key, job_ids).await?;
        self.store.expire(&key, CRAWL_STATE_TTL).await?;
        Ok(added)
    }

    pub async fn job_count(&self, crawl_id: &str) -> Result<u64, StoreError> {
        self.store.scard(&jobs_key(crawl_id)).await
    }

    /// Claim a single normalized URL for this crawl. Returns `true` iff
    /// the caller is the first to claim it, giving at-most-once dispatch
    /// of any given URL within a crawl. Membership is checked through the
    /// similar-URL equivalence class (spec §4.4), not bare string equality,
    /// so a `www.`/scheme/trailing-slash variant of an already-locked URL
    /// is rejected too.
    ///
    /// The read-then-SADD here isn't atomic, so two equivalent-but-distinct
    /// raw strings locked in the same instant could both win; the exact
    /// SADD below still makes identical strings at-most-once, and the
    /// equivalence check narrows (without fully closing) the remaining
    /// window for near-duplicate variants.
    pub async fn lock_url(&self, crawl_id: &str, normalized_url: &str) -> Result<bool, StoreError> {
        let key = locks_key(crawl_id);
        let existing = self.store.smembers(&key).await?;
        if existing
            .iter()
            .any(|u| crate::policy::normalize::are_equivalent(u, normalized_url))
        {
            return Ok(false);
        }
        let acquired = self.store.sadd(&key, normalized_url).await?;
        self.store.expire(&key, CRAWL_STATE_TTL).await?;
        Ok(acquired)
    }

    /// Claim a batch of normalized URLs in one round trip, returning only
    /// the ones this caller newly claimed (the rest were already locked,
    /// by another worker or by an equivalent sibling earlier in this same
    /// batch, and should be skipped). See [`Self::lock_url`] for the
    /// equivalence-check caveat.
    pub async fn lock_urls(
        &self,
        crawl_id: &str,
        normalized_urls: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if normalized_urls.is_empty() {
            return Ok(Vec::new());
        }
        let key = locks_key(crawl_id);
        let mut locked_so_far = self.store.smembers(&key).await?;
        let mut fresh = Vec::new();
        for url in normalized_urls {
            let dup = locked_so_far
                .iter()
                .any(|existing| crate::policy::normalize::are_equivalent(existing, url));
            if !dup {
                fresh.push(url.clone());
                locked_so_far.push(url.clone());
            }
        }
        if !fresh.is_empty() {
            self.store.sadd_many(&key, &fresh).await?;
            self.store.expire(&key, CRAWL_STATE_TTL).await?;
        }
        Ok(fresh)
    }

    pub async fn locked_count(&self, crawl_id: &str) -> Result<u64, StoreError> {
        self.store.scard(&locks_key(crawl_id)).await
    }

    /// Record a job id as having reached terminal success. Returns `true`
    /// iff this call is the one that added it — callers should only count
    /// the page and run side effects when this is `true`, which gives
    /// at-most-once page processing under redelivery (spec §6: `done:success`
    /// set).
    pub async fn mark_success(&self, crawl_id: &str, job_id: &str) -> Result<bool, StoreError> {
        let key = done_success_key(crawl_id);
        let added = self.store.sadd(&key, job_id).await?;
        self.store.expire(&key, CRAWL_STATE_TTL).await?;
        Ok(added)
    }

    /// Record a job id as having exhausted its retry budget (spec §4.2:
    /// "after retry budget exhausted, C2 records the failure"; spec §6:
    /// `done:failed` set). Returns `true` iff newly recorded.
    pub async fn mark_failed(&self, crawl_id: &str, job_id: &str) -> Result<bool, StoreError> {
        let key = done_failed_key(crawl_id);
        let added = self.store.sadd(&key, job_id).await?;
        self.store.expire(&key, CRAWL_STATE_TTL).await?;
        Ok(added)
    }

    pub async fn done_success_count(&self, crawl_id: &str) -> Result<u64, StoreError> {
        self.store.scard(&done_success_key(crawl_id)).await
    }

    pub async fn done_failed_count(&self, crawl_id: &str) -> Result<u64, StoreError> {
        self.store.scard(&done_failed_key(crawl_id)).await
    }

    /// A crawl is finished once every enqueued page job has reached a
    /// terminal state (invariant #2: `jobs = done:success ∪ done:failed ∪
    /// pending`, with `pending` empty). Compared against `job_count`, the
    /// size of the `jobs` set recorded at kickoff — not `locked_count`,
    /// which also includes the seed URL that was locked but never itself
    /// enqueued as a page job.
    pub async fn is_finished(&self, crawl_id: &str) -> Result<bool, StoreError> {
        let jobs = self.job_count(crawl_id).await?;
        let done = self.done_success_count(crawl_id).await? + self.done_failed_count(crawl_id).await?;
        Ok(done >= jobs)
    }

    /// Write the crawl's `finish` marker if and only if it hasn't already
    /// been set. Returns `true` iff this call is the one that won the
    /// race — the caller should only run consolidation exports and fire
    /// the completion webhook when this is `true` (invariant #3: `finish`
    /// is set exactly once and never cleared).
    pub async fn try_finish(&self, crawl_id: &str) -> Result<bool, StoreError> {
        let won = self.store.setnx_ex(&finish_key(crawl_id), "1", CRAWL_STATE_TTL).await?;
        if won {
            self.store
                .set_ex(&completed_at_key(crawl_id), &now_ms().to_string(), CRAWL_STATE_TTL)
                .await?;
        }
        Ok(won)
    }

    pub async fn is_finish_marked(&self, crawl_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&finish_key(crawl_id)).await?.is_some())
    }

    pub async fn cancel(&self, crawl_id: &str) -> Result<(), StoreError> {
        self.store
            .set_ex(&cancelled_key(crawl_id), "1", CRAWL_STATE_TTL)
            .await?;
        if let Some(mut record) = self.get_crawl(crawl_id).await? {
            record.cancelled = true;
            self.save_crawl(&record).await?;
        }
        Ok(())
    }

    pub async fn is_cancelled(&self, crawl_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&cancelled_key(crawl_id)).await?.is_some())
    }

    /// Record an exported file path against the crawl (spec §6 exporter
    /// collaborator writes one file per page plus a summary).
    pub async fn add_exported_file(&self, crawl_id: &str, path: &str) -> Result<(), StoreError> {
        let key = files_key(crawl_id);
        self.store.rpush(&key, path).await?;
        self.store.expire(&key, CRAWL_STATE_TTL).await
    }

    pub async fn get_exported_files(&self, crawl_id: &str) -> Result<Vec<String>, StoreError> {
        self.store.lrange(&files_key(crawl_id), 0, -1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: &str) -> CrawlRecord {
        CrawlRecord {
            id: id.to_string(),
            origin_url: "https://example.com".to_string(),
            options: crate::models::CrawlOptions::default(),
            scrape_options: crate::models::ScraperOptions::default(),
            created_at_ms: 0,
            robots_txt: None,
            cancelled: false,
            extraction: None,
        }
    }

    // Key-naming tests only — exercising real Redis behavior requires a
    // live server and is covered by the crate's integration tests.
    #[test]
    fn key_namespacing_is_stable() {
        assert_eq!(crawl_key("abc"), "crawl:abc");
        assert_eq!(jobs_key("abc"), "crawl:abc:jobs");
        assert_eq!(locks_key("abc"), "crawl:abc:locked_urls");
        assert_eq!(done_success_key("abc"), "crawl:abc:done:success");
        assert_eq!(done_failed_key("abc"), "crawl:abc:done:failed");
        assert_eq!(finish_key("abc"), "crawl:abc:finish");
        assert_eq!(completed_at_key("abc"), "crawl:abc:completed_at");
        assert_eq!(cancelled_key("abc"), "crawl:abc:cancelled");
        assert_eq!(files_key("abc"), "crawl:abc:files");
    }

    #[test]
    fn sample_record_round_trips_through_json() {
        let record = sample_record("c1");
        let json = serde_json::to_string(&record).unwrap();
        let back: CrawlRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "c1");
    }
}
