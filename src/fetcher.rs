//! Resilient fetch layer over the upstream paper-graph API.
//!
//! Provides:
//! - `PaperApi`: the raw upstream transport trait
//! - `GraphApiClient`: reqwest implementation against a Semantic Scholar
//!   shaped graph API
//! - `ResilientFetcher`: cache-first lookup, fixed inter-request pacing,
//!   the shared retry policy, and per-paper degradation so one bad fetch
//!   never aborts a whole run

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::QuantaClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use crate::cache::PaperCache;
use crate::errors::{AppError, Result};
use crate::models::PaperRecord;
use crate::retry::{retry_with_policy, RetryPolicy};

/// Metadata fields requested from search results.
const SEARCH_FIELDS: &str = "paperId,title,abstract,url,year,citationCount,authors";

/// Detail fetches additionally pull the citation links.
const DETAIL_FIELDS: &str =
    "paperId,title,abstract,url,year,citationCount,authors,references.paperId,citations.paperId";

/// Raw upstream transport. HTTP 429 maps to the distinguished rate-limit
/// error; all other non-2xx/network failures are generic transient ones.
#[async_trait]
pub trait PaperApi: Send + Sync {
    /// Keyword search for papers.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>>;

    /// Full record for one paper, `None` if the id is unknown upstream.
    async fn details(&self, id: &str) -> Result<Option<PaperRecord>>;

    /// Full records for a set of ids in one call. Unresolvable ids are
    /// silently absent from the result.
    async fn batch_details(&self, ids: &[String]) -> Result<Vec<PaperRecord>>;
}

/// reqwest client for the upstream graph API.
pub struct GraphApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<PaperRecord>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    ids: &'a [String],
}

impl GraphApiClient {
    pub fn new(config: &crate::config::UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl PaperApi for GraphApiClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>> {
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("fields", SEARCH_FIELDS),
            ])
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body: SearchResponse = response.json().await?;
        Ok(body.data)
    }

    async fn details(&self, id: &str) -> Result<Option<PaperRecord>> {
        let url = format!("{}/paper/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .query(&[("fields", DETAIL_FIELDS)])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;

        Ok(Some(response.json().await?))
    }

    async fn batch_details(&self, ids: &[String]) -> Result<Vec<PaperRecord>> {
        let url = format!("{}/paper/batch", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("fields", DETAIL_FIELDS)])
            .json(&BatchRequest { ids })
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        // The upstream returns null entries for ids it cannot resolve.
        let records: Vec<Option<PaperRecord>> = response.json().await?;
        Ok(records.into_iter().flatten().collect())
    }
}

/// Shared pacing permit honored before every network call.
pub type PacingLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Cache-first, paced, retrying wrapper around a `PaperApi`.
pub struct ResilientFetcher {
    api: Arc<dyn PaperApi>,
    cache: PaperCache,
    policy: RetryPolicy,
    limiter: Option<PacingLimiter>,
}

impl ResilientFetcher {
    /// `pacing_interval` of zero disables pacing.
    pub fn new(
        api: Arc<dyn PaperApi>,
        cache: PaperCache,
        policy: RetryPolicy,
        pacing_interval: Duration,
    ) -> Self {
        let limiter = if pacing_interval.is_zero() {
            None
        } else {
            Quota::with_period(pacing_interval).map(|quota| RateLimiter::direct(quota))
        };

        Self {
            api,
            cache,
            policy,
            limiter,
        }
    }

    /// Pre-emptive inter-request delay, applied regardless of outcome.
    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn cache_put(&self, record: &PaperRecord) {
        if let Err(e) = self.cache.put(record).await {
            tracing::warn!(paper_id = %record.paper_id, error = %e, "Failed to cache record");
        }
    }

    /// Seed search. Retried per the shared policy; exhausting the budget
    /// is a hard error, since a run cannot start without seeds.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>> {
        tracing::info!(limit, "Searching upstream for papers");

        let records = retry_with_policy(&self.policy, "search", || async move {
            self.pace().await;
            self.api.search(query, limit).await
        })
        .await
        .map_err(|e| AppError::SeedSearchFailed {
            attempts: self.policy.max_attempts,
            message: e.to_string(),
        })?;

        metrics::counter!("citescout_search_ops_total").increment(1);
        for record in &records {
            self.cache_put(record).await;
        }

        Ok(records)
    }

    /// Details for one paper.
    ///
    /// A cached record is served immediately only when it carries an
    /// abstract and reference links; entries written by a search fetch
    /// have no link arrays yet, and abstract-less ones are incomplete, so
    /// both are re-fetched — upstream data improves over time. Never
    /// raises: persistent failure degrades to the stale cached value,
    /// then `None`.
    pub async fn details(&self, id: &str) -> Option<PaperRecord> {
        let cached = match self.cache.get(id).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(paper_id = %id, error = %e, "Cache read failed");
                None
            }
        };

        if let Some(record) = &cached {
            if record.has_abstract() && !record.references.is_empty() {
                metrics::counter!("citescout_cache_hits_total").increment(1);
                return cached;
            }
            tracing::debug!(paper_id = %id, "Cached record is incomplete, re-fetching");
        }

        let fetched = retry_with_policy(&self.policy, "details", || async move {
            self.pace().await;
            self.api.details(id).await
        })
        .await;

        match fetched {
            Ok(Some(record)) => {
                self.cache_put(&record).await;
                Some(record)
            }
            // Unknown upstream; keep whatever the cache had
            Ok(None) => cached,
            Err(e) => {
                tracing::warn!(paper_id = %id, error = %e, "Detail fetch failed, falling back to cache");
                cached
            }
        }
    }

    /// Details for a set of papers.
    ///
    /// Partitions into cache hits (abstract present) and one retried
    /// batch fetch for the remainder, falling back to per-id `details`
    /// calls if the batch cannot be completed. Never raises; returns
    /// whatever subset resolved.
    pub async fn batch_details(&self, ids: &[String]) -> Vec<PaperRecord> {
        let mut resolved = Vec::with_capacity(ids.len());
        let mut to_fetch: Vec<String> = Vec::new();

        for id in ids {
            match self.cache.get(id).await {
                Ok(Some(record)) if record.has_abstract() => {
                    metrics::counter!("citescout_cache_hits_total").increment(1);
                    resolved.push(record);
                }
                Ok(_) => to_fetch.push(id.clone()),
                Err(e) => {
                    tracing::warn!(paper_id = %id, error = %e, "Cache read failed");
                    to_fetch.push(id.clone());
                }
            }
        }

        if to_fetch.is_empty() {
            return resolved;
        }
        tracing::debug!(count = to_fetch.len(), "Fetching batch of papers");

        let batch = retry_with_policy(&self.policy, "batch_details", || {
            let ids = to_fetch.clone();
            async move {
                self.pace().await;
                self.api.batch_details(&ids).await
            }
        })
        .await;

        match batch {
            Ok(records) => {
                for record in records {
                    self.cache_put(&record).await;
                    resolved.push(record);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Batch fetch failed, falling back to sequential details");
                for id in &to_fetch {
                    if let Some(record) = self.details(id).await {
                        resolved.push(record);
                    }
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted upstream for fetcher and engine tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory `PaperApi` with scripted search outcomes, a record map
    /// for detail/batch lookups, and call journals for assertions.
    #[derive(Default)]
    pub struct ScriptedApi {
        pub search_queue: Mutex<VecDeque<Result<Vec<PaperRecord>>>>,
        pub records: Mutex<HashMap<String, PaperRecord>>,
        pub failing_details: Mutex<Vec<String>>,
        pub batch_fails: AtomicBool,
        pub search_calls: Mutex<u32>,
        pub details_calls: Mutex<Vec<String>>,
        pub batch_calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_search(&self, outcome: Result<Vec<PaperRecord>>) {
            self.search_queue.lock().unwrap().push_back(outcome);
        }

        pub fn insert_record(&self, record: PaperRecord) {
            self.records
                .lock()
                .unwrap()
                .insert(record.paper_id.clone(), record);
        }

        pub fn fail_details_for(&self, id: &str) {
            self.failing_details.lock().unwrap().push(id.to_string());
        }
    }

    #[async_trait]
    impl PaperApi for ScriptedApi {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<PaperRecord>> {
            *self.search_calls.lock().unwrap() += 1;
            self.search_queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn details(&self, id: &str) -> Result<Option<PaperRecord>> {
            self.details_calls.lock().unwrap().push(id.to_string());
            if self.failing_details.lock().unwrap().iter().any(|f| f == id) {
                return Err(AppError::Upstream {
                    status: 503,
                    message: "scripted failure".into(),
                });
            }
            Ok(self.records.lock().unwrap().get(id).cloned())
        }

        async fn batch_details(&self, ids: &[String]) -> Result<Vec<PaperRecord>> {
            self.batch_calls.lock().unwrap().push(ids.to_vec());
            if self.batch_fails.load(Ordering::SeqCst) {
                return Err(AppError::Upstream {
                    status: 500,
                    message: "scripted batch failure".into(),
                });
            }
            let records = self.records.lock().unwrap();
            Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
        }
    }
}
