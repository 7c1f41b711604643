//! Expansion engine: the state machine driving one exploration run.
//!
//! States: `SeedSearch → FilterRank → {Expand | Synthesize}`, with
//! `Expand → FilterRank` forming the loop and `Synthesize` terminal. The
//! transition out of `FilterRank` is a pure function of the run state, so
//! the decision point is testable in isolation from any I/O.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::time::Duration;

use crate::config::RunConfig;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::errors::{AppError, Result};
use crate::fetcher::ResilientFetcher;
use crate::models::{
    ExplorationReport, Paper, PaperRecord, RunState, StopReason, ABSTRACTLESS_RELEVANCE,
};
use crate::synthesis::{Synthesizer, FAILED_SUMMARY};

/// Cap on reference ids requested per expansion step, bounding the
/// branching factor and upstream quota spend.
const MAX_REFS_PER_EXPANSION: usize = 5;

/// Engine states. `Synthesize` is terminal and carries the reason the
/// run stopped expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    SeedSearch,
    FilterRank,
    Expand,
    Synthesize(StopReason),
}

/// Per-run budgets, overridable per invocation.
#[derive(Debug, Clone)]
pub struct RunLimits {
    pub max_depth: u32,
    pub max_duration: Duration,
    pub search_result_limit: usize,
}

impl From<&RunConfig> for RunLimits {
    fn from(config: &RunConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_duration: config.max_duration(),
            search_result_limit: config.search_result_limit,
        }
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

/// The transition out of `FilterRank`.
///
/// Checked in strict order: the timeout comes first so a slow final
/// expansion cannot be masked by the depth or frontier checks.
pub fn decide(state: &RunState, limits: &RunLimits) -> EngineState {
    if state.timed_out() {
        return EngineState::Synthesize(StopReason::TimedOut);
    }
    if state.depth >= limits.max_depth {
        return EngineState::Synthesize(StopReason::DepthExhausted);
    }
    if state.frontier.is_empty() {
        return EngineState::Synthesize(StopReason::FrontierEmpty);
    }
    EngineState::Expand
}

/// Orchestrator owning a run's mutable state from seed search through
/// synthesis. Ports are injected and shared by reference across runs.
pub struct ExpansionEngine {
    fetcher: ResilientFetcher,
    embedder: Arc<dyn Embedder>,
    synthesizer: Arc<dyn Synthesizer>,
    limits: RunLimits,
}

impl ExpansionEngine {
    pub fn new(
        fetcher: ResilientFetcher,
        embedder: Arc<dyn Embedder>,
        synthesizer: Arc<dyn Synthesizer>,
        limits: RunLimits,
    ) -> Self {
        Self {
            fetcher,
            embedder,
            synthesizer,
            limits,
        }
    }

    /// Run one exploration with the engine's default limits.
    pub async fn run(&self, query: &str) -> Result<ExplorationReport> {
        self.run_with_limits(query, self.limits.clone()).await
    }

    /// Run one exploration with per-invocation limits.
    pub async fn run_with_limits(
        &self,
        query: &str,
        limits: RunLimits,
    ) -> Result<ExplorationReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "query must not be empty".into(),
            });
        }

        let mut state = self.seed_search(query, &limits).await?;
        let mut machine = EngineState::SeedSearch;

        loop {
            machine = match machine {
                // Seed search has run; the only edge out is into ranking
                EngineState::SeedSearch => EngineState::FilterRank,
                EngineState::FilterRank => {
                    Self::filter_rank(&mut state);
                    decide(&state, &limits)
                }
                EngineState::Expand => {
                    self.expand(&mut state).await;
                    EngineState::FilterRank
                }
                EngineState::Synthesize(reason) => {
                    return Ok(self.synthesize(state, reason).await);
                }
            };
        }
    }

    /// SeedSearch: embed the query, fetch seeds, score them, and build
    /// the initial run state.
    async fn seed_search(&self, query: &str, limits: &RunLimits) -> Result<RunState> {
        tracing::info!(query_len = query.len(), "Searching for seed papers");

        let query_vector = self.embedder.embed(query).await.map_err(|e| {
            tracing::error!(error = %e, "Query embedding failed");
            AppError::EmptyQueryEmbedding
        })?;
        // A broken embedding backend would silently zero every downstream
        // relevance score; abort instead.
        if query_vector.is_empty() {
            return Err(AppError::EmptyQueryEmbedding);
        }

        let records = self
            .fetcher
            .search(query, limits.search_result_limit)
            .await?;

        let mut state = RunState::new(query, query_vector, limits.max_duration);
        for record in records {
            if record.paper_id.is_empty() || state.papers.contains_key(&record.paper_id) {
                continue;
            }
            let paper = self.score_record(&record, &state.query_vector).await;
            state.frontier.push(paper.id.clone());
            state.papers.insert(paper.id.clone(), paper);
        }

        tracing::info!(seeds = state.papers.len(), "Seed search complete");
        Ok(state)
    }

    /// FilterRank: prune + stable re-sort of the frontier. A pure
    /// function of the current papers/frontier; no fetching.
    fn filter_rank(state: &mut RunState) {
        state.frontier.rerank(&state.papers);
    }

    /// Expand: pop the best unvisited id, fetch its references, score and
    /// merge the newly discovered papers. Fetch failures degrade — the
    /// step still consumes a hop, it just discovers nothing.
    async fn expand(&self, state: &mut RunState) {
        let Some(current_id) = state
            .frontier
            .next_unvisited(&state.visited)
            .map(str::to_owned)
        else {
            // Everything ranked is already visited; degenerate to the
            // FilterRank → Synthesize path on the next evaluation.
            state.frontier.clear();
            return;
        };

        state.visited.insert(current_id.clone());
        state.depth += 1;
        metrics::counter!("citescout_expansions_total").increment(1);

        let Some(details) = self.fetcher.details(&current_id).await else {
            tracing::warn!(paper_id = %current_id, "No details available, nothing discovered");
            return;
        };

        // Attach the link data the search result did not carry
        if let Some(paper) = state.papers.get_mut(&current_id) {
            paper.reference_ids = details.reference_ids();
            paper.citation_ids = details.citation_ids();
        }

        let ref_ids: Vec<String> = details
            .reference_ids()
            .into_iter()
            .take(MAX_REFS_PER_EXPANSION)
            .collect();
        if ref_ids.is_empty() {
            tracing::debug!(paper_id = %current_id, "Paper has no references");
            return;
        }

        let records = self.fetcher.batch_details(&ref_ids).await;
        let mut discovered = 0usize;
        for record in records {
            // A paper reachable over several citation paths is scored and
            // stored once, from whichever path found it first
            if record.paper_id.is_empty() || state.papers.contains_key(&record.paper_id) {
                continue;
            }
            let paper = self.score_record(&record, &state.query_vector).await;
            state.frontier.push(paper.id.clone());
            state.papers.insert(paper.id.clone(), paper);
            discovered += 1;
        }

        tracing::info!(
            paper_id = %current_id,
            discovered,
            depth = state.depth,
            frontier = state.frontier.len(),
            "Expanded paper"
        );
    }

    /// Score a record against the query vector. Abstract-less papers get
    /// the fixed low default; cosine output is clamped into [0, 1].
    async fn score_record(&self, record: &PaperRecord, query_vector: &[f32]) -> Paper {
        if !record.has_abstract() {
            return Paper::from_record(record, None, ABSTRACTLESS_RELEVANCE);
        }

        let abstract_text = record.abstract_text.as_deref().unwrap_or_default();
        match self.embedder.embed(abstract_text).await {
            Ok(vector) => {
                let score = cosine_similarity(query_vector, &vector).clamp(0.0, 1.0);
                let embedding = (!vector.is_empty()).then_some(vector);
                Paper::from_record(record, embedding, score)
            }
            Err(e) => {
                tracing::warn!(paper_id = %record.paper_id, error = %e, "Failed to embed abstract");
                Paper::from_record(record, None, 0.0)
            }
        }
    }

    /// Synthesize (terminal): rank everything, summarize the top of the
    /// ranking. Best-effort — a port failure degrades to a placeholder.
    async fn synthesize(&self, mut state: RunState, reason: StopReason) -> ExplorationReport {
        tracing::info!(
            reason = ?reason,
            papers = state.papers.len(),
            depth = state.depth,
            "Synthesizing findings"
        );

        let mut papers: Vec<Paper> = state.papers.values().cloned().collect();
        papers.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });

        let summary = match self.synthesizer.summarize(&papers, &state.query).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Synthesis failed, storing placeholder summary");
                FAILED_SUMMARY.to_string()
            }
        };
        state.summary = Some(summary.clone());

        ExplorationReport {
            query: state.query.clone(),
            papers,
            summary,
            depth: state.depth,
            visited: state.visited.len(),
            stop_reason: reason,
            elapsed_ms: state.started_at.elapsed().as_millis() as u64,
        }
    }
}
