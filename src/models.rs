//! Core data model: wire records, domain papers, and per-run state.
//!
//! `PaperRecord` is the upstream/cache representation (camelCase JSON);
//! `Paper` is the scored domain record; `RunState` is the mutable state a
//! single exploration run owns from seed search to synthesis.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::frontier::Frontier;

/// Relevance assigned to papers whose abstract is empty: low enough to
/// never be preferred, non-zero so they stay visible in rankings.
pub const ABSTRACTLESS_RELEVANCE: f32 = 0.1;

/// Author entry as returned by the upstream graph API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorRecord {
    #[serde(default)]
    pub name: String,
}

/// Reference/citation stub: the upstream nests linked papers as objects
/// carrying a nullable paper id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedPaperRecord {
    #[serde(rename = "paperId", default)]
    pub paper_id: Option<String>,
}

/// Wire and cache representation of one paper.
///
/// `references`/`citations` are only populated by a details fetch; search
/// results carry the flat metadata fields alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRecord {
    pub paper_id: String,

    #[serde(default)]
    pub title: String,

    /// Nullable upstream; an empty abstract is a valid, lower-confidence
    /// state rather than an error.
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub citation_count: u32,

    #[serde(default)]
    pub authors: Vec<AuthorRecord>,

    #[serde(default)]
    pub references: Vec<LinkedPaperRecord>,

    #[serde(default)]
    pub citations: Vec<LinkedPaperRecord>,
}

impl PaperRecord {
    /// A record is complete only when its abstract is present and
    /// non-empty; incomplete records are eligible for re-fetching.
    pub fn has_abstract(&self) -> bool {
        self.abstract_text
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }

    /// Reference paper ids, dropping entries with no id.
    pub fn reference_ids(&self) -> Vec<String> {
        self.references
            .iter()
            .filter_map(|r| r.paper_id.clone())
            .collect()
    }

    /// Citing paper ids, dropping entries with no id.
    pub fn citation_ids(&self) -> Vec<String> {
        self.citations
            .iter()
            .filter_map(|c| c.paper_id.clone())
            .collect()
    }
}

/// A scored paper in the exploration graph.
///
/// Never mutated after insertion into a run, except to attach reference/
/// citation links after a details fetch and the reserved `summary` note.
#[derive(Debug, Clone, Serialize)]
pub struct Paper {
    /// Upstream-assigned id, stable across the run and cache refreshes.
    pub id: String,

    pub title: String,

    /// Empty when the upstream has no abstract for this paper.
    pub abstract_text: String,

    pub authors: Vec<String>,

    pub year: Option<i32>,

    pub citation_count: u32,

    pub url: String,

    /// Absent when the abstract is empty.
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,

    /// Cosine similarity against the query, clamped into [0, 1];
    /// exactly `ABSTRACTLESS_RELEVANCE` for abstract-less papers.
    pub relevance_score: f32,

    /// Populated only after a details fetch.
    pub reference_ids: Vec<String>,

    /// Populated only after a details fetch.
    pub citation_ids: Vec<String>,

    /// Reserved for late-attached per-paper notes; unused by core logic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Paper {
    /// Build a domain paper from a wire record plus its score.
    pub fn from_record(record: &PaperRecord, embedding: Option<Vec<f32>>, relevance_score: f32) -> Self {
        Self {
            id: record.paper_id.clone(),
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone().unwrap_or_default(),
            authors: record.authors.iter().map(|a| a.name.clone()).collect(),
            year: record.year,
            citation_count: record.citation_count,
            url: record.url.clone().unwrap_or_default(),
            embedding,
            relevance_score,
            reference_ids: record.reference_ids(),
            citation_ids: record.citation_ids(),
            summary: None,
        }
    }
}

/// Why a run stopped expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Wall-clock budget elapsed.
    TimedOut,
    /// Hop budget exhausted.
    DepthExhausted,
    /// Nothing left to explore.
    FrontierEmpty,
}

/// Mutable state of one exploration run, exclusively owned by the engine
/// for the run's lifetime and discarded after synthesis.
#[derive(Debug)]
pub struct RunState {
    /// Immutable once set.
    pub query: String,

    /// Computed once at seed search.
    pub query_vector: Vec<f32>,

    /// All discovered papers keyed by id. Grows monotonically; entries
    /// are never removed for the run.
    pub papers: HashMap<String, Paper>,

    /// Ids awaiting expansion, re-ranked after every mutation.
    pub frontier: Frontier,

    /// Ids whose references have been fetched. An id enters exactly once
    /// and never leaves.
    pub visited: HashSet<String>,

    /// Hop count from the seeds; +1 per expansion step that pops a paper.
    pub depth: u32,

    pub started_at: Instant,

    pub max_duration: Duration,

    /// Populated exactly once, at the terminal step.
    pub summary: Option<String>,
}

impl RunState {
    pub fn new(query: &str, query_vector: Vec<f32>, max_duration: Duration) -> Self {
        Self {
            query: query.to_string(),
            query_vector,
            papers: HashMap::new(),
            frontier: Frontier::new(),
            visited: HashSet::new(),
            depth: 0,
            started_at: Instant::now(),
            max_duration,
            summary: None,
        }
    }

    /// Wall-clock budget check, evaluated once per decision cycle.
    pub fn timed_out(&self) -> bool {
        self.started_at.elapsed() > self.max_duration
    }

    /// Structural invariants: frontier and visited ids always resolve in
    /// `papers`, and every score stays within [0, 1].
    pub fn invariants_hold(&self) -> bool {
        self.frontier
            .ids()
            .iter()
            .all(|id| self.papers.contains_key(id))
            && self.visited.iter().all(|id| self.papers.contains_key(id))
            && self
                .papers
                .values()
                .all(|p| (0.0..=1.0).contains(&p.relevance_score))
    }
}

/// Final output of a run: the ranked paper set plus the synthesis.
#[derive(Debug, Serialize)]
pub struct ExplorationReport {
    pub query: String,

    /// All discovered papers, relevance descending.
    pub papers: Vec<Paper>,

    pub summary: String,

    pub depth: u32,

    pub visited: usize,

    pub stop_reason: StopReason,

    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, abstract_text: Option<&str>) -> PaperRecord {
        PaperRecord {
            paper_id: id.to_string(),
            title: format!("Paper {}", id),
            abstract_text: abstract_text.map(str::to_string),
            ..PaperRecord::default()
        }
    }

    #[test]
    fn test_wire_record_deserialization() {
        let json = r#"{
            "paperId": "649def34",
            "title": "Attention Is All You Need",
            "abstract": null,
            "url": "https://example.org/paper/649def34",
            "year": 2017,
            "citationCount": 90000,
            "authors": [{"name": "A. Vaswani"}],
            "references": [{"paperId": "abc"}, {"paperId": null}]
        }"#;

        let record: PaperRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.paper_id, "649def34");
        assert!(!record.has_abstract());
        assert_eq!(record.citation_count, 90000);
        assert_eq!(record.authors[0].name, "A. Vaswani");
        // Entries with a null id are dropped
        assert_eq!(record.reference_ids(), vec!["abc".to_string()]);
        assert!(record.citation_ids().is_empty());
    }

    #[test]
    fn test_has_abstract_rejects_whitespace() {
        assert!(!record("a", Some("   ")).has_abstract());
        assert!(!record("a", None).has_abstract());
        assert!(record("a", Some("Real text")).has_abstract());
    }

    #[test]
    fn test_paper_from_record_defaults() {
        let paper = Paper::from_record(&record("a", None), None, ABSTRACTLESS_RELEVANCE);
        assert_eq!(paper.id, "a");
        assert_eq!(paper.abstract_text, "");
        assert_eq!(paper.relevance_score, ABSTRACTLESS_RELEVANCE);
        assert!(paper.embedding.is_none());
        assert!(paper.summary.is_none());
    }

    #[test]
    fn test_invariants_hold() {
        let mut state = RunState::new("q", vec![1.0], Duration::from_secs(60));
        let paper = Paper::from_record(&record("a", Some("text")), None, 0.5);
        state.papers.insert("a".into(), paper);
        state.frontier.push("a".into());
        assert!(state.invariants_hold());

        // A frontier id missing from papers breaks the invariant
        state.frontier.push("ghost".into());
        assert!(!state.invariants_hold());
    }

    #[tokio::test]
    async fn test_timed_out_zero_budget() {
        let state = RunState::new("q", vec![1.0], Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(state.timed_out());
    }
}
