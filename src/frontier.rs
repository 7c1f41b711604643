//! Frontier of papers awaiting expansion.
//!
//! A plain ordered sequence, re-sorted explicitly after every mutation.
//! Per-step frontier sizes stay small relative to run budgets, so a full
//! stable sort wins over maintaining a heap.

use std::collections::{HashMap, HashSet};

use crate::models::Paper;

/// Ordered worklist of paper ids.
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    ids: Vec<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Append an id at the back (lowest priority until the next re-rank).
    pub fn push(&mut self, id: String) {
        self.ids.push(id);
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, ids: I) {
        self.ids.extend(ids);
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Re-rank by relevance, best first.
    ///
    /// Ids missing from `papers` are pruned first: they should never
    /// occur, but dropping them here keeps the frontier ⊆ papers
    /// invariant self-healing instead of a silent correctness bug. The
    /// sort is stable, so equal scores keep their insertion order.
    pub fn rerank(&mut self, papers: &HashMap<String, Paper>) {
        let before = self.ids.len();
        self.ids.retain(|id| papers.contains_key(id));
        if self.ids.len() < before {
            tracing::debug!(
                dropped = before - self.ids.len(),
                "Pruned stale ids from frontier"
            );
        }

        self.ids.sort_by(|a, b| {
            let score_a = papers[a].relevance_score;
            let score_b = papers[b].relevance_score;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// First id not yet visited, in ranked order. `None` means the
    /// frontier is exhausted — a termination signal, not an error.
    pub fn next_unvisited(&self, visited: &HashSet<String>) -> Option<&str> {
        self.ids
            .iter()
            .find(|id| !visited.contains(*id))
            .map(String::as_str)
    }
}
