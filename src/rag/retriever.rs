//! Retrieval over the vector index: plain similarity or MMR re-ranking.

use serde::{Deserialize, Serialize};

use super::index::{cosine_similarity, IndexEntry, Result, VectorIndex};
use super::models::RetrievedChunk;

/// How candidates are chosen from the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchMode {
    /// Top-k by cosine similarity.
    #[default]
    Similarity,
    /// Maximal Marginal Relevance over the `fetch_k` most similar chunks.
    /// `lambda` = 1.0 is pure relevance, 0.0 is pure diversity.
    Mmr { fetch_k: usize, lambda: f32 },
}

#[derive(Debug, Clone)]
pub struct Retriever {
    k: usize,
    mode: SearchMode,
}

impl Retriever {
    pub fn new(k: usize, mode: SearchMode) -> Self {
        Self { k, mode }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn retrieve(&self, index: &VectorIndex, query_embedding: &[f32]) -> Result<Vec<RetrievedChunk>> {
        match self.mode {
            SearchMode::Similarity => index.similarity_search(query_embedding, self.k),
            SearchMode::Mmr { fetch_k, lambda } => {
                let candidates: Vec<(f32, IndexEntry)> = index
                    .scored_entries(query_embedding)?
                    .into_iter()
                    .take(fetch_k.max(self.k))
                    .collect();
                Ok(mmr_select(candidates, self.k, lambda))
            }
        }
    }
}

/// Greedy MMR selection.
///
/// Candidates must be sorted by relevance, best first. Each step picks the
/// candidate maximizing `lambda * relevance - (1 - lambda) * redundancy`,
/// where redundancy is the highest similarity to anything already picked.
/// Ties go to the more relevant candidate.
fn mmr_select(candidates: Vec<(f32, IndexEntry)>, k: usize, lambda: f32) -> Vec<RetrievedChunk> {
    let mut remaining: Vec<Option<(f32, IndexEntry)>> = candidates.into_iter().map(Some).collect();
    let mut selected: Vec<(f32, IndexEntry)> = Vec::new();

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;

        for (i, candidate) in remaining.iter().enumerate() {
            let Some((relevance, entry)) = candidate else {
                continue;
            };
            let redundancy = selected
                .iter()
                .map(|(_, chosen)| cosine_similarity(&entry.embedding, &chosen.embedding))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevance - (1.0 - lambda) * redundancy;

            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((i, score));
            }
        }

        let Some((i, _)) = best else {
            break;
        };
        if let Some(picked) = remaining[i].take() {
            selected.push(picked);
        }
    }

    selected
        .into_iter()
        .map(|(score, entry)| entry.into_retrieved(score))
        .collect()
}
