//! Second-stage relevance scoring over retrieved candidates.
//!
//! A [`RelevanceScorer`] assigns scores to `(query, candidate)` pairs in one
//! batched call. The [`Reranker`] filters by threshold, sorts descending and
//! truncates to `top_k`, in that order.

mod cross_encoder;
mod llm_judge;

pub use cross_encoder::CrossEncoder;
pub use llm_judge::{LlmJudge, parse_judgement};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::SearchError;
use crate::models::{RerankConfig, RetrievedChunk, ScorerKind};

/// Score for the candidate at `index` in submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredIndex {
    pub index: i64,
    pub score: f32,
}

impl ScoredIndex {
    pub fn new(index: usize, score: f32) -> Self {
        Self {
            index: index as i64,
            score,
        }
    }
}

/// The scoring oracle. Scales differ per implementation (0-1 for a
/// cross-encoder, 0-5 for the LLM judge); thresholds must match.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score `texts` against `query`. Implementations may omit candidates
    /// but must not invent indices.
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<ScoredIndex>, SearchError>;

    fn name(&self) -> &'static str;
}

/// Validate oracle output and rank it: keep scores `>= threshold`, sort
/// descending (ties keep submitted order), truncate to `top_k`.
///
/// An index outside `0..n`, a repeated index or a non-finite score rejects
/// the whole response.
pub fn rank_scores(
    scores: Vec<ScoredIndex>,
    n: usize,
    threshold: f32,
    top_k: usize,
) -> Result<Vec<(usize, f32)>, SearchError> {
    let mut seen = HashSet::with_capacity(scores.len());
    for s in &scores {
        if s.index < 0 || s.index as u64 >= n as u64 {
            return Err(SearchError::Upstream(format!(
                "scorer returned index {} for {n} candidates",
                s.index
            )));
        }
        if !seen.insert(s.index) {
            return Err(SearchError::Upstream(format!(
                "scorer returned index {} twice",
                s.index
            )));
        }
        if !s.score.is_finite() {
            return Err(SearchError::Upstream(format!(
                "scorer returned non-finite score for index {}",
                s.index
            )));
        }
    }

    let mut kept: Vec<(usize, f32)> = scores
        .into_iter()
        .filter(|s| s.score >= threshold)
        .map(|s| (s.index as usize, s.score))
        .collect();

    // submitted order first, so the stable sort breaks ties by it
    kept.sort_by_key(|(index, _)| *index);
    kept.sort_by(|a, b| b.1.total_cmp(&a.1));
    kept.truncate(top_k);
    Ok(kept)
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Rerank `candidates`, setting `relevance` on the survivors.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedChunk>,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = self.scorer.score(query, &texts).await?;
        let ranked = rank_scores(scores, candidates.len(), threshold, top_k).inspect_err(|e| {
            tracing::warn!(scorer = self.scorer.name(), error = %e, "rejected scorer response");
        })?;

        let mut slots: Vec<Option<RetrievedChunk>> = candidates.into_iter().map(Some).collect();
        let results: Vec<RetrievedChunk> = ranked
            .into_iter()
            .filter_map(|(index, score)| {
                slots[index].take().map(|mut chunk| {
                    chunk.relevance = Some(score);
                    chunk
                })
            })
            .collect();

        tracing::debug!(
            scorer = self.scorer.name(),
            threshold,
            top_k,
            kept = results.len(),
            "reranked candidates"
        );
        Ok(results)
    }
}

/// Build the scorer selected by `rerank.scorer`.
pub fn create_scorer(config: &RerankConfig) -> Result<Arc<dyn RelevanceScorer>, crate::error::AppError> {
    Ok(match config.scorer {
        ScorerKind::Llm => Arc::new(LlmJudge::new(&config.llm)?),
        ScorerKind::CrossEncoder => Arc::new(CrossEncoder::from_config(&config.cross_encoder)?),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Returns canned scores regardless of input.
    pub struct FixedScorer(pub Result<Vec<ScoredIndex>, String>);

    impl FixedScorer {
        pub fn scores(scores: &[f32]) -> Self {
            Self(Ok(scores
                .iter()
                .enumerate()
                .map(|(i, s)| ScoredIndex::new(i, *s))
                .collect()))
        }
    }

    #[async_trait]
    impl RelevanceScorer for FixedScorer {
        async fn score(&self, _query: &str, _texts: &[String]) -> Result<Vec<ScoredIndex>, SearchError> {
            self.0.clone().map_err(SearchError::Upstream)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }
}
