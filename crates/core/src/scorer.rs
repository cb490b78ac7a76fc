use crate::{Reference, RetrievalHit, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

const HIGH_QUALITY_DISTANCE: f64 = 0.5;
const MULTI_MATCH_BONUS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub similarity_threshold: f64,
    pub max_results: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.2,
            max_results: 5,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SearchError::InvalidConfig(format!(
                "similarity_threshold {} is outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.max_results == 0 {
            return Err(SearchError::InvalidConfig(
                "max_results must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hits that passed the similarity threshold, in input order, with the
/// confidence of the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRetrieval {
    pub hits: Vec<RetrievalHit>,
    pub confidence: f64,
}

impl ScoredRetrieval {
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.text.clone()).collect()
    }

    /// One reference per source document, first-seen order, capped at
    /// `max_results`. The hit set itself is left untouched.
    pub fn references(&self, max_results: usize) -> Vec<Reference> {
        let mut seen = HashSet::new();
        self.hits
            .iter()
            .filter(|hit| !hit.metadata.source_doc_id.is_empty())
            .filter(|hit| seen.insert(hit.metadata.source_doc_id.as_str()))
            .take(max_results)
            .map(|hit| Reference {
                source_doc_id: hit.metadata.source_doc_id.clone(),
                title: format!("文档 {}", hit.metadata.source_doc_id),
                department: hit.metadata.department.clone(),
                category: hit.metadata.category.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalScorer {
    config: ScorerConfig,
}

impl RetrievalScorer {
    pub fn new(config: ScorerConfig) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ScorerConfig {
        self.config
    }

    /// `hits` are expected in ascending distance order.
    pub fn score(&self, hits: Vec<RetrievalHit>) -> ScoredRetrieval {
        let total = hits.len();
        let threshold = self.config.similarity_threshold;
        let kept: Vec<RetrievalHit> = hits
            .into_iter()
            .filter(|hit| hit.similarity() >= threshold)
            .collect();

        if kept.is_empty() {
            debug!(total, threshold, "no hit passed the similarity threshold");
            return ScoredRetrieval::empty();
        }

        let distances: Vec<f64> = kept.iter().map(|hit| hit.distance).collect();
        let confidence = confidence(&distances);
        debug!(total, kept = kept.len(), confidence, "hits scored");

        ScoredRetrieval {
            hits: kept,
            confidence,
        }
    }

    pub fn references(&self, scored: &ScoredRetrieval) -> Vec<Reference> {
        scored.references(self.config.max_results)
    }
}

/// Confidence in [0, 1] from the closest distance, with a flat bonus when at
/// least two hits are high quality. Rounded to two decimals.
///
/// The base is `1 - distance / 2`, not the `1 - distance` used for
/// filtering. Both values are observable and must stay as they are.
pub fn confidence(distances: &[f64]) -> f64 {
    let Some(min_distance) = distances.iter().copied().reduce(f64::min) else {
        return 0.0;
    };

    let mut value = (1.0 - min_distance / 2.0).clamp(0.0, 1.0);
    let high_quality = distances
        .iter()
        .filter(|distance| **distance < HIGH_QUALITY_DISTANCE)
        .count();
    if high_quality >= 2 {
        value = (value + MULTI_MATCH_BONUS).min(1.0);
    }

    round_to(value, 2)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
