use crate::models::{SearchHit, TagMatch};
use crate::services::repository::{MetadataRepository, PersistenceError};
use crate::services::tag_processor::normalize_label;
use std::collections::HashMap;
use std::sync::Arc;

/// Normalizes query labels the same way stored tags were normalized, dropping duplicates.
pub fn normalize_query(labels: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for label in labels {
        if let Some(normalized) = normalize_label(label) {
            if !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
    }
    seen
}

const SCORE_SCALE: f64 = 1_000_000.0;

/// Relevance of one candidate: for each query term the best eligible confidence among the
/// matching tags, summed and divided by the number of query terms, capped at 1.0 and rounded
/// to six decimals so stored `f32` confidences don't leak widening noise into responses.
pub fn relevance(candidate: &TagMatch, query_len: usize) -> f64 {
    if query_len == 0 {
        return 0.0;
    }

    let mut best: HashMap<&str, f32> = HashMap::new();
    for tag in &candidate.matching_tags {
        let entry = best.entry(tag.label.as_str()).or_insert(0.0);
        if tag.confidence > *entry {
            *entry = tag.confidence;
        }
    }

    let sum: f64 = best.values().map(|c| *c as f64).sum();
    let score = (sum / query_len as f64).min(1.0);
    (score * SCORE_SCALE).round() / SCORE_SCALE
}

/// Orders candidates by relevance descending, then most recent `processed_at`, then id.
pub fn rank(candidates: Vec<TagMatch>, query_len: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|candidate| SearchHit {
            relevance_score: relevance(&candidate, query_len),
            file_id: candidate.file_id,
            matching_tags: candidate.matching_tags,
            processed_at: candidate.processed_at,
        })
        .collect();

    hits.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| b.processed_at.cmp(&a.processed_at))
            .then_with(|| a.file_id.cmp(&b.file_id))
    });
    hits
}

/// Tag-based retrieval over the metadata repository.
pub struct SearchEngine {
    repository: Arc<dyn MetadataRepository>,
}

impl SearchEngine {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }

    pub async fn search(
        &self,
        query_tags: &[String],
        min_confidence: f32,
    ) -> Result<Vec<SearchHit>, PersistenceError> {
        let query = normalize_query(query_tags);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let min_confidence = if min_confidence.is_finite() {
            min_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let candidates = self.repository.list_by_tags(&query, min_confidence).await?;
        tracing::debug!(
            terms = query.len(),
            candidates = candidates.len(),
            "search: ranking candidates"
        );
        Ok(rank(candidates, query.len()))
    }
}
