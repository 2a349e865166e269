//! Multi-factor ranking
//!
//! Combines weighted factor scores into one normalized score per item,
//! with optional per-factor explanation. All sorts are stable so equal
//! scores keep their input order.

pub mod factors;

use crate::cancel::{is_cancelled, CancellationToken};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Factor weights, each in [0,1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankWeights {
    #[serde(default = "default_tf_idf_weight")]
    pub tf_idf: f64,
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy: f64,
    #[serde(default = "default_proximity_weight")]
    pub proximity: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic: f64,
    #[serde(default = "default_ast_weight")]
    pub ast: f64,
    #[serde(default)]
    pub file_importance: f64,
    #[serde(default)]
    pub recency: f64,
    #[serde(default)]
    pub definition_proximity: f64,
}

fn default_tf_idf_weight() -> f64 {
    0.3
}
fn default_fuzzy_weight() -> f64 {
    0.2
}
fn default_proximity_weight() -> f64 {
    0.15
}
fn default_semantic_weight() -> f64 {
    0.25
}
fn default_ast_weight() -> f64 {
    0.1
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            tf_idf: default_tf_idf_weight(),
            fuzzy: default_fuzzy_weight(),
            proximity: default_proximity_weight(),
            semantic: default_semantic_weight(),
            ast: default_ast_weight(),
            file_importance: 0.0,
            recency: 0.0,
            definition_proximity: 0.0,
        }
    }
}

/// Score normalization across the ranked set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationStrategy {
    #[default]
    MinMax,
    Softmax,
    None,
}

/// One item offered to the ranker
#[derive(Debug, Clone, Default)]
pub struct RankCandidate {
    pub id: String,
    pub text: String,
    /// Normalized sparse score from the TF-IDF index, when available
    pub sparse_score: Option<f64>,
    /// Built-in positional relevance (gatherer snippet relevance or a
    /// node-kind table score)
    pub proximity: Option<f64>,
    /// Precomputed semantic similarity, when the caller already ran the
    /// vector search
    pub semantic: Option<f64>,
    pub embedding: Option<Vec<f32>>,
    pub node_kind: Option<String>,
    pub node_name: Option<String>,
    pub file_path: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// A ranked item with its factor breakdown
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub candidate: RankCandidate,
    pub score: f64,
    pub factors: Vec<(&'static str, f64)>,
    pub explanation: Option<String>,
}

/// Configurable multi-factor ranker
pub struct Ranker {
    weights: RankWeights,
    normalization: NormalizationStrategy,
    min_score: f64,
    explain: bool,
    file_patterns: Vec<(Regex, f64)>,
    usage_counts: HashMap<String, usize>,
}

impl Ranker {
    pub fn new(weights: RankWeights) -> Self {
        Self {
            weights,
            normalization: NormalizationStrategy::MinMax,
            min_score: 0.0,
            explain: false,
            file_patterns: Vec::new(),
            usage_counts: HashMap::new(),
        }
    }

    pub fn with_normalization(mut self, strategy: NormalizationStrategy) -> Self {
        self.normalization = strategy;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_explanations(mut self) -> Self {
        self.explain = true;
        self
    }

    /// Register a path pattern for the file-importance factor.
    pub fn add_file_pattern(&mut self, pattern: Regex, weight: f64) {
        self.file_patterns.push((pattern, weight));
    }

    /// Replace the symbol-usage table behind the definition-proximity
    /// factor.
    pub fn set_usage_counts(&mut self, counts: HashMap<String, usize>) {
        self.usage_counts = counts;
    }

    /// Rank candidates against a query.
    ///
    /// Evaluates every factor, combines with normalized weights,
    /// normalizes per strategy, drops items below the minimum score, and
    /// sorts descending (stable). Cancellation returns `[]`.
    pub fn rank(
        &self,
        candidates: Vec<RankCandidate>,
        query: &str,
        query_embedding: Option<&[f32]>,
        token: Option<&CancellationToken>,
    ) -> Vec<RankedItem> {
        if is_cancelled(token) {
            return Vec::new();
        }

        let now = Utc::now();
        let weight_sum = self.weights.tf_idf
            + self.weights.fuzzy
            + self.weights.proximity
            + self.weights.semantic
            + self.weights.ast
            + self.weights.file_importance
            + self.weights.recency
            + self.weights.definition_proximity;
        if weight_sum <= 0.0 {
            return Vec::new();
        }

        let mut items: Vec<RankedItem> = candidates
            .into_iter()
            .map(|candidate| self.score_one(candidate, query, query_embedding, now, weight_sum))
            .collect();

        self.normalize(&mut items);

        items.retain(|item| item.score >= self.min_score);
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        items
    }

    fn score_one(
        &self,
        candidate: RankCandidate,
        query: &str,
        query_embedding: Option<&[f32]>,
        now: DateTime<Utc>,
        weight_sum: f64,
    ) -> RankedItem {
        use self::factors::*;

        let semantic = candidate.semantic.map(clamp01).unwrap_or_else(|| {
            semantic_score(
                query_embedding,
                candidate.embedding.as_deref(),
                query,
                &candidate.text,
            )
        });

        let values: [(&'static str, f64); 8] = [
            ("tf_idf", clamp01(candidate.sparse_score.unwrap_or(0.0))),
            ("fuzzy", fuzzy_score(query, &candidate.text)),
            ("proximity", clamp01(candidate.proximity.unwrap_or(0.0))),
            ("semantic", semantic),
            (
                "ast_relevance",
                ast_relevance(
                    candidate.node_kind.as_deref(),
                    candidate.node_name.as_deref(),
                    query,
                ),
            ),
            (
                "file_importance",
                file_importance(candidate.file_path.as_deref(), &self.file_patterns),
            ),
            ("recency", recency_score(candidate.modified_at, now)),
            (
                "definition_proximity",
                definition_proximity(candidate.node_name.as_deref(), &self.usage_counts),
            ),
        ];
        let weights = [
            self.weights.tf_idf,
            self.weights.fuzzy,
            self.weights.proximity,
            self.weights.semantic,
            self.weights.ast,
            self.weights.file_importance,
            self.weights.recency,
            self.weights.definition_proximity,
        ];

        let mut score = 0.0;
        let mut contributions = Vec::with_capacity(values.len());
        for (&(name, value), &weight) in values.iter().zip(weights.iter()) {
            let value = clamp01(value);
            score += value * weight;
            contributions.push((name, value));
        }
        score /= weight_sum;

        let explanation = self.explain.then(|| {
            contributions
                .iter()
                .zip(weights.iter())
                .filter(|(_, &w)| w > 0.0)
                .map(|(&(name, value), &weight)| format!("{name}: {value:.3}×{weight:.2}"))
                .collect::<Vec<_>>()
                .join("; ")
        });

        RankedItem {
            candidate,
            score,
            factors: contributions,
            explanation,
        }
    }

    fn normalize(&self, items: &mut [RankedItem]) {
        if items.is_empty() {
            return;
        }
        match self.normalization {
            NormalizationStrategy::None => {}
            NormalizationStrategy::MinMax => {
                let max = items.iter().map(|i| i.score).fold(f64::MIN, f64::max);
                let min = items.iter().map(|i| i.score).fold(f64::MAX, f64::min);
                if (max - min).abs() < f64::EPSILON {
                    // All equal: full relevance when there is any signal,
                    // zero when there is none.
                    let value = if max > 0.0 { 1.0 } else { 0.0 };
                    for item in items {
                        item.score = value;
                    }
                } else {
                    for item in items {
                        item.score = (item.score - min) / (max - min);
                    }
                }
            }
            NormalizationStrategy::Softmax => {
                let max = items.iter().map(|i| i.score).fold(f64::MIN, f64::max);
                let sum: f64 = items.iter().map(|i| (i.score - max).exp()).sum();
                for item in items {
                    item.score = (item.score - max).exp() / sum;
                }
            }
        }
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(RankWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, text: &str) -> RankCandidate {
        RankCandidate {
            id: id.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_better_match_ranks_first() {
        let ranker = Ranker::default();
        let items = ranker.rank(
            vec![
                candidate("weak", "unrelated content entirely"),
                candidate("strong", "parse query terms with a parser"),
            ],
            "parse query",
            None,
            None,
        );
        assert_eq!(items[0].candidate.id, "strong");
    }

    #[test]
    fn test_min_max_all_equal_is_one() {
        let ranker = Ranker::default();
        let items = ranker.rank(
            vec![
                candidate("a", "parse query"),
                candidate("b", "parse query"),
            ],
            "parse query",
            None,
            None,
        );
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| (i.score - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_all_zero_factors_filtered_out() {
        let ranker = Ranker::default().with_min_score(0.1);
        let items = ranker.rank(
            vec![candidate("a", "xyz"), candidate("b", "qrs")],
            "unmatched",
            None,
            None,
        );
        assert!(items.is_empty());
    }

    #[test]
    fn test_stable_order_for_ties() {
        let ranker = Ranker::default().with_normalization(NormalizationStrategy::None);
        let items = ranker.rank(
            vec![
                candidate("first", "parse query"),
                candidate("second", "parse query"),
            ],
            "parse query",
            None,
            None,
        );
        assert_eq!(items[0].candidate.id, "first");
        assert_eq!(items[1].candidate.id, "second");
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let ranker = Ranker::default().with_normalization(NormalizationStrategy::Softmax);
        let items = ranker.rank(
            vec![
                candidate("a", "parse query exactly"),
                candidate("b", "parse something"),
            ],
            "parse query",
            None,
            None,
        );
        let sum: f64 = items.iter().map(|i| i.score).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_in_unit_range_and_sorted() {
        let ranker = Ranker::default();
        let items = ranker.rank(
            vec![
                candidate("a", "parse query terms"),
                candidate("b", "query parsing helpers"),
                candidate("c", "cache eviction policy"),
            ],
            "parse query",
            None,
            None,
        );
        for item in &items {
            assert!(item.score >= 0.0 && item.score <= 1.0);
        }
        for pair in items.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_explanation_names_weighted_factors() {
        let ranker = Ranker::default().with_explanations();
        let items = ranker.rank(
            vec![candidate("a", "parse query")],
            "parse query",
            None,
            None,
        );
        let explanation = items[0].explanation.as_ref().unwrap();
        assert!(explanation.contains("fuzzy"));
        assert!(explanation.contains("semantic"));
        assert!(!explanation.contains("recency"));
    }

    #[test]
    fn test_proximity_factor_contributes() {
        let ranker = Ranker::default().with_normalization(NormalizationStrategy::None);
        let mut near = candidate("near", "same text");
        near.proximity = Some(1.0);
        let far = candidate("far", "same text");

        let items = ranker.rank(vec![far, near], "query words", None, None);
        assert_eq!(items[0].candidate.id, "near");
    }

    #[test]
    fn test_cancelled_rank_is_empty() {
        use crate::cancel::CancellationSource;
        let source = CancellationSource::new();
        let token = source.token();
        source.cancel();

        let ranker = Ranker::default();
        let items = ranker.rank(
            vec![candidate("a", "parse query")],
            "parse query",
            None,
            Some(&token),
        );
        assert!(items.is_empty());
    }
}
