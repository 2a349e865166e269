//! Individual ranking factor functions
//!
//! Every factor maps to [0,1]; the ranker clamps again defensively at the
//! combination site so misbehaving custom factors cannot skew a score.

use crate::sparse::tokenize;
use crate::store::cosine_similarity;
use crate::syntax::node_kind_relevance;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::collections::HashSet;

pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Substring / per-term containment. A full query substring match scores
/// 1.0; otherwise the fraction of query terms contained in the text.
pub fn fuzzy_score(query: &str, text: &str) -> f64 {
    if query.is_empty() || text.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let query_lower = query.to_lowercase();
    if text_lower.contains(&query_lower) {
        return 1.0;
    }

    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| text_lower.contains(**t)).count();
    hits as f64 / terms.len() as f64
}

/// Cosine similarity against the query embedding when both vectors exist,
/// else token Jaccard overlap between query and text.
pub fn semantic_score(
    query_embedding: Option<&[f32]>,
    embedding: Option<&[f32]>,
    query: &str,
    text: &str,
) -> f64 {
    match (query_embedding, embedding) {
        (Some(q), Some(e)) => clamp01(cosine_similarity(q, e) as f64),
        _ => token_jaccard(query, text),
    }
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = tokenize(a).into_iter().collect();
    let set_b: HashSet<String> = tokenize(b).into_iter().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Max of the node-kind table score and a fuzzy match on the node name.
/// Zero when no tree node is attached.
pub fn ast_relevance(node_kind: Option<&str>, node_name: Option<&str>, query: &str) -> f64 {
    let kind = match node_kind {
        Some(kind) => kind,
        None => return 0.0,
    };
    let kind_score = node_kind_relevance(kind);
    let name_score = node_name.map(|n| fuzzy_score(query, n)).unwrap_or(0.0);
    kind_score.max(name_score)
}

/// Path-pattern importance: the highest weight among matching patterns.
pub fn file_importance(path: Option<&str>, patterns: &[(Regex, f64)]) -> f64 {
    let path = match path {
        Some(path) => path,
        None => return 0.0,
    };
    patterns
        .iter()
        .filter(|(re, _)| re.is_match(path))
        .map(|&(_, weight)| clamp01(weight))
        .fold(0.0, f64::max)
}

/// Exponential decay with a seven-day half-life.
pub fn recency_score(modified_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let modified_at = match modified_at {
        Some(ts) => ts,
        None => return 0.0,
    };
    let age = now.signed_duration_since(modified_at);
    if age < Duration::zero() {
        return 1.0;
    }
    let half_lives = age.num_seconds() as f64 / Duration::days(7).num_seconds() as f64;
    clamp01(0.5f64.powf(half_lives))
}

/// Usage-table proximity: how often the candidate's symbol is referenced,
/// scaled against the hottest symbol in the table.
pub fn definition_proximity(symbol: Option<&str>, usage_counts: &HashMap<String, usize>) -> f64 {
    let symbol = match symbol {
        Some(symbol) => symbol,
        None => return 0.0,
    };
    let max = usage_counts.values().copied().max().unwrap_or(0);
    if max == 0 {
        return 0.0;
    }
    usage_counts.get(symbol).copied().unwrap_or(0) as f64 / max as f64
}
