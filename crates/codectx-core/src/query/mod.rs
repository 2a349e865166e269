//! Query parsing, expansion, and matching
//!
//! Parses free-text queries into terms, exact phrases, exclusions, and
//! field filters; expands terms with a small programming synonym table and
//! a naive stemmer; and classifies how a piece of context matches a query.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it",
        "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where", "which",
        "who", "will", "with",
    ]
    .into_iter()
    .collect();

    /// Small programming-domain synonym table
    static ref SYNONYMS: HashMap<&'static str, &'static [&'static str]> = {
        let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        map.insert("function", &["method", "procedure", "routine"]);
        map.insert("method", &["function", "member"]);
        map.insert("class", &["type", "struct"]);
        map.insert("error", &["exception", "failure", "bug"]);
        map.insert("delete", &["remove", "drop"]);
        map.insert("create", &["make", "new", "build"]);
        map.insert("fetch", &["get", "retrieve", "load"]);
        map.insert("config", &["configuration", "settings", "options"]);
        map.insert("test", &["spec", "check"]);
        map.insert("variable", &["var", "field"]);
        map.insert("array", &["list", "vector"]);
        map.insert("map", &["dictionary", "hashmap"]);
        map.insert("string", &["text", "str"]);
        map.insert("search", &["find", "query", "lookup"]);
        map
    };
}

/// A query decomposed per the grammar: free terms, `"exact"` phrases,
/// `-excluded` terms, and `field:value` filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub terms: Vec<String>,
    pub phrases: Vec<String>,
    pub exclusions: Vec<String>,
    pub filters: BTreeMap<String, String>,
}

/// How a piece of context matched a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Semantic,
    None,
}

/// Coarse intent classification for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Looks like an identifier or code fragment
    Code,
    /// Mentions a path
    Path,
    /// Natural-language question
    Question,
    General,
}

/// Which matchers a query type should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherCapabilities {
    pub exact: bool,
    pub fuzzy: bool,
    pub semantic: bool,
}

/// Expanded term set derived from a parsed query
#[derive(Debug, Clone, Default)]
pub struct ExpandedQuery {
    pub terms: Vec<String>,
    pub synonyms: Vec<String>,
    pub stems: Vec<String>,
}

impl ExpandedQuery {
    /// All distinct search terms, original first.
    pub fn all_terms(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.terms
            .iter()
            .chain(self.synonyms.iter())
            .chain(self.stems.iter())
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// Parse a raw query string.
///
/// Quoted spans become exact phrases, a leading `-` marks an exclusion,
/// `field:value` tokens populate the filter map, and stop words are removed
/// from the remaining free terms.
pub fn parse_query(input: &str) -> ParsedQuery {
    let mut query = ParsedQuery::default();

    for token in split_respecting_quotes(input) {
        if let Some(phrase) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            if !phrase.is_empty() {
                query.phrases.push(phrase.to_string());
            }
        } else if let Some(excluded) = token.strip_prefix('-') {
            if !excluded.is_empty() {
                query.exclusions.push(excluded.to_lowercase());
            }
        } else if let Some((field, value)) = token.split_once(':') {
            if !field.is_empty() && !value.is_empty() {
                query
                    .filters
                    .insert(field.to_lowercase(), value.to_string());
            }
        } else {
            let term = token.to_lowercase();
            if !term.is_empty() && !STOP_WORDS.contains(term.as_str()) {
                query.terms.push(term);
            }
        }
    }
    query
}

/// Render a query back into the grammar `parse_query` accepts.
pub fn serialize_query(query: &ParsedQuery) -> String {
    let mut parts = Vec::new();
    for term in &query.terms {
        parts.push(term.clone());
    }
    for phrase in &query.phrases {
        parts.push(format!("\"{phrase}\""));
    }
    for excluded in &query.exclusions {
        parts.push(format!("-{excluded}"));
    }
    for (field, value) in &query.filters {
        parts.push(format!("{field}:{value}"));
    }
    parts.join(" ")
}

fn split_respecting_quotes(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Naive stemmer: strip `ing`, `ed`, and a trailing `s` (unless `ss`).
pub fn stem(word: &str) -> String {
    if let Some(base) = word.strip_suffix("ing") {
        if base.len() >= 3 {
            return base.to_string();
        }
    }
    if let Some(base) = word.strip_suffix("ed") {
        if base.len() >= 3 {
            return base.to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && word.len() > 3 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Expand a parsed query with synonyms and stems.
pub fn expand_query(query: &ParsedQuery) -> ExpandedQuery {
    let mut expanded = ExpandedQuery {
        terms: query.terms.clone(),
        ..Default::default()
    };

    for term in &query.terms {
        if let Some(synonyms) = SYNONYMS.get(term.as_str()) {
            for synonym in *synonyms {
                expanded.synonyms.push((*synonym).to_string());
            }
        }
        let stemmed = stem(term);
        if stemmed != *term {
            expanded.stems.push(stemmed);
        }
    }
    expanded
}

/// Levenshtein edit distance
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Similarity in [0,1] derived from edit distance
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

const FUZZY_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Classify how `text` matches the query: exact phrases first, then plain
/// terms, then expansions, then a Levenshtein pass over the text's words.
pub fn match_context(query: &ParsedQuery, text: &str) -> MatchType {
    let text_lower = text.to_lowercase();

    for phrase in &query.phrases {
        if text_lower.contains(&phrase.to_lowercase()) {
            return MatchType::Exact;
        }
    }
    for term in &query.terms {
        if text_lower.contains(term.as_str()) {
            return MatchType::Exact;
        }
    }

    let expanded = expand_query(query);
    for term in expanded.synonyms.iter().chain(expanded.stems.iter()) {
        if text_lower.contains(term.as_str()) {
            return MatchType::Semantic;
        }
    }

    let words: Vec<&str> = text_lower.split_whitespace().collect();
    for term in &query.terms {
        for word in &words {
            if similarity(term, word) > FUZZY_SIMILARITY_THRESHOLD {
                return MatchType::Fuzzy;
            }
        }
    }

    MatchType::None
}

/// Classify the intent of a raw query.
pub fn classify_intent(input: &str) -> QueryIntent {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower.starts_with("what")
        || lower.starts_with("how")
        || lower.starts_with("why")
        || lower.starts_with("where")
        || trimmed.ends_with('?')
    {
        return QueryIntent::Question;
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return QueryIntent::Path;
    }
    let code_like = trimmed.contains("()")
        || trimmed.contains("::")
        || trimmed.contains('_')
        || trimmed
            .split_whitespace()
            .any(|w| w.chars().any(|c| c.is_lowercase()) && w.chars().any(|c| c.is_uppercase()));
    if code_like {
        return QueryIntent::Code;
    }
    QueryIntent::General
}

/// Capability flags per query intent.
pub fn matcher_for(intent: QueryIntent) -> MatcherCapabilities {
    match intent {
        QueryIntent::Code => MatcherCapabilities {
            exact: true,
            fuzzy: true,
            semantic: false,
        },
        QueryIntent::Path => MatcherCapabilities {
            exact: true,
            fuzzy: false,
            semantic: false,
        },
        QueryIntent::Question => MatcherCapabilities {
            exact: false,
            fuzzy: true,
            semantic: true,
        },
        QueryIntent::General => MatcherCapabilities {
            exact: true,
            fuzzy: true,
            semantic: true,
        },
    }
}
