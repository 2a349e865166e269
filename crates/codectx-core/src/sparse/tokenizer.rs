//! Term tokenization for the sparse index
//!
//! Words of three or more characters are lowercased; camelCase words also
//! contribute their parts so `parseQuery` matches both "parsequery" and
//! "parse"/"query". Stop words are not removed here; the query processor
//! owns that.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b\p{L}[\p{L}\d]{2,}\b").unwrap();
}

/// Split a camelCase or PascalCase word at lower→upper transitions.
fn camel_parts(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev_lower = false;

    for (idx, ch) in word.char_indices() {
        if ch.is_uppercase() && prev_lower {
            parts.push(&word[start..idx]);
            start = idx;
        }
        prev_lower = ch.is_lowercase();
    }
    parts.push(&word[start..]);
    parts
}

/// Tokenize text into lowercased terms plus camelCase parts of at least
/// three letters.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for m in WORD.find_iter(text) {
        let word = m.as_str();
        terms.push(word.to_lowercase());

        let parts = camel_parts(word);
        if parts.len() > 1 {
            for part in parts {
                if part.chars().filter(|c| c.is_alphabetic()).count() >= 3 {
                    terms.push(part.to_lowercase());
                }
            }
        }
    }
    terms
}

/// Raw term-frequency map of a text
pub fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut freqs = HashMap::new();
    for term in tokenize(text) {
        *freqs.entry(term).or_insert(0.0) += 1.0;
    }
    freqs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_words_dropped() {
        let terms = tokenize("a an the cat dog");
        assert_eq!(terms, vec!["the", "cat", "dog"]);
    }

    #[test]
    fn test_lowercased() {
        let terms = tokenize("Machine Learning");
        assert_eq!(terms, vec!["machine", "learning"]);
    }

    #[test]
    fn test_camel_case_parts_added() {
        let terms = tokenize("parseQueryString");
        assert!(terms.contains(&"parsequerystring".to_string()));
        assert!(terms.contains(&"parse".to_string()));
        assert!(terms.contains(&"query".to_string()));
        assert!(terms.contains(&"string".to_string()));
    }

    #[test]
    fn test_short_camel_parts_skipped() {
        let terms = tokenize("toDo");
        // whole word kept, but "to" and "do" are under three letters
        assert_eq!(terms, vec!["todo"]);
    }

    #[test]
    fn test_digits_allowed_after_first_letter() {
        let terms = tokenize("sha256 x86 v2");
        assert!(terms.contains(&"sha256".to_string()));
        assert!(terms.contains(&"x86".to_string()));
        assert!(!terms.contains(&"v2".to_string()));
    }

    #[test]
    fn test_term_frequencies_count_occurrences() {
        let freqs = term_frequencies("cat dog cat");
        assert_eq!(freqs["cat"], 2.0);
        assert_eq!(freqs["dog"], 1.0);
    }
}
