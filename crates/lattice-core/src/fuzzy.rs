//! Fuzzy string matching for name and purpose search.
//!
//! All scores are in `[0.0, 1.0]`, higher is closer.

use std::collections::HashSet;

/// Score for a case-insensitive but not exact name match.
const CASE_INSENSITIVE_SCORE: f64 = 0.95;

/// Floor of the containment score; the remainder scales with length ratio.
const CONTAINMENT_BASE: f64 = 0.6;

/// Score for a purpose text that contains the query verbatim.
const PURPOSE_SUBSTRING_SCORE: f64 = 0.9;

/// Ceiling for word-overlap purpose matches.
const PURPOSE_OVERLAP_WEIGHT: f64 = 0.8;

/// Levenshtein edit distance over chars.
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
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / max_len`.
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Similarity between a search query and an entity name.
///
/// Exact match is 1.0. Otherwise the better of edit-distance similarity and
/// a containment score for names that include the query (or vice versa).
pub fn name_similarity(query: &str, name: &str) -> f64 {
    if query == name {
        return 1.0;
    }

    let q = query.to_lowercase();
    let n = name.to_lowercase();
    if q.is_empty() || n.is_empty() {
        return 0.0;
    }
    if q == n {
        return CASE_INSENSITIVE_SCORE;
    }

    let edit = normalized_levenshtein(&q, &n);

    let (q_len, n_len) = (q.chars().count(), n.chars().count());
    let containment = if n.contains(&q) || q.contains(&n) {
        let (short, long) = (q_len.min(n_len), q_len.max(n_len));
        CONTAINMENT_BASE + (1.0 - CONTAINMENT_BASE) * short as f64 / long as f64
    } else {
        0.0
    };

    edit.max(containment).min(CASE_INSENSITIVE_SCORE)
}

/// Similarity between a search query and free-text purpose.
pub fn text_similarity(query: &str, text: &str) -> f64 {
    let query = query.trim();
    let q = query.to_lowercase();
    let t = text.to_lowercase();
    if q.is_empty() || t.is_empty() {
        return 0.0;
    }
    if t.contains(&q) {
        return PURPOSE_SUBSTRING_SCORE;
    }

    // Split before lowercasing so camelCase queries keep their words
    let query_words = words(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let text_words = words(text);
    let hits = query_words.iter().filter(|w| text_words.contains(*w)).count();

    PURPOSE_OVERLAP_WEIGHT * hits as f64 / query_words.len() as f64
}

/// Splits on non-alphanumerics and camelCase boundaries, lowercased.
pub fn words(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.insert(std::mem::take(&mut current).to_lowercase());
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.insert(std::mem::take(&mut current).to_lowercase());
        }
        prev_lower = c.is_lowercase() || c.is_numeric();
        current.push(c);
    }
    if !current.is_empty() {
        out.insert(current.to_lowercase());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_exact_name_is_one() {
        assert_eq!(name_similarity("testFunction0", "testFunction0"), 1.0);
    }

    #[test]
    fn test_prefix_query_scores_above_threshold() {
        let a = name_similarity("testFunc", "testFunction0");
        let b = name_similarity("testFunc", "testFunction1");
        assert!(a > 0.3, "got {}", a);
        assert!((a - b).abs() < f64::EPSILON);
        assert!(a < 1.0);
    }

    #[test]
    fn test_case_insensitive_below_exact() {
        let score = name_similarity("authservice", "AuthService");
        assert!(score < 1.0);
        assert!(score > 0.9);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        assert!(name_similarity("parseConfig", "renderWidget") < 0.3);
    }

    #[test]
    fn test_text_similarity() {
        let purpose = "Validates user credentials against the directory";
        assert_eq!(text_similarity("user credentials", purpose), 0.9);
        let partial = text_similarity("credentials cache", purpose);
        assert!(partial > 0.0 && partial < 0.9);
        assert_eq!(text_similarity("render", purpose), 0.0);
    }

    #[test]
    fn test_text_similarity_splits_camel_case_query() {
        let purpose = "Handles user login for the app";
        assert!((text_similarity("userLogin", purpose) - 0.8).abs() < 1e-9);
        assert!((text_similarity("user_session", purpose) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_words_split_camel_and_snake() {
        let w = words("validateUser_credentials");
        assert!(w.contains("validate"));
        assert!(w.contains("user"));
        assert!(w.contains("credentials"));
    }
}
