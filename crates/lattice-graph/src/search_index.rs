//! Search index for purpose text.
//!
//! An inverted index over n-grams and words of each node's purpose string.
//! Semantic search uses it to narrow the set of nodes it has to score,
//! instead of scoring every node in the version.

use lattice_core::fuzzy::words;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// Minimum n-gram length for indexing.
const MIN_NGRAM_LEN: usize = 2;

/// Maximum n-gram length for indexing.
const MAX_NGRAM_LEN: usize = 4;

/// An inverted index for substring and word lookups.
///
/// When a text is added, we break it into overlapping n-grams and words and
/// index each one. Substring search intersects the query's n-grams; word
/// search unions the query's words.
#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    /// Maps lowercased full texts to nodes, for verification.
    texts: HashMap<NodeIndex, String>,
    /// Maps lowercased n-grams to nodes for substring search.
    ngram_index: HashMap<String, HashSet<NodeIndex>>,
    /// Maps lowercased words to nodes.
    word_index: HashMap<String, HashSet<NodeIndex>>,
}

impl SearchIndex {
    /// Creates a new empty search index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a text into the index.
    pub fn insert(&mut self, text: &str, id: NodeIndex) {
        let lower = text.to_lowercase();

        for ngram in generate_ngrams(&lower) {
            self.ngram_index.entry(ngram).or_default().insert(id);
        }
        for word in words(text) {
            self.word_index.entry(word).or_default().insert(id);
        }

        self.texts.insert(id, lower);
    }

    /// Finds nodes whose text contains the query substring.
    ///
    /// Returns matching nodes sorted for deterministic output.
    pub fn search(&self, query: &str) -> Vec<NodeIndex> {
        let query_lower = query.to_lowercase();

        // For very short queries, fall back to a scan of the stored texts
        if query_lower.chars().count() < MIN_NGRAM_LEN {
            let mut results: Vec<NodeIndex> = self
                .texts
                .iter()
                .filter(|(_, text)| text.contains(&query_lower))
                .map(|(id, _)| *id)
                .collect();
            results.sort();
            return results;
        }

        // Find candidate nodes by intersecting n-gram matches
        let mut candidates: Option<HashSet<NodeIndex>> = None;

        for ngram in generate_ngrams(&query_lower) {
            let Some(ids) = self.ngram_index.get(&ngram) else {
                // If any n-gram has no matches, the query has no results
                return Vec::new();
            };
            match &mut candidates {
                None => candidates = Some(ids.clone()),
                Some(c) => c.retain(|id| ids.contains(id)),
            }
        }

        // n-gram intersection can have false positives
        let mut results: Vec<NodeIndex> = candidates
            .unwrap_or_default()
            .into_iter()
            .filter(|id| {
                self.texts
                    .get(id)
                    .map_or(false, |text| text.contains(&query_lower))
            })
            .collect();

        results.sort();
        results
    }

    /// Nodes containing the query verbatim or sharing at least one word.
    pub fn candidates(&self, query: &str) -> Vec<NodeIndex> {
        let mut found: HashSet<NodeIndex> = self.search(query).into_iter().collect();

        for word in words(query) {
            if let Some(ids) = self.word_index.get(&word) {
                found.extend(ids.iter().copied());
            }
        }

        let mut results: Vec<NodeIndex> = found.into_iter().collect();
        results.sort();
        results
    }

    /// Returns the number of indexed texts.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Generates n-grams for a lowercased string.
fn generate_ngrams(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut ngrams = Vec::new();

    for n in MIN_NGRAM_LEN..=MAX_NGRAM_LEN {
        if chars.len() >= n {
            for i in 0..=(chars.len() - n) {
                ngrams.push(chars[i..i + n].iter().collect());
            }
        }
    }

    ngrams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: usize) -> NodeIndex {
        NodeIndex::new(n)
    }

    #[test]
    fn test_search_substring() {
        let mut index = SearchIndex::new();
        index.insert("Validates user credentials", node(0));
        index.insert("Sends the welcome email", node(1));

        assert_eq!(index.search("user cred"), vec![node(0)]);
        assert_eq!(index.search("EMAIL"), vec![node(1)]);
        assert!(index.search("password").is_empty());
    }

    #[test]
    fn test_short_query() {
        let mut index = SearchIndex::new();
        index.insert("a", node(0));
        index.insert("xyz", node(1));

        assert_eq!(index.search("a"), vec![node(0)]);
    }

    #[test]
    fn test_candidates_include_word_overlap() {
        let mut index = SearchIndex::new();
        index.insert("Validates user credentials", node(0));
        index.insert("Caches user sessions", node(1));
        index.insert("Renders the sidebar", node(2));

        let found = index.candidates("user login");
        assert_eq!(found, vec![node(0), node(1)]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_camel_case_words_are_indexed() {
        let mut index = SearchIndex::new();
        index.insert("Refreshes the sessionToken", node(0));
        index.insert("Renders the sidebar", node(1));

        assert_eq!(index.candidates("token"), vec![node(0)]);
        assert_eq!(index.candidates("sessionExpiry"), vec![node(0)]);
    }
}
