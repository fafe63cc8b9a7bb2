//! Keyword extraction for the keyword index.
//!
//! Keywords are the most frequent content words of a paper's abstract. The
//! heuristic is intentionally simple and fully deterministic so that re-ingesting
//! the same paper always produces the same keyword partition keys.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Default number of keywords kept per paper.
pub const DEFAULT_KEYWORD_LIMIT: usize = 10;

/// Minimum token length (in characters) for a keyword candidate.
const MIN_TOKEN_LEN: usize = 3;

/// A token starts with a letter and continues with letters, digits or hyphens.
static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9\-]+").expect("valid word pattern"));

/// Words never treated as keywords.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into", "through", "during", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
    "might", "can", "this", "that", "these", "those", "we", "our", "use", "using", "based",
    "approach", "method", "paper", "propose", "proposed", "show",
];

/// Returns true if `word` (already lowercased) is a stop word.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Split text into lowercase keyword candidates, in order of appearance.
///
/// Stop words and tokens shorter than three characters are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() >= MIN_TOKEN_LEN && !is_stopword(w))
        .collect()
}

/// Extract up to `limit` keywords from free text.
///
/// Keywords are ranked by descending frequency; ties keep the order in which the
/// words first appear in the text.
///
/// # Arguments
/// * `text` - The text to extract keywords from (typically an abstract)
/// * `limit` - Maximum number of keywords to return
///
/// # Returns
/// The ranked keyword list; empty for empty text
///
/// # Example
/// ```
/// use arxiv_projection::keywords::extract_keywords;
///
/// let keywords = extract_keywords("graph learning on graph data", 10);
/// assert_eq!(keywords, vec!["graph", "learning", "data"]);
/// ```
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();

    for word in tokenize(text) {
        let count = counts.entry(word.clone()).or_insert(0);
        if *count == 0 {
            first_seen.push(word);
        }
        *count += 1;
    }

    // Stable sort keeps first-occurrence order among equal counts
    first_seen.sort_by(|a, b| counts[b].cmp(&counts[a]));
    first_seen.truncate(limit);
    first_seen
}
