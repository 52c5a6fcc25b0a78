//! Keyword extraction for record indexing and weight lookup.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum keywords extracted per request.
const MAX_KEYWORDS: usize = 8;

/// Common stop words to filter from keyword extraction.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a",
        "an",
        "the",
        "and",
        "or",
        "but",
        "in",
        "on",
        "at",
        "to",
        "for",
        "of",
        "with",
        "by",
        "from",
        "as",
        "is",
        "was",
        "are",
        "were",
        "been",
        "be",
        "have",
        "has",
        "had",
        "do",
        "does",
        "did",
        "will",
        "would",
        "could",
        "should",
        "may",
        "might",
        "must",
        "shall",
        "can",
        "need",
        "i",
        "you",
        "he",
        "she",
        "it",
        "we",
        "they",
        "me",
        "him",
        "her",
        "us",
        "them",
        "my",
        "your",
        "his",
        "its",
        "our",
        "their",
        "this",
        "that",
        "these",
        "those",
        "what",
        "which",
        "who",
        "whom",
        "how",
        "when",
        "where",
        "why",
        "all",
        "each",
        "every",
        "both",
        "few",
        "more",
        "most",
        "other",
        "some",
        "such",
        "no",
        "nor",
        "not",
        "only",
        "own",
        "same",
        "so",
        "than",
        "too",
        "very",
        "just",
        "about",
        "also",
        "now",
        "here",
        "there",
        "up",
        "down",
        "out",
        "if",
        "then",
        "into",
        "through",
        "during",
        "before",
        "after",
        "above",
        "below",
        "between",
        "under",
        "again",
        "further",
        "once",
        "any",
        "something",
        "anything",
        "nothing",
        "please",
        "tell",
    ]
    .into_iter()
    .collect()
});

/// Extracts deduplicated topic keywords from request text.
///
/// Keywords are significant words used to index conversation records and to
/// look up adaptive weights. Stop words, short tokens, and pure numbers are
/// filtered; at most [`MAX_KEYWORDS`] are returned in first-seen order.
#[must_use]
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';' || c == ':')
        .filter(|w| !w.is_empty())
        .collect();

    for word in words {
        let cleaned = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .to_lowercase();

        if cleaned.len() < 3 {
            continue;
        }
        if STOP_WORDS.contains(cleaned.as_str()) {
            continue;
        }
        if seen.contains(&cleaned) {
            continue;
        }
        // Skip pure numbers
        if cleaned.chars().all(char::is_numeric) {
            continue;
        }

        seen.insert(cleaned.clone());
        keywords.push(cleaned);
    }

    keywords.truncate(MAX_KEYWORDS);
    keywords
}
