//! Complexity assessment for incoming requests.
//!
//! A cheap lexical pass that decides how much computational effort a request
//! deserves before any model is consulted. Ties resolve toward the lower
//! tier: the cheap path is the default.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::models::Complexity;
use regex::Regex;
use std::sync::LazyLock;

/// Token count above which a request is considered complex.
const COMPLEX_TOKEN_THRESHOLD: usize = 50;

/// Token count above which a request is considered moderate.
const MODERATE_TOKEN_THRESHOLD: usize = 20;

/// Short self-contained greetings that short-circuit to the lowest tier.
static GREETING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^(hi|hey|hello|yo|howdy|hiya)[\s!.?]*$").expect("static regex: greeting"),
        Regex::new(r"(?i)^good\s+(morning|afternoon|evening|night)[\s!.?]*$")
            .expect("static regex: good morning"),
        Regex::new(r"(?i)^(thanks|thank\s+you|thx|cheers)[\s!.?]*$")
            .expect("static regex: thanks"),
        Regex::new(r"(?i)^(bye|goodbye|see\s+you|later)[\s!.?]*$").expect("static regex: bye"),
        Regex::new(r"(?i)^how\s+are\s+you[\s!.?]*$").expect("static regex: how are you"),
    ]
});

/// Lexical markers that indicate a request needs real reasoning effort.
static COMPLEX_MARKERS: &[&str] = &[
    "explain",
    "analyze",
    "analyse",
    "compare",
    "contrast",
    "implement",
    "debug",
    "optimize",
    "optimise",
    "refactor",
    "design",
    "derive",
    "prove",
    "equation",
    "algorithm",
    "architecture",
    "evaluate",
    "tradeoff",
    "trade-off",
    "benchmark",
    "integrate",
];

/// Word-boundary matcher over all complex markers.
static MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = COMPLEX_MARKERS.join("|");
    Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("static regex: complex markers")
});

/// Counts the distinct complex markers present in the text.
#[must_use]
pub fn count_complex_markers(text: &str) -> usize {
    let mut found: Vec<String> = MARKER_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    found.sort();
    found.dedup();
    found.len()
}

/// Assesses the complexity tier of a request.
///
/// Short greetings are always [`Complexity::Simple`]. Two or more distinct
/// complex markers, or a token count above [`COMPLEX_TOKEN_THRESHOLD`],
/// yields [`Complexity::Complex`]; exactly one marker or a token count above
/// [`MODERATE_TOKEN_THRESHOLD`] yields [`Complexity::Moderate`]; everything
/// else stays [`Complexity::Simple`].
#[must_use]
pub fn assess_complexity(text: &str) -> Complexity {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Complexity::Simple;
    }

    if GREETING_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        return Complexity::Simple;
    }

    let markers = count_complex_markers(trimmed);
    let tokens = trimmed.split_whitespace().count();

    if markers >= 2 || tokens > COMPLEX_TOKEN_THRESHOLD {
        Complexity::Complex
    } else if markers == 1 || tokens > MODERATE_TOKEN_THRESHOLD {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}
