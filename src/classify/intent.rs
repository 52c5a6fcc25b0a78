//! Intent detection with contextual clues and continuation resolution.
//!
//! A fixed table of regex signal groups scores each intent independently;
//! contextual clues (code fences, URLs, file extensions, code in the
//! previous turn) add smaller increments, and a leading continuation word
//! re-boosts whichever intent was returned last so follow-up questions work
//! without restating the subject.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::classify::complexity::assess_complexity;
use crate::models::{Classification, ConversationRecord, IntentKind, ScoredIntent};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;

/// Confidence added for each matching signal group, capped at 1.0 per intent.
pub const SIGNAL_INCREMENT: f32 = 0.4;

/// Smaller confidence added by each contextual clue.
pub const CONTEXT_INCREMENT: f32 = 0.15;

/// Confidence granted to the previous intent when the request opens with a
/// continuation word.
pub const CONTINUATION_BOOST: f32 = 0.5;

/// Minimum confidence an intent must accumulate to be reported at all.
pub const INTENT_FLOOR: f32 = 0.3;

/// Number of past primary intents kept for continuation resolution.
pub const INTENT_HISTORY_CAP: usize = 10;

/// An intent signal pattern with its target intent.
#[derive(Debug)]
struct IntentSignal {
    /// The regex pattern to match.
    pattern: Regex,
    /// The intent this pattern indicates.
    intent: IntentKind,
    /// Human-readable description of the signal.
    #[allow(dead_code)]
    description: &'static str,
}

/// Static intent signal patterns grouped by intent.
static INTENT_SIGNALS: LazyLock<Vec<IntentSignal>> = LazyLock::new(|| {
    vec![
        // Lookup patterns: time-sensitive, externally grounded queries
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(weather|forecast|temperature)\b")
                .expect("static regex: weather"),
            intent: IntentKind::Lookup,
            description: "weather/forecast/temperature",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(news|headlines?)\b").expect("static regex: news"),
            intent: IntentKind::Lookup,
            description: "news/headlines",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(price|prices|stock|exchange\s+rate)\b")
                .expect("static regex: price"),
            intent: IntentKind::Lookup,
            description: "price/stock/exchange rate",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(scores?|standings|fixtures?)\b")
                .expect("static regex: score"),
            intent: IntentKind::Lookup,
            description: "scores/standings/fixtures",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(latest|current|right\s+now|today'?s)\b")
                .expect("static regex: latest"),
            intent: IntentKind::Lookup,
            description: "latest/current/right now",
        },
        // Code patterns
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(code|function|compiler?|syntax)\b")
                .expect("static regex: code"),
            intent: IntentKind::Code,
            description: "code/function/compiler/syntax",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(bug|stack\s+trace|segfault|exception)\b")
                .expect("static regex: bug"),
            intent: IntentKind::Code,
            description: "bug/stack trace/exception",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(refactor|debug|lint|unit\s+test)\b")
                .expect("static regex: refactor"),
            intent: IntentKind::Code,
            description: "refactor/debug/lint",
        },
        // Summarize patterns
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(summar(y|ize|ise)|recap|condense)\b")
                .expect("static regex: summarize"),
            intent: IntentKind::Summarize,
            description: "summarize/recap/condense",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\btl;?dr\b").expect("static regex: tldr"),
            intent: IntentKind::Summarize,
            description: "tl;dr",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(key\s+points|main\s+takeaways)\b")
                .expect("static regex: key points"),
            intent: IntentKind::Summarize,
            description: "key points/main takeaways",
        },
        // Creative patterns
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(story|poem|song|lyrics|haiku|essay)\b")
                .expect("static regex: story"),
            intent: IntentKind::Creative,
            description: "story/poem/song/essay",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(brainstorm|compose|draft\s+a)\b")
                .expect("static regex: brainstorm"),
            intent: IntentKind::Creative,
            description: "brainstorm/compose/draft",
        },
        // Image patterns
        IntentSignal {
            pattern: Regex::new(r"(?i)\b(image|photo|picture|screenshot|diagram)\b")
                .expect("static regex: image"),
            intent: IntentKind::Image,
            description: "image/photo/picture",
        },
        IntentSignal {
            pattern: Regex::new(r"(?i)\bcaption\s+(this|the)\b").expect("static regex: caption"),
            intent: IntentKind::Image,
            description: "caption this",
        },
    ]
});

/// URL detection for the summarize-a-link clue.
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static regex: url"));

/// File-extension token detection for the code clue.
static FILE_EXTENSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\w+\.(rs|py|js|ts|go|java|c|cpp|h|rb|sh|json|toml|yaml|yml|md)\b")
        .expect("static regex: file extension")
});

/// Leading continuation words that refer back to the previous turn.
static CONTINUATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(this|that|it|again)\b").expect("static regex: continuation"));

/// Classifies requests into a complexity tier and scored intents.
///
/// Stateless per call except for a bounded rolling history of primary
/// intents, used only for continuation resolution.
#[derive(Debug, Default)]
pub struct Classifier {
    history: VecDeque<IntentKind>,
}

impl Classifier {
    /// Creates a classifier with an empty intent history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(INTENT_HISTORY_CAP),
        }
    }

    /// Returns the most recently returned primary intent, if any.
    #[must_use]
    pub fn last_intent(&self) -> Option<IntentKind> {
        self.history.back().copied()
    }

    /// Returns the rolling intent history, oldest first.
    #[must_use]
    pub fn history(&self) -> impl Iterator<Item = IntentKind> + '_ {
        self.history.iter().copied()
    }

    /// Classifies a request against its rolling context.
    ///
    /// `recent_context` is the tail of the conversation, oldest first; only
    /// the most recent entry is consulted, for the previous-turn-code clue.
    pub fn classify(
        &mut self,
        text: &str,
        recent_context: &[ConversationRecord],
    ) -> Classification {
        let complexity = assess_complexity(text);
        let mut scores: HashMap<IntentKind, f32> = HashMap::new();

        for signal in INTENT_SIGNALS.iter() {
            if signal.pattern.is_match(text) {
                *scores.entry(signal.intent).or_insert(0.0) += SIGNAL_INCREMENT;
            }
        }

        apply_context_clues(text, recent_context, &mut scores);

        if CONTINUATION_PATTERN.is_match(text) {
            if let Some(last) = self.last_intent() {
                *scores.entry(last).or_insert(0.0) += CONTINUATION_BOOST;
            }
        }

        let mut intents: Vec<ScoredIntent> = scores
            .into_iter()
            .map(|(intent, confidence)| ScoredIntent {
                intent,
                confidence: confidence.min(1.0),
            })
            .filter(|scored| scored.confidence >= INTENT_FLOOR)
            .collect();
        intents.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.intent.as_str().cmp(b.intent.as_str()))
        });

        // Fallback: plain conversation at full confidence
        if intents.is_empty() {
            intents.push(ScoredIntent {
                intent: IntentKind::Conversation,
                confidence: 1.0,
            });
        }

        let primary = intents[0].intent;
        let confidence = intents[0].confidence;
        self.remember(primary);

        Classification {
            complexity,
            intents,
            confidence,
        }
    }

    /// Appends an intent to the rolling history, evicting the oldest entry
    /// once the cap is reached.
    fn remember(&mut self, intent: IntentKind) {
        if self.history.len() == INTENT_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(intent);
    }
}

/// Adds the smaller contextual-clue increments to related intents.
fn apply_context_clues(
    text: &str,
    recent_context: &[ConversationRecord],
    scores: &mut HashMap<IntentKind, f32>,
) {
    if text.contains("```") {
        *scores.entry(IntentKind::Code).or_insert(0.0) += CONTEXT_INCREMENT;
    }
    if URL_PATTERN.is_match(text) {
        *scores.entry(IntentKind::Summarize).or_insert(0.0) += CONTEXT_INCREMENT;
    }
    if FILE_EXTENSION_PATTERN.is_match(text) {
        *scores.entry(IntentKind::Code).or_insert(0.0) += CONTEXT_INCREMENT;
    }
    if recent_context
        .last()
        .is_some_and(|record| record.content.contains("```"))
    {
        *scores.entry(IntentKind::Code).or_insert(0.0) += CONTEXT_INCREMENT;
    }
}
