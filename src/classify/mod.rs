//! Request classification: complexity assessment, intent detection, and
//! keyword extraction.
//!
//! Everything here is a cheap lexical pass; no model call is made. The
//! classifier's only state is a bounded rolling history of primary intents
//! used to resolve follow-up questions.

mod complexity;
mod intent;
mod keywords;

pub use complexity::{assess_complexity, count_complex_markers};
pub use intent::{
    CONTEXT_INCREMENT, CONTINUATION_BOOST, Classifier, INTENT_FLOOR, INTENT_HISTORY_CAP,
    SIGNAL_INCREMENT,
};
pub use keywords::extract_keywords;
