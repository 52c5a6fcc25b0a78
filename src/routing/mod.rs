//! Tier routing and capability dispatch.

mod capability;
mod dispatch;
mod router;

pub use capability::{CapabilityHandler, CapabilityRegistry};
pub use dispatch::{
    DEFAULT_CALL_TIMEOUT_MS, Dispatcher, ESCALATION_THRESHOLD, HIGH_EFFORT_CONFIDENCE,
    KEYWORD_CONFIDENCE, LOW_EFFORT_CONFIDENCE,
};
pub use router::{Router, WEIGHT_BIAS_THRESHOLD};
