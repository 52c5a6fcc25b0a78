//! Routing decision types: model tiers, effort levels, and classifier output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request complexity as judged by the classifier.
///
/// Ordered cheapest-first; ties in classification resolve toward the
/// lower variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Greetings and short single-clause requests.
    #[default]
    Simple,
    /// One complex marker or a moderately long request.
    Moderate,
    /// Multiple complex markers or a long request.
    Complex,
}

impl Complexity {
    /// Returns all complexity variants, cheapest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Simple, Self::Moderate, Self::Complex]
    }

    /// Returns the complexity as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }

    /// Parses a complexity from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered model tiers, cheapest first.
///
/// `Lookup` sits between the conversational tiers and the deep reasoning
/// tiers: it is the grounded, externally-connected tier used for
/// time-sensitive queries regardless of their complexity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheapest tier: fast small model for greetings and simple turns.
    #[default]
    Lite,
    /// Mid tier for moderate requests.
    Standard,
    /// Grounded lookup tier with live-data access.
    Lookup,
    /// Deep reasoning tier.
    Pro,
    /// Richest tier: strongest reasoning plus multimodal input.
    Elite,
}

impl ModelTier {
    /// Returns all tiers, cheapest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Lite, Self::Standard, Self::Lookup, Self::Pro, Self::Elite]
    }

    /// Returns the cheapest tier.
    #[must_use]
    pub const fn cheapest() -> Self {
        Self::Lite
    }

    /// Returns the richest tier (deep reasoning + multimodal).
    #[must_use]
    pub const fn richest() -> Self {
        Self::Elite
    }

    /// Returns the tier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lite => "lite",
            Self::Standard => "standard",
            Self::Lookup => "lookup",
            Self::Pro => "pro",
            Self::Elite => "elite",
        }
    }

    /// Parses a tier from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lite" => Some(Self::Lite),
            "standard" => Some(Self::Standard),
            "lookup" => Some(Self::Lookup),
            "pro" => Some(Self::Pro),
            "elite" => Some(Self::Elite),
            _ => None,
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Effort level passed to the generative backend.
///
/// Ordered lowest-first and independent of [`ModelTier`]: a cheap tier can
/// be asked for high effort and vice versa.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    /// Near-zero thinking budget; single-shot completion.
    #[default]
    Minimal,
    /// Small budget for quick classification or short answers.
    Low,
    /// Default budget for most turns.
    Medium,
    /// Full budget for deep passes and authoritative classification.
    High,
}

impl EffortLevel {
    /// Returns all effort levels, lowest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Minimal, Self::Low, Self::Medium, Self::High]
    }

    /// Returns the effort level as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parses an effort level from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Returns the next effort level up, saturating at the highest.
    #[must_use]
    pub const fn escalated(self) -> Self {
        match self {
            Self::Minimal => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

impl fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Intent labels the classifier can assign to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Plain conversation; the fallback when nothing else clears the floor.
    #[default]
    Conversation,
    /// Time-sensitive external lookup (news, weather, prices, scores).
    Lookup,
    /// Code reading, writing, or debugging.
    Code,
    /// Condensing a document, article, or link.
    Summarize,
    /// Open-ended writing (stories, drafts, copy).
    Creative,
    /// Image analysis or image-centric requests.
    Image,
}

impl IntentKind {
    /// Returns all intent variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Conversation,
            Self::Lookup,
            Self::Code,
            Self::Summarize,
            Self::Creative,
            Self::Image,
        ]
    }

    /// Returns the intent as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Lookup => "lookup",
            Self::Code => "code",
            Self::Summarize => "summarize",
            Self::Creative => "creative",
            Self::Image => "image",
        }
    }

    /// Parses an intent from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conversation" => Some(Self::Conversation),
            "lookup" => Some(Self::Lookup),
            "code" => Some(Self::Code),
            "summarize" => Some(Self::Summarize),
            "creative" => Some(Self::Creative),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One intent with its accumulated confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredIntent {
    /// The detected intent.
    pub intent: IntentKind,
    /// Accumulated confidence, capped at 1.0.
    pub confidence: f32,
}

/// Classifier output for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// The complexity tier the request was judged at.
    pub complexity: Complexity,
    /// Detected intents that cleared the confidence floor, highest first.
    pub intents: Vec<ScoredIntent>,
    /// Confidence of the leading intent.
    pub confidence: f32,
}

impl Classification {
    /// Returns the leading intent, or `Conversation` when none was detected.
    #[must_use]
    pub fn primary_intent(&self) -> IntentKind {
        self.intents.first().map_or(IntentKind::Conversation, |s| s.intent)
    }

    /// Returns the accumulated confidence for a specific intent, if present.
    #[must_use]
    pub fn intent_confidence(&self, intent: IntentKind) -> Option<f32> {
        self.intents.iter().find(|s| s.intent == intent).map(|s| s.confidence)
    }
}

/// Which dispatch stage produced a capability decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionMethod {
    /// Static trigger-phrase scan.
    Keyword,
    /// Low-effort model classification call.
    LowEffortModel,
    /// High-effort escalation call, treated as authoritative.
    HighEffortModel,
}

impl DecisionMethod {
    /// Returns the method as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::LowEffortModel => "low-effort-model",
            Self::HighEffortModel => "high-effort-model",
        }
    }
}

impl fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the capability dispatch escalation.
///
/// A `capability` of `None` means "handle as plain conversation"; when a
/// model-backed stage failed, the underlying error text is kept in `error`
/// so callers can log it without treating the turn as failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// The capability chosen to handle the request, if any.
    pub capability: Option<String>,
    /// Confidence of the winning stage.
    pub confidence: f32,
    /// Which stage produced the decision.
    pub method: DecisionMethod,
    /// Error text from a failed model stage, recorded but not fatal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Dispatch {
    /// A plain-conversation dispatch with no capability.
    #[must_use]
    pub const fn conversation(method: DecisionMethod, confidence: f32) -> Self {
        Self {
            capability: None,
            confidence,
            method,
            error: None,
        }
    }
}

/// The router's decision for one request.
///
/// A value object, never persisted. `capability` and `method` are only set
/// when the capability dispatch sub-decision ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The tier that answers the user-facing (primary) pass.
    pub tier: ModelTier,
    /// The effort level for the primary pass.
    pub effort: EffortLevel,
    /// The complexity the classifier assigned.
    pub complexity: Complexity,
    /// Whether a second, richest-tier pass runs in the background.
    pub parallel_deep: bool,
    /// Capability chosen by dispatch, if the sub-decision ran and matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Confidence of the decision (dispatch confidence when it ran,
    /// classifier confidence otherwise).
    pub confidence: f32,
    /// Which dispatch stage decided, when the sub-decision ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<DecisionMethod>,
}

impl RoutingDecision {
    /// Creates a tier-only decision (no capability sub-decision).
    #[must_use]
    pub const fn for_tier(
        tier: ModelTier,
        effort: EffortLevel,
        complexity: Complexity,
        parallel_deep: bool,
        confidence: f32,
    ) -> Self {
        Self {
            tier,
            effort,
            complexity,
            parallel_deep,
            capability: None,
            confidence,
            method: None,
        }
    }

    /// Merges a capability dispatch outcome into this decision.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: &Dispatch) -> Self {
        self.capability = dispatch.capability.clone();
        self.confidence = dispatch.confidence;
        self.method = Some(dispatch.method);
        self
    }

    /// Returns the tier and effort of the background deep pass, when one
    /// should run.
    #[must_use]
    pub fn deep_pass(&self) -> Option<(ModelTier, EffortLevel)> {
        self.parallel_deep
            .then_some((ModelTier::richest(), EffortLevel::High))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_cheapest_to_richest() {
        let tiers = ModelTier::all();
        for pair in tiers.windows(2) {
            assert!(pair[0] < pair[1], "{} should order below {}", pair[0], pair[1]);
        }
        assert_eq!(ModelTier::cheapest(), ModelTier::Lite);
        assert_eq!(ModelTier::richest(), ModelTier::Elite);
    }

    #[test]
    fn test_effort_ordering() {
        assert!(EffortLevel::Minimal < EffortLevel::Low);
        assert!(EffortLevel::Low < EffortLevel::Medium);
        assert!(EffortLevel::Medium < EffortLevel::High);
    }

    #[test]
    fn test_complexity_ordering() {
        assert!(Complexity::Simple < Complexity::Moderate);
        assert!(Complexity::Moderate < Complexity::Complex);
    }

    #[test]
    fn test_enum_round_trips() {
        for tier in ModelTier::all() {
            assert_eq!(ModelTier::parse(tier.as_str()), Some(*tier));
        }
        for effort in EffortLevel::all() {
            assert_eq!(EffortLevel::parse(effort.as_str()), Some(*effort));
        }
        for complexity in Complexity::all() {
            assert_eq!(Complexity::parse(complexity.as_str()), Some(*complexity));
        }
        for intent in IntentKind::all() {
            assert_eq!(IntentKind::parse(intent.as_str()), Some(*intent));
        }
    }

    #[test]
    fn test_primary_intent_falls_back_to_conversation() {
        let classification = Classification {
            complexity: Complexity::Simple,
            intents: Vec::new(),
            confidence: 1.0,
        };
        assert_eq!(classification.primary_intent(), IntentKind::Conversation);
    }

    #[test]
    fn test_deep_pass_only_when_parallel() {
        let decision = RoutingDecision::for_tier(
            ModelTier::Lite,
            EffortLevel::Low,
            Complexity::Complex,
            true,
            1.0,
        );
        assert_eq!(decision.deep_pass(), Some((ModelTier::Elite, EffortLevel::High)));

        let decision = RoutingDecision::for_tier(
            ModelTier::Lite,
            EffortLevel::Minimal,
            Complexity::Simple,
            false,
            1.0,
        );
        assert_eq!(decision.deep_pass(), None);
    }

    #[test]
    fn test_dispatch_merge_carries_method() {
        let dispatch = Dispatch {
            capability: Some("search".to_string()),
            confidence: 0.8,
            method: DecisionMethod::Keyword,
            error: None,
        };
        let decision = RoutingDecision::for_tier(
            ModelTier::Standard,
            EffortLevel::Medium,
            Complexity::Moderate,
            false,
            0.5,
        )
        .with_dispatch(&dispatch);
        assert_eq!(decision.capability.as_deref(), Some("search"));
        assert_eq!(decision.method, Some(DecisionMethod::Keyword));
        assert!((decision.confidence - 0.8).abs() < f32::EPSILON);
    }
}
