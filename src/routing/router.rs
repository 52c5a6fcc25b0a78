//! Model tier and effort routing.
//!
//! The router turns a classification into a concrete tier/effort choice.
//! Precedence: the one-shot override, then the dedicated lookup tier, then
//! the multimodal tier for image requests, then the complexity mapping.
//! Only the complexity mapping sets the parallel deep pass or applies the
//! adaptive keyword bias.

use crate::classify::extract_keywords;
use crate::models::{Classification, Complexity, EffortLevel, IntentKind, ModelTier, RoutingDecision};
use crate::weights::{DEFAULT_WEIGHT, WeightStore};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::instrument;

/// Mean keyword weight at or above which the effort level is raised.
pub const WEIGHT_BIAS_THRESHOLD: f32 = 2.0;

/// Tier and effort router.
#[derive(Default)]
pub struct Router {
    override_tier: Mutex<Option<(ModelTier, EffortLevel)>>,
    weights: Option<Arc<WeightStore>>,
}

impl Router {
    /// Creates a router with no adaptive weighting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the weight store used for adaptive effort biasing.
    #[must_use]
    pub fn with_weights(mut self, weights: Arc<WeightStore>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Sets a one-shot tier override, consumed by the next `route` call.
    ///
    /// A second call before the next `route` replaces the pending override.
    pub fn set_override(&self, tier: ModelTier, effort: EffortLevel) {
        let mut pending = self
            .override_tier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pending = Some((tier, effort));
    }

    /// Returns the pending override without consuming it.
    #[must_use]
    pub fn pending_override(&self) -> Option<(ModelTier, EffortLevel)> {
        *self
            .override_tier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn take_override(&self) -> Option<(ModelTier, EffortLevel)> {
        self.override_tier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Decides the tier and effort for one request.
    #[instrument(skip(self, text, classification), fields(operation = "route"))]
    pub fn route(&self, text: &str, classification: &Classification) -> RoutingDecision {
        let start = Instant::now();
        let complexity = classification.complexity;
        let confidence = classification.confidence;

        let decision = if let Some((tier, effort)) = self.take_override() {
            tracing::debug!(tier = tier.as_str(), effort = effort.as_str(), "consumed one-shot override");
            RoutingDecision::for_tier(tier, effort, complexity, false, confidence)
        } else {
            match classification.primary_intent() {
                IntentKind::Lookup => RoutingDecision::for_tier(
                    ModelTier::Lookup,
                    EffortLevel::Low,
                    complexity,
                    false,
                    confidence,
                ),
                IntentKind::Image => RoutingDecision::for_tier(
                    ModelTier::richest(),
                    EffortLevel::Medium,
                    complexity,
                    false,
                    confidence,
                ),
                _ => self.complexity_route(text, complexity, confidence),
            }
        };

        metrics::counter!(
            "routing_decisions_total",
            "tier" => decision.tier.as_str(),
            "parallel_deep" => if decision.parallel_deep { "true" } else { "false" }
        )
        .increment(1);
        metrics::histogram!("route_duration_seconds").record(start.elapsed().as_secs_f64());

        decision
    }

    /// The complexity-based mapping: cheap tiers for cheap requests, and
    /// for the top tier a cheap primary with the deep pass flagged so the
    /// user never waits on the expensive path.
    fn complexity_route(
        &self,
        text: &str,
        complexity: Complexity,
        confidence: f32,
    ) -> RoutingDecision {
        let (tier, mut effort, parallel_deep) = match complexity {
            Complexity::Simple => (ModelTier::cheapest(), EffortLevel::Minimal, false),
            Complexity::Moderate => (ModelTier::Standard, EffortLevel::Medium, false),
            Complexity::Complex => (ModelTier::cheapest(), EffortLevel::Low, true),
        };

        if self.keyword_bias(text) >= WEIGHT_BIAS_THRESHOLD {
            effort = effort.escalated();
            tracing::debug!(effort = effort.as_str(), "keyword weights raised effort");
        }

        RoutingDecision::for_tier(tier, effort, complexity, parallel_deep, confidence)
    }

    /// Mean stored weight across the request's keywords; keywords with no
    /// stored entry count at the neutral default.
    #[allow(clippy::cast_precision_loss)]
    fn keyword_bias(&self, text: &str) -> f32 {
        let Some(weights) = &self.weights else {
            return DEFAULT_WEIGHT;
        };

        let keywords = extract_keywords(text);
        if keywords.is_empty() {
            return DEFAULT_WEIGHT;
        }

        let mut total = 0.0_f32;
        for keyword in &keywords {
            match weights.weight_for(keyword) {
                Ok(Some(weight)) => total += weight,
                Ok(None) => total += DEFAULT_WEIGHT,
                Err(e) => {
                    tracing::debug!(error = %e, "weight lookup failed, skipping bias");
                    return DEFAULT_WEIGHT;
                },
            }
        }
        total / keywords.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredIntent;

    fn classification(complexity: Complexity, intent: Option<IntentKind>) -> Classification {
        let intents = intent
            .map(|intent| {
                vec![ScoredIntent {
                    intent,
                    confidence: 0.8,
                }]
            })
            .unwrap_or_default();
        Classification {
            complexity,
            intents,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_simple_request_routes_cheapest() {
        let router = Router::new();
        let decision = router.route("hi", &classification(Complexity::Simple, None));

        assert_eq!(decision.tier, ModelTier::cheapest());
        assert_eq!(decision.effort, EffortLevel::Minimal);
        assert!(!decision.parallel_deep);
        assert!(decision.deep_pass().is_none());
    }

    #[test]
    fn test_moderate_request_routes_standard() {
        let router = Router::new();
        let decision = router.route(
            "walk me through borrow checking",
            &classification(Complexity::Moderate, None),
        );

        assert_eq!(decision.tier, ModelTier::Standard);
        assert_eq!(decision.effort, EffortLevel::Medium);
        assert!(!decision.parallel_deep);
    }

    #[test]
    fn test_complex_request_keeps_cheap_primary_with_deep_pass() {
        let router = Router::new();
        let decision = router.route(
            "explain and optimize this algorithm",
            &classification(Complexity::Complex, None),
        );

        assert_eq!(decision.tier, ModelTier::cheapest());
        assert!(decision.parallel_deep);
        assert_eq!(
            decision.deep_pass(),
            Some((ModelTier::richest(), EffortLevel::High))
        );
    }

    #[test]
    fn test_lookup_intent_routes_lookup_tier_regardless_of_complexity() {
        let router = Router::new();
        let decision = router.route(
            "compare and analyze today's market prices",
            &classification(Complexity::Complex, Some(IntentKind::Lookup)),
        );

        assert_eq!(decision.tier, ModelTier::Lookup);
        assert!(!decision.parallel_deep);
    }

    #[test]
    fn test_image_intent_routes_richest_tier() {
        let router = Router::new();
        let decision = router.route(
            "caption this screenshot",
            &classification(Complexity::Simple, Some(IntentKind::Image)),
        );

        assert_eq!(decision.tier, ModelTier::richest());
        assert!(!decision.parallel_deep);
    }

    #[test]
    fn test_override_wins_once_then_clears() {
        let router = Router::new();
        router.set_override(ModelTier::Pro, EffortLevel::High);

        let first = router.route("hi", &classification(Complexity::Simple, None));
        assert_eq!(first.tier, ModelTier::Pro);
        assert_eq!(first.effort, EffortLevel::High);

        let second = router.route("hi", &classification(Complexity::Simple, None));
        assert_eq!(second.tier, ModelTier::cheapest());
        assert!(router.pending_override().is_none());
    }

    #[test]
    fn test_override_beats_lookup_and_suppresses_deep_pass() {
        let router = Router::new();
        router.set_override(ModelTier::Elite, EffortLevel::Medium);

        let decision = router.route(
            "latest scores",
            &classification(Complexity::Complex, Some(IntentKind::Lookup)),
        );

        assert_eq!(decision.tier, ModelTier::Elite);
        assert!(!decision.parallel_deep);
    }

    #[test]
    fn test_second_override_replaces_pending() {
        let router = Router::new();
        router.set_override(ModelTier::Pro, EffortLevel::High);
        router.set_override(ModelTier::Standard, EffortLevel::Low);

        let decision = router.route("hi", &classification(Complexity::Simple, None));
        assert_eq!(decision.tier, ModelTier::Standard);
        assert_eq!(decision.effort, EffortLevel::Low);
    }

    #[test]
    fn test_weighted_keywords_raise_effort() {
        let weights = Arc::new(WeightStore::in_memory().unwrap());
        weights.boost_keywords(&["rust".to_string()], 2.0).unwrap();

        let router = Router::new().with_weights(weights);
        let decision = router.route(
            "tell me about rust macros",
            &classification(Complexity::Simple, None),
        );

        assert_eq!(decision.effort, EffortLevel::Low);
        assert_eq!(decision.tier, ModelTier::cheapest());
    }

    #[test]
    fn test_unweighted_keywords_leave_effort_alone() {
        let weights = Arc::new(WeightStore::in_memory().unwrap());
        let router = Router::new().with_weights(weights);

        let decision = router.route(
            "tell me about rust macros",
            &classification(Complexity::Simple, None),
        );

        assert_eq!(decision.effort, EffortLevel::Minimal);
    }

    #[test]
    fn test_bias_does_not_apply_to_lookup_tier() {
        let weights = Arc::new(WeightStore::in_memory().unwrap());
        weights.boost_keywords(&["weather".to_string()], 4.0).unwrap();

        let router = Router::new().with_weights(weights);
        let decision = router.route(
            "weather",
            &classification(Complexity::Simple, Some(IntentKind::Lookup)),
        );

        assert_eq!(decision.tier, ModelTier::Lookup);
        assert_eq!(decision.effort, EffortLevel::Low);
    }
}
