//! NLU pipeline: entity extraction + intent detection.
//!
//! Detection is rule-based first. When no rule crosses the tenant's
//! minimum confidence and the tenant allows it, the detector consults the
//! LLM provider through the resilience layer; a dependency failure yields
//! an empty candidate list, never an event failure. Rule-based detection
//! is deterministic for identical input.

pub mod entities;
pub mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::{InferOptions, LlmProvider};
use crate::domain::{SlotValue, TenantContext};
use crate::resilience::Resilience;

pub use entities::{parse_amount, parse_date, EntityExtractor, ENTITY_AMOUNT, ENTITY_DATE, ENTITY_ORDINAL};

/// Confidence assigned to an intent produced by the LLM fallback. Above
/// the default minimum, below the default override threshold: the LLM can
/// pick a menu-level route but cannot hijack an awaited slot.
pub const LLM_FALLBACK_CONFIDENCE: f32 = 0.65;

/// A ranked intent hypothesis
#[derive(Debug, Clone)]
pub struct IntentCandidate {
    pub intent: String,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Entities extracted alongside the intent
    pub entities: BTreeMap<String, SlotValue>,
}

/// Output of the NLU pipeline for one inbound text
#[derive(Debug, Clone, Default)]
pub struct NluResult {
    pub entities: BTreeMap<String, SlotValue>,

    /// Ordered by descending confidence; ties keep rule declaration order
    pub candidates: Vec<IntentCandidate>,
}

impl NluResult {
    /// Best candidate, if any
    pub fn top(&self) -> Option<&IntentCandidate> {
        self.candidates.first()
    }
}

/// Rule-based intent detector with optional LLM fallback
pub struct IntentDetector {
    extractor: EntityExtractor,
    llm: Option<Arc<dyn LlmProvider>>,
    resilience: Arc<Resilience>,
}

impl IntentDetector {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, resilience: Arc<Resilience>) -> Self {
        Self {
            extractor: EntityExtractor::new(),
            llm,
            resilience,
        }
    }

    /// Run the full pipeline over one inbound text.
    pub async fn detect(&self, text: &str, tenant: &TenantContext) -> NluResult {
        let entities = self.extractor.extract(text, tenant.domain);

        let mut candidates: Vec<IntentCandidate> = Vec::new();
        for rule in rules::rules_for(tenant.domain) {
            if let Some(confidence) = rule.score(text) {
                candidates.push(IntentCandidate {
                    intent: rule.intent.to_string(),
                    confidence,
                    entities: entities.clone(),
                });
            }
        }
        // Stable sort keeps declaration order for equal confidence
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = candidates.first().map(|c| c.confidence).unwrap_or(0.0);
        if best >= tenant.nlu.min_confidence {
            return NluResult {
                entities,
                candidates,
            };
        }

        if !tenant.flags.llm_fallback_enabled {
            return NluResult {
                entities,
                candidates,
            };
        }

        let Some(llm) = &self.llm else {
            return NluResult {
                entities,
                candidates,
            };
        };

        debug!(
            tenant = %tenant.tenant_id,
            best_rule_confidence = best,
            "No rule crossed the threshold, consulting LLM"
        );

        match self.llm_fallback(llm.as_ref(), text, tenant).await {
            Some(candidate) => NluResult {
                entities,
                candidates: vec![candidate],
            },
            // Dependency failure or unusable answer: an empty candidate
            // list is a legitimate state the routing chain handles.
            None => NluResult {
                entities,
                candidates: Vec::new(),
            },
        }
    }

    async fn llm_fallback(
        &self,
        llm: &dyn LlmProvider,
        text: &str,
        tenant: &TenantContext,
    ) -> Option<IntentCandidate> {
        let known = rules::known_intents(tenant.domain);
        let prompt = format!(
            "Classify the user message into exactly one intent label.\n\
             Labels: {}\n\
             Answer with the label only, or \"none\" if nothing fits.\n\
             Message: {}",
            known.join(", "),
            text
        );

        let options = InferOptions::default();
        let answer = match self
            .resilience
            .call(llm.name(), || llm.infer(&prompt, &options))
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!(tenant = %tenant.tenant_id, error = %err, "LLM fallback failed");
                return None;
            }
        };

        let label = answer.trim().trim_matches('"').to_lowercase();
        if !known.contains(&label.as_str()) {
            debug!(label, "LLM answered with an unknown intent label");
            return None;
        }

        Some(IntentCandidate {
            intent: label,
            confidence: LLM_FALLBACK_CONFIDENCE,
            entities: BTreeMap::new(),
        })
    }
}
