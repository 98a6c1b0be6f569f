//! The five production matchers, in priority order.

use crate::domain::SlotValue;
use crate::engine::node::SlotKind;
use crate::nlu::{parse_amount, parse_date, ENTITY_AMOUNT, ENTITY_DATE};

use super::{MatchContext, RouteMatcher, RoutingDecision, Trigger};

/// Tenant-wide keywords override any in-progress flow. Highest priority so
/// a user can always escape.
pub struct GlobalKeywordHandler;

impl RouteMatcher for GlobalKeywordHandler {
    fn name(&self) -> &'static str {
        "global-keyword"
    }

    fn try_match(&self, cx: &MatchContext<'_>) -> Option<RoutingDecision> {
        let text = cx.text()?.to_lowercase();

        // Exact match first, then a whole-word scan so "cancel it please"
        // still escapes the flow.
        if let Some(trigger) = cx.tenant.global_keyword(&text) {
            return Some(RoutingDecision::new(
                Trigger::Keyword(trigger.to_string()),
                1.0,
                self.name(),
            ));
        }

        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if let Some(trigger) = cx.tenant.global_keyword(word) {
                return Some(RoutingDecision::new(
                    Trigger::Keyword(trigger.to_string()),
                    1.0,
                    self.name(),
                ));
            }
        }

        None
    }
}

/// High-confidence intents may override the current node's expected input
/// (topic switch mid-flow). At a node that is not awaiting a slot the bar
/// drops to the tenant's minimum confidence.
pub struct IntentOverrideHandler;

impl RouteMatcher for IntentOverrideHandler {
    fn name(&self) -> &'static str {
        "intent-override"
    }

    fn try_match(&self, cx: &MatchContext<'_>) -> Option<RoutingDecision> {
        cx.text()?;
        let top = cx.nlu.top()?;

        let awaiting = cx.node.map(|n| n.awaits.is_some()).unwrap_or(false);
        let threshold = if awaiting {
            cx.tenant.nlu.intent_override_threshold
        } else {
            cx.tenant.nlu.min_confidence
        };

        if top.confidence < threshold {
            return None;
        }

        Some(RoutingDecision::new(
            Trigger::Intent(top.intent.clone()),
            top.confidence,
            self.name(),
        ))
    }
}

/// A structured button press is unambiguous: it beats free-text matching
/// whenever present.
pub struct ButtonSelectionHandler;

impl RouteMatcher for ButtonSelectionHandler {
    fn name(&self) -> &'static str {
        "button-selection"
    }

    fn try_match(&self, cx: &MatchContext<'_>) -> Option<RoutingDecision> {
        match cx.payload {
            crate::domain::InboundPayload::Button { id, label } => {
                let mut decision =
                    RoutingDecision::new(Trigger::Button(id.clone()), 1.0, self.name());
                if let Some(label) = label {
                    decision = decision.with_value(SlotValue::Text(label.clone()));
                }
                Some(decision)
            }
            _ => None,
        }
    }
}

/// Numeric or textual selection against the current node's declared menu.
pub struct MenuOptionHandler;

impl RouteMatcher for MenuOptionHandler {
    fn name(&self) -> &'static str {
        "menu-option"
    }

    fn try_match(&self, cx: &MatchContext<'_>) -> Option<RoutingDecision> {
        let node = cx.node?;
        let text = cx.text()?;
        if node.options.is_empty() || text.is_empty() {
            return None;
        }

        let option = node.options.iter().find(|option| {
            option.key == text || option.label.eq_ignore_ascii_case(text)
        })?;

        Some(
            RoutingDecision::new(Trigger::Menu(option.key.clone()), 1.0, self.name())
                .with_value(SlotValue::Text(option.label.clone())),
        )
    }
}

/// Last resort: the current node awaits a specific slot, so interpret the
/// raw input as that slot's value.
pub struct AwaitedInputHandler;

impl RouteMatcher for AwaitedInputHandler {
    fn name(&self) -> &'static str {
        "awaited-input"
    }

    fn try_match(&self, cx: &MatchContext<'_>) -> Option<RoutingDecision> {
        let awaited = cx.node?.awaits.as_ref()?;
        let text = cx.text()?;
        if text.is_empty() {
            return None;
        }

        let value = match awaited.kind {
            SlotKind::Text => Some(SlotValue::Text(text.to_string())),
            SlotKind::Date => cx
                .nlu
                .entities
                .get(ENTITY_DATE)
                .cloned()
                .or_else(|| parse_date(text).map(SlotValue::Date)),
            SlotKind::Amount => cx
                .nlu
                .entities
                .get(ENTITY_AMOUNT)
                .cloned()
                .or_else(|| parse_amount(text).map(SlotValue::Amount)),
        }?;

        Some(RoutingDecision::new(Trigger::AwaitedInput, 0.9, self.name()).with_value(value))
    }
}
