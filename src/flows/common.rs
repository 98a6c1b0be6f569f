//! Service nodes shared by every domain graph.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{ConversationState, MenuOption, OutboundMessage, TenantContext};
use crate::engine::node::{NodeBehavior, NodeDefinition, NodeError, NodeOutcome};
use crate::engine::registry::{NODE_FALLBACK, NODE_SERVICE_UNAVAILABLE};
use crate::engine::services::NodeServices;
use crate::routing::{RoutingDecision, Trigger};

/// Node name for human handoff
pub const NODE_HANDOFF: &str = "handoff";

/// Internal trigger used by service nodes to chain back to the main menu
pub const CHAIN_MENU: &str = "menu";

/// Yes/no menu options shared by confirmation nodes
pub fn yes_no_options() -> Vec<MenuOption> {
    vec![MenuOption::new("yes", "Yes"), MenuOption::new("no", "No")]
}

/// Generic apology for unmatched input; chains straight back to the menu
/// so the user is never left without a prompt.
struct FallbackBehavior;

#[async_trait]
impl NodeBehavior for FallbackBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state)
            .say(OutboundMessage::text(
                "Sorry, I didn't quite get that.",
            ))
            .then(Trigger::Keyword(CHAIN_MENU.to_string())))
    }
}

/// Terminal handoff to a human agent
struct HandoffBehavior;

#[async_trait]
impl NodeBehavior for HandoffBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(
            "I'm connecting you with a member of our team. They'll reply here shortly.",
        )))
    }
}

/// Shown when a dependency breaker is open or retries are exhausted
struct ServiceUnavailableBehavior;

#[async_trait]
impl NodeBehavior for ServiceUnavailableBehavior {
    async fn execute(
        &self,
        state: ConversationState,
        _decision: &RoutingDecision,
        _tenant: &TenantContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::new(state).say(OutboundMessage::text(
            "We're having technical trouble right now. Please try again in a few minutes.",
        )))
    }
}

/// The `fallback` service node required by every graph
pub fn fallback_node() -> NodeDefinition {
    NodeDefinition::new(NODE_FALLBACK, NODE_FALLBACK, Arc::new(FallbackBehavior))
}

/// The terminal `handoff` node
pub fn handoff_node() -> NodeDefinition {
    NodeDefinition::new(NODE_HANDOFF, NODE_HANDOFF, Arc::new(HandoffBehavior)).terminal()
}

/// The `service_unavailable` node; any follow-up input falls back to the
/// graph entry
pub fn service_unavailable_node(entry: &str) -> NodeDefinition {
    NodeDefinition::new(
        NODE_SERVICE_UNAVAILABLE,
        entry,
        Arc::new(ServiceUnavailableBehavior),
    )
}
