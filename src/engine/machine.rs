//! Conversation state machine.
//!
//! Executes one inbound event against the current conversation state:
//! validate the routing decision's trigger, compute the target node,
//! execute it, honor at most one auto-chain, and flag terminal states.
//! Domain-level ambiguity (unknown trigger, dependency trouble) is
//! absorbed into fallback / service-unavailable routing; the step only
//! fails when the graph itself is unusable.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::domain::{ConversationState, OutboundMessage, TenantContext};
use crate::routing::{RoutingDecision, Trigger};

use super::node::NodeError;
use super::registry::{
    NodeRegistry, RegistryError, ResolutionVia, NODE_FALLBACK, NODE_SERVICE_UNAVAILABLE,
};
use super::services::NodeServices;

/// Auto-chains per inbound event. One, to prevent infinite loops.
const MAX_AUTO_CHAINS: usize = 1;

/// Unrecoverable engine failures (graph misconfiguration that validation
/// should have caught, or a broken service node)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Service node '{node}' failed: {source}")]
    ServiceNodeFailed { node: String, source: NodeError },
}

/// Result of one state-machine step
#[derive(Debug)]
pub struct StepResult {
    pub state: ConversationState,

    /// Replies collected across the executed node(s), in order
    pub messages: Vec<OutboundMessage>,

    /// Node names executed during this event (one, or two when a node
    /// auto-chained)
    pub executed: Vec<String>,

    /// Set when a trigger resolved to a node missing from the graph; the
    /// event was still answered through the fallback node
    pub state_conflict: bool,
}

/// The state machine: an immutable registry plus shared node services
pub struct StateMachine {
    registry: Arc<NodeRegistry>,
    services: Arc<NodeServices>,
}

impl StateMachine {
    pub fn new(registry: Arc<NodeRegistry>, services: Arc<NodeServices>) -> Self {
        Self { registry, services }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Execute one inbound event.
    #[instrument(skip(self, state, decision, tenant), fields(conversation = %state.conversation_id, trigger = %decision.trigger))]
    pub async fn step(
        &self,
        mut state: ConversationState,
        decision: &RoutingDecision,
        tenant: &TenantContext,
    ) -> Result<StepResult, EngineError> {
        let domain = tenant.domain;

        // Terminal conversations refuse further automatic transitions; a
        // new inbound event resets to the entry node per domain policy.
        if state.terminal {
            debug!("Terminal conversation, resetting to entry node");
            state.reset();
        }

        let entry = self.registry.entry(domain)?.to_string();
        let current_name = state.current_node.clone().unwrap_or(entry);

        // A persisted current node missing from the graph is a
        // configuration error: report it, recover through fallback.
        let (current_name, mut state_conflict) = match self.registry.node(domain, &current_name) {
            Some(node) => (node.name.clone(), false),
            None => {
                error!(node = %current_name, "Persisted node missing from graph");
                (NODE_FALLBACK.to_string(), true)
            }
        };
        let current = self
            .registry
            .node(domain, &current_name)
            .ok_or(RegistryError::MissingGraph {
                domain: domain.as_str(),
            })?;

        // Awaited-input decisions carry the parsed slot value; capture it
        // against the awaiting node before moving on.
        if decision.trigger == Trigger::AwaitedInput {
            if let (Some(awaited), Some(value)) = (&current.awaits, &decision.value) {
                state.set_slot(awaited.name.clone(), value.clone());
            }
        }

        let resolution = self.registry.resolve(domain, current, &decision.trigger)?;
        if resolution.via == ResolutionVia::Fallback && decision.trigger != Trigger::NoMatch {
            debug!(
                trigger = %decision.trigger,
                node = %current.name,
                "Trigger not declared for node, using fallback target"
            );
        }

        let mut messages = Vec::new();
        let mut executed = Vec::new();
        let mut target_name = resolution.target;
        let mut active_decision = decision.clone();
        let mut chains = 0usize;

        loop {
            let target = match self.registry.node(domain, &target_name) {
                Some(node) => node,
                None => {
                    // Validated graphs cannot produce this from their own
                    // tables, but a behavior may emit an undeclared
                    // next_trigger; recover through the fallback node.
                    error!(target = %target_name, "Resolved target missing from graph");
                    state_conflict = true;
                    self.registry
                        .node(domain, NODE_FALLBACK)
                        .ok_or(RegistryError::MissingGraph {
                            domain: domain.as_str(),
                        })?
                }
            };

            state.visit(&target.name);
            executed.push(target.name.clone());

            // Snapshot so a failed behavior cannot half-apply mutations
            let snapshot = state.clone();

            let outcome = match target
                .behavior
                .execute(state, &active_decision, tenant, &self.services)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Dependency failure: answer through the graph's
                    // service-unavailable node instead of failing the
                    // event. The conversation stays where it was so a
                    // later retry re-enters the flow.
                    warn!(node = %target.name, error = %err, "Node failed, routing to service-unavailable");
                    return self
                        .run_service_unavailable(snapshot, tenant, messages, executed)
                        .await;
                }
            };

            state = outcome.state;
            messages.extend(outcome.messages);

            if target.terminal {
                state.terminal = true;
            }

            match outcome.next_trigger {
                Some(next) if chains < MAX_AUTO_CHAINS && !state.terminal => {
                    chains += 1;
                    let resolution = self.registry.resolve(domain, target, &next)?;
                    debug!(from = %target.name, to = %resolution.target, trigger = %next, "Auto-chaining");
                    target_name = resolution.target;
                    active_decision = RoutingDecision::new(next, 1.0, "auto-chain");
                }
                Some(next) => {
                    warn!(trigger = %next, "Auto-chain limit reached, ignoring next_trigger");
                    break;
                }
                None => break,
            }
        }

        Ok(StepResult {
            state,
            messages,
            executed,
            state_conflict,
        })
    }

    /// Execute the graph's service-unavailable node after a dependency
    /// failure, against the pre-failure snapshot of the state.
    async fn run_service_unavailable(
        &self,
        state: ConversationState,
        tenant: &TenantContext,
        mut messages: Vec<OutboundMessage>,
        mut executed: Vec<String>,
    ) -> Result<StepResult, EngineError> {
        let domain = tenant.domain;
        let node = self
            .registry
            .node(domain, NODE_SERVICE_UNAVAILABLE)
            .ok_or(RegistryError::MissingGraph {
                domain: domain.as_str(),
            })?;

        let decision = RoutingDecision::new(Trigger::NoMatch, 1.0, "service-unavailable");

        let outcome = node
            .behavior
            .execute(state, &decision, tenant, &self.services)
            .await
            .map_err(|source| EngineError::ServiceNodeFailed {
                node: node.name.clone(),
                source,
            })?;

        executed.push(node.name.clone());
        messages.extend(outcome.messages);

        Ok(StepResult {
            state: outcome.state,
            messages,
            executed,
            state_conflict: false,
        })
    }
}
