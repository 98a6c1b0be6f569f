//! Domain router: the top-level entry point for inbound events.
//!
//! Per event: resolve tenant, admit through the idempotency service,
//! acquire the per-conversation lock, load state, run NLU, resolve a
//! routing decision, execute the state machine, persist, hand replies to
//! the transport, and record the outcome for duplicates. Failures before
//! admission never consume the idempotency key; a deadline hit after
//! admission releases the key for a legitimate retry.

pub mod transcript;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::MessagingTransport;
use crate::domain::{ConversationId, ConversationState, InboundEvent, TenantContext, TenantError};
use crate::engine::{EngineError, StateMachine};
use crate::idempotency::{
    await_outcome, Admission, DuplicateOutcome, EventOutcome, IdempotencyService,
};
use crate::nlu::{IntentDetector, NluResult};
use crate::resilience::Resilience;
use crate::routing::{HandlerChain, MatchContext};
use crate::store::{ConversationStore, TenantStore};

pub use transcript::{TranscriptEntry, TranscriptLogger};

/// Router tuning with documented defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Per-event processing deadline in milliseconds
    #[serde(default = "default_event_deadline_ms")]
    pub event_deadline_ms: u64,

    /// How long a duplicate waits for an in-flight original before
    /// acknowledging with a no-op, in milliseconds
    #[serde(default = "default_duplicate_wait_ms")]
    pub duplicate_wait_ms: u64,
}

fn default_event_deadline_ms() -> u64 {
    30_000
}
fn default_duplicate_wait_ms() -> u64 {
    5_000
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            event_deadline_ms: default_event_deadline_ms(),
            duplicate_wait_ms: default_duplicate_wait_ms(),
        }
    }
}

/// Failures fatal to an individual event.
///
/// Everything transient or ambiguous is absorbed earlier: unmatched input
/// becomes fallback routing, dependency trouble becomes the
/// service-unavailable node, duplicates replay the recorded outcome.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Malformed inbound event: {0}")]
    Input(String),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("Conversation store failure: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Event exceeded the processing deadline")]
    Deadline,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What the webhook adapter gets back
#[derive(Debug)]
pub struct RouterResponse {
    pub outcome: EventOutcome,

    /// True when this delivery was a duplicate and the outcome is a replay
    pub duplicate: bool,
}

/// Per-conversation mutual exclusion: conversations are processed
/// concurrently across ids, strictly serialized within one id.
/// Acquisition queues the caller; deliveries are never dropped.
#[derive(Default)]
struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    async fn acquire(&self, id: &ConversationId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("conversation locks poisoned");
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The orchestrator: everything an inbound event flows through
pub struct DomainRouter {
    tenants: Arc<dyn TenantStore>,
    conversations: Arc<dyn ConversationStore>,
    idempotency: Arc<IdempotencyService>,
    detector: IntentDetector,
    chain: HandlerChain,
    machine: StateMachine,
    transport: Option<Arc<dyn MessagingTransport>>,
    resilience: Arc<Resilience>,
    transcripts: Option<TranscriptLogger>,
    locks: ConversationLocks,
    settings: RouterSettings,
}

impl DomainRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        conversations: Arc<dyn ConversationStore>,
        idempotency: Arc<IdempotencyService>,
        detector: IntentDetector,
        machine: StateMachine,
        resilience: Arc<Resilience>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            tenants,
            conversations,
            idempotency,
            detector,
            chain: HandlerChain::standard(),
            machine,
            transport: None,
            resilience,
            transcripts: None,
            locks: ConversationLocks::default(),
            settings,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn MessagingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_transcripts(mut self, transcripts: TranscriptLogger) -> Self {
        self.transcripts = Some(transcripts);
        self
    }

    /// Process one inbound delivery.
    #[instrument(skip(self, event), fields(tenant = %event.tenant_key, message_id = %event.message_id))]
    pub async fn handle(&self, event: InboundEvent) -> Result<RouterResponse, RouterError> {
        Self::validate(&event)?;

        // Tenant resolution failures reject the event before the
        // idempotency key is consumed, so upstream may retry freely.
        let tenant = self.tenants.get_tenant(&event.tenant_key).await?;

        let token = match self.idempotency.admit(&tenant.tenant_id, &event.message_id) {
            Admission::Admitted(token) => token,
            Admission::Duplicate(DuplicateOutcome::Completed(outcome)) => {
                debug!("Replaying recorded outcome for duplicate delivery");
                return Ok(RouterResponse {
                    outcome,
                    duplicate: true,
                });
            }
            Admission::Duplicate(DuplicateOutcome::InFlight(rx)) => {
                debug!("Duplicate of an in-flight delivery, awaiting original");
                let outcome = await_outcome(
                    rx,
                    Duration::from_millis(self.settings.duplicate_wait_ms),
                )
                .await
                .unwrap_or_default();
                return Ok(RouterResponse {
                    outcome,
                    duplicate: true,
                });
            }
        };

        let conversation_id = ConversationId::new(&tenant.tenant_id, &event.channel_id);

        // Acquire-before-load, release-after-persist
        let guard = self.locks.acquire(&conversation_id).await;

        let deadline = Duration::from_millis(self.settings.event_deadline_ms);
        let processed = tokio::time::timeout(
            deadline,
            self.process(&event, &tenant, &conversation_id),
        )
        .await;

        let result = match processed {
            Ok(Ok(outcome)) => {
                self.idempotency.complete(token, outcome.clone());
                Ok(RouterResponse {
                    outcome,
                    duplicate: false,
                })
            }
            Ok(Err(err)) => {
                // Failure after admission: record a terminal outcome so a
                // partially applied effect (a payment link already
                // created) is never reprocessed under the same key.
                warn!(error = %err, "Event failed after admission, recording terminal outcome");
                self.idempotency.complete(token, EventOutcome::default());
                Err(err)
            }
            Err(_) => {
                // Deadline hit before persistence: release the key so a
                // legitimate retry is re-admitted.
                warn!("Event exceeded deadline, marking recoverable");
                self.idempotency.fail_recoverable(token);
                Err(RouterError::Deadline)
            }
        };

        drop(guard);
        result
    }

    fn validate(event: &InboundEvent) -> Result<(), RouterError> {
        if event.tenant_key.trim().is_empty() {
            return Err(RouterError::Input("empty tenant key".into()));
        }
        if event.channel_id.trim().is_empty() {
            return Err(RouterError::Input("empty channel id".into()));
        }
        if event.message_id.trim().is_empty() {
            return Err(RouterError::Input("empty message id".into()));
        }
        Ok(())
    }

    /// The post-admission pipeline: load, NLU, route, step, persist, send.
    async fn process(
        &self,
        event: &InboundEvent,
        tenant: &TenantContext,
        conversation_id: &ConversationId,
    ) -> Result<EventOutcome, RouterError> {
        let state = self
            .conversations
            .load(conversation_id)
            .await
            .map_err(RouterError::Store)?
            .unwrap_or_else(|| ConversationState::new(conversation_id.clone()));

        let nlu = match event.text_content() {
            Some(text) if !text.trim().is_empty() => self.detector.detect(text, tenant).await,
            _ => NluResult::default(),
        };

        let node = state
            .current_node
            .as_deref()
            .and_then(|name| self.machine.registry().node(tenant.domain, name));

        let decision = self.chain.resolve(&MatchContext {
            payload: &event.payload,
            nlu: &nlu,
            state: &state,
            node,
            tenant,
        });

        let step = self.machine.step(state, &decision, tenant).await?;

        self.conversations
            .save(&step.state)
            .await
            .map_err(RouterError::Store)?;

        if let Some(transcripts) = &self.transcripts {
            let entry = TranscriptEntry {
                timestamp: chrono::Utc::now(),
                conversation: conversation_id.to_string(),
                message_id: event.message_id.clone(),
                trigger: decision.trigger.key(),
                matched_by: decision.matched_by.to_string(),
                nodes: step.executed.clone(),
                replies: step.messages.len(),
                terminal: step.state.terminal,
            };
            if let Err(err) = transcripts.append(conversation_id, &entry).await {
                warn!(error = %err, "Failed to append transcript entry");
            }
        }

        let outcome = EventOutcome {
            messages: step.messages,
            node: step.state.current_node.clone(),
        };

        // Delivery happens after persistence; a transport failure is
        // reported but does not roll back the conversation.
        if let Some(transport) = &self.transport {
            if !outcome.messages.is_empty() {
                let send = self
                    .resilience
                    .call(transport.name(), || {
                        transport.send(&event.channel_id, &outcome.messages)
                    })
                    .await;
                if let Err(err) = send {
                    warn!(error = %err, "Outbound delivery failed");
                }
            }
        }

        info!(
            trigger = %decision.trigger,
            matched_by = decision.matched_by,
            nodes = ?step.executed,
            replies = outcome.messages.len(),
            "Event processed"
        );

        Ok(outcome)
    }
}
