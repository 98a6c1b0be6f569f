//! Webhook deduplication.
//!
//! Upstream messaging platforms redeliver webhooks aggressively; this
//! service guarantees at most one state-machine execution per
//! (tenant id, external message id). Admission is an atomic
//! insert-if-absent under one lock, never a read-then-write sequence,
//! so concurrent duplicate deliveries cannot both win. Duplicates of an
//! in-flight original receive a `watch` receiver and can await the
//! original's outcome; records expire after a TTL sized to exceed the
//! platform's maximum retry window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::domain::OutboundMessage;

/// What one processed event produced; replayed verbatim to duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOutcome {
    pub messages: Vec<OutboundMessage>,

    /// Node the conversation landed on, for transcripts and diagnostics
    pub node: Option<String>,
}

/// Proof of first admission. The holder must end the record's life with
/// [`IdempotencyService::complete`] or
/// [`IdempotencyService::fail_recoverable`].
#[must_use = "an admitted event must be completed or failed"]
#[derive(Debug)]
pub struct AdmissionToken {
    tenant_id: String,
    message_id: String,
}

/// What a duplicate delivery observes
pub enum DuplicateOutcome {
    /// The original finished; its outcome is replayed
    Completed(EventOutcome),

    /// The original is still in flight; await the receiver for its
    /// outcome (or give up and acknowledge with a no-op)
    InFlight(watch::Receiver<Option<EventOutcome>>),
}

/// Result of an admission attempt
pub enum Admission {
    Admitted(AdmissionToken),
    Duplicate(DuplicateOutcome),
}

struct Record {
    tx: watch::Sender<Option<EventOutcome>>,
    inserted_at: Instant,
}

/// In-memory idempotency record store
pub struct IdempotencyService {
    records: Mutex<HashMap<(String, String), Record>>,
    ttl: Duration,
}

impl IdempotencyService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// First admission for a key wins; everything else is a duplicate.
    pub fn admit(&self, tenant_id: &str, message_id: &str) -> Admission {
        let mut records = self.records.lock().expect("idempotency store poisoned");

        // Expired records are purged lazily on admission
        let ttl = self.ttl;
        records.retain(|_, record| record.inserted_at.elapsed() < ttl);

        let key = (tenant_id.to_string(), message_id.to_string());
        if let Some(record) = records.get(&key) {
            let current = record.tx.borrow().clone();
            debug!(tenant_id, message_id, in_flight = current.is_none(), "Duplicate delivery");
            return Admission::Duplicate(match current {
                Some(outcome) => DuplicateOutcome::Completed(outcome),
                None => DuplicateOutcome::InFlight(record.tx.subscribe()),
            });
        }

        let (tx, _rx) = watch::channel(None);
        records.insert(
            key,
            Record {
                tx,
                inserted_at: Instant::now(),
            },
        );

        Admission::Admitted(AdmissionToken {
            tenant_id: tenant_id.to_string(),
            message_id: message_id.to_string(),
        })
    }

    /// Record the terminal outcome for an admitted event. Concurrent
    /// waiters are woken; later duplicates replay the outcome until the
    /// record expires.
    pub fn complete(&self, token: AdmissionToken, outcome: EventOutcome) {
        let records = self.records.lock().expect("idempotency store poisoned");
        if let Some(record) = records.get(&(token.tenant_id, token.message_id)) {
            let _ = record.tx.send_replace(Some(outcome));
        }
    }

    /// Release the key after a recoverable failure (deadline hit before
    /// persistence). A later redelivery is then admitted again as a
    /// legitimate retry, distinct from a duplicate.
    pub fn fail_recoverable(&self, token: AdmissionToken) {
        let mut records = self.records.lock().expect("idempotency store poisoned");
        // Dropping the record drops the sender; in-flight waiters observe
        // the closed channel as "no outcome".
        records.remove(&(token.tenant_id, token.message_id));
    }

    /// Number of live records (tests, diagnostics)
    pub fn len(&self) -> usize {
        self.records.lock().expect("idempotency store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Await an in-flight original's outcome for up to `wait`. `None` means
/// the original failed recoverably or the wait expired; the caller
/// acknowledges with a no-op.
pub async fn await_outcome(
    mut rx: watch::Receiver<Option<EventOutcome>>,
    wait: Duration,
) -> Option<EventOutcome> {
    let result = tokio::time::timeout(wait, async {
        loop {
            {
                let value = rx.borrow_and_update();
                if let Some(outcome) = value.as_ref() {
                    return Some(outcome.clone());
                }
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    })
    .await;

    result.unwrap_or(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> IdempotencyService {
        IdempotencyService::new(Duration::from_secs(60))
    }

    fn outcome(text: &str) -> EventOutcome {
        EventOutcome {
            messages: vec![OutboundMessage::text(text)],
            node: None,
        }
    }

    #[tokio::test]
    async fn test_first_admission_wins() {
        let service = service();

        let first = service.admit("acme", "msg-1");
        assert!(matches!(first, Admission::Admitted(_)));

        let second = service.admit("acme", "msg-1");
        assert!(matches!(
            second,
            Admission::Duplicate(DuplicateOutcome::InFlight(_))
        ));
    }

    #[tokio::test]
    async fn test_completed_outcome_replayed() {
        let service = service();

        let Admission::Admitted(token) = service.admit("acme", "msg-1") else {
            panic!("expected admission");
        };
        service.complete(token, outcome("hello"));

        let Admission::Duplicate(DuplicateOutcome::Completed(replayed)) =
            service.admit("acme", "msg-1")
        else {
            panic!("expected completed duplicate");
        };
        assert_eq!(replayed.messages, vec![OutboundMessage::text("hello")]);
    }

    #[tokio::test]
    async fn test_in_flight_waiter_sees_outcome() {
        let service = service();

        let Admission::Admitted(token) = service.admit("acme", "msg-1") else {
            panic!("expected admission");
        };
        let Admission::Duplicate(DuplicateOutcome::InFlight(rx)) = service.admit("acme", "msg-1")
        else {
            panic!("expected in-flight duplicate");
        };

        let waiter = tokio::spawn(await_outcome(rx, Duration::from_secs(5)));
        service.complete(token, outcome("late"));

        let observed = waiter.await.unwrap().unwrap();
        assert_eq!(observed.messages, vec![OutboundMessage::text("late")]);
    }

    #[tokio::test]
    async fn test_recoverable_failure_readmits() {
        let service = service();

        let Admission::Admitted(token) = service.admit("acme", "msg-1") else {
            panic!("expected admission");
        };
        service.fail_recoverable(token);

        // The retry is a fresh admission, not a duplicate
        assert!(matches!(
            service.admit("acme", "msg-1"),
            Admission::Admitted(_)
        ));
    }

    #[tokio::test]
    async fn test_recoverable_failure_unblocks_waiters() {
        let service = service();

        let Admission::Admitted(token) = service.admit("acme", "msg-1") else {
            panic!("expected admission");
        };
        let Admission::Duplicate(DuplicateOutcome::InFlight(rx)) = service.admit("acme", "msg-1")
        else {
            panic!("expected in-flight duplicate");
        };

        let waiter = tokio::spawn(await_outcome(rx, Duration::from_secs(5)));
        service.fail_recoverable(token);

        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_tenant_scoped() {
        let service = service();

        assert!(matches!(
            service.admit("acme", "msg-1"),
            Admission::Admitted(_)
        ));
        // Same message id, different tenant: not a duplicate
        assert!(matches!(
            service.admit("globex", "msg-1"),
            Admission::Admitted(_)
        ));
    }

    #[tokio::test]
    async fn test_expired_record_readmits() {
        let service = IdempotencyService::new(Duration::from_millis(0));

        let Admission::Admitted(token) = service.admit("acme", "msg-1") else {
            panic!("expected admission");
        };
        service.complete(token, outcome("old"));

        assert!(matches!(
            service.admit("acme", "msg-1"),
            Admission::Admitted(_)
        ));
    }
}
