//! Persisted conversation state.
//!
//! `ConversationState` is owned exclusively by the state machine: it is
//! loaded at the top of an event, mutated only through node execution
//! results, and persisted before the per-conversation lock is released.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifies a conversation: one tenant + one channel user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId {
    pub tenant_id: String,
    pub channel_id: String,
}

impl ConversationId {
    pub fn new(tenant_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.channel_id)
    }
}

/// A typed slot value collected during a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum SlotValue {
    Text(String),
    Date(NaiveDate),
    Amount(Decimal),
    Flag(bool),
    Payment(PaymentSession),
    Invoice(DebtInvoice),
}

impl SlotValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SlotValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            SlotValue::Amount(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_invoice(&self) -> Option<&DebtInvoice> {
        match self {
            SlotValue::Invoice(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_payment(&self) -> Option<&PaymentSession> {
        match self {
            SlotValue::Payment(p) => Some(p),
            _ => None,
        }
    }
}

/// An outstanding pharmacy invoice, attached to the conversation as a slot.
///
/// Looked up and mutated only by pharmacy domain nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtInvoice {
    /// Invoice reference shown to the user
    pub reference: String,

    /// Outstanding balance
    pub balance: Decimal,

    /// ISO 4217 currency code
    pub currency: String,

    /// Due date, if the invoice carries one
    pub due_date: Option<NaiveDate>,
}

/// An in-progress payment, attached to the conversation as a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Invoice this payment settles
    pub invoice_reference: String,

    /// Amount the user chose to pay (<= invoice balance)
    pub amount: Decimal,

    pub currency: String,

    /// Payment link once created by the provider
    pub link_url: Option<String>,
}

/// The persisted state of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,

    /// Name of the node awaiting the next event; `None` before the first
    /// event, in which case execution starts at the domain's entry node
    pub current_node: Option<String>,

    /// Collected slot values, keyed by slot name
    #[serde(default)]
    pub slots: BTreeMap<String, SlotValue>,

    /// Ordered history of visited node names (audit/fallback)
    #[serde(default)]
    pub visited: Vec<String>,

    /// Set by terminal nodes; once set, the next inbound event resets the
    /// conversation to the entry node per the domain's policy
    #[serde(default)]
    pub terminal: bool,

    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Fresh state with no current node (entry node resolves on first step)
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            current_node: None,
            slots: BTreeMap::new(),
            visited: Vec::new(),
            terminal: false,
            updated_at: Utc::now(),
        }
    }

    /// Record arrival at a node
    pub fn visit(&mut self, node: &str) {
        self.current_node = Some(node.to_string());
        self.visited.push(node.to_string());
        self.updated_at = Utc::now();
    }

    /// Store a slot value
    pub fn set_slot(&mut self, name: impl Into<String>, value: SlotValue) {
        self.slots.insert(name.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn slot(&self, name: &str) -> Option<&SlotValue> {
        self.slots.get(name)
    }

    /// Reset to a fresh state, keeping only the conversation id.
    ///
    /// Applied when a new inbound event arrives for a terminal
    /// conversation; the discarded history survives in the transcript log.
    pub fn reset(&mut self) {
        self.current_node = None;
        self.slots.clear();
        self.visited.clear();
        self.terminal = false;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_conversation_id_display() {
        let id = ConversationId::new("acme", "5215550001");
        assert_eq!(id.to_string(), "acme:5215550001");
    }

    #[test]
    fn test_visit_tracks_history() {
        let mut state = ConversationState::new(ConversationId::new("acme", "u1"));
        state.visit("welcome");
        state.visit("book_date");

        assert_eq!(state.current_node.as_deref(), Some("book_date"));
        assert_eq!(state.visited, vec!["welcome", "book_date"]);
    }

    #[test]
    fn test_reset_clears_everything_but_id() {
        let mut state = ConversationState::new(ConversationId::new("acme", "u1"));
        state.visit("welcome");
        state.set_slot("amount", SlotValue::Amount(Decimal::new(1050, 2)));
        state.terminal = true;

        state.reset();

        assert!(state.current_node.is_none());
        assert!(state.slots.is_empty());
        assert!(state.visited.is_empty());
        assert!(!state.terminal);
        assert_eq!(state.conversation_id.tenant_id, "acme");
    }

    #[test]
    fn test_slot_value_roundtrip() {
        let invoice = SlotValue::Invoice(DebtInvoice {
            reference: "INV-100".into(),
            balance: Decimal::new(24999, 2),
            currency: "MXN".into(),
            due_date: None,
        });

        let json = serde_json::to_string(&invoice).unwrap();
        let parsed: SlotValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, invoice);
        assert_eq!(parsed.as_invoice().unwrap().reference, "INV-100");
    }
}
