//! Inbound webhook events and outbound replies.
//!
//! The wire format of the messaging platform is decoded by an adapter
//! outside this crate; an `InboundEvent` is already-parsed input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single inbound delivery from the messaging platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Raw tenant key as sent by the platform adapter
    pub tenant_key: String,

    /// Channel-scoped user identifier (e.g. a phone number)
    pub channel_id: String,

    /// External message id assigned by the platform; dedup key together
    /// with the tenant id
    pub message_id: String,

    /// Parsed payload
    pub payload: InboundPayload,

    /// Platform timestamp of the message
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Build a text event with the current timestamp
    pub fn text(
        tenant_key: impl Into<String>,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tenant_key: tenant_key.into(),
            channel_id: channel_id.into(),
            message_id: message_id.into(),
            payload: InboundPayload::Text { text: text.into() },
            timestamp: Utc::now(),
        }
    }

    /// Build a button-press event with the current timestamp
    pub fn button(
        tenant_key: impl Into<String>,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        button_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_key: tenant_key.into(),
            channel_id: channel_id.into(),
            message_id: message_id.into(),
            payload: InboundPayload::Button {
                id: button_id.into(),
                label: None,
            },
            timestamp: Utc::now(),
        }
    }

    /// Free text of the payload, if any
    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            InboundPayload::Text { text } => Some(text),
            InboundPayload::Button { .. } => None,
        }
    }
}

/// Parsed inbound payload.
///
/// A structured button press is unambiguous and takes routing precedence
/// over free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InboundPayload {
    /// Free-text message
    Text { text: String },

    /// Structured UI payload (interactive button reply)
    Button { id: String, label: Option<String> },
}

/// One entry of a menu presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// Selection key the user replies with ("1", "2", ...)
    pub key: String,

    /// Human-readable label ("Book", "Cancel", ...)
    pub label: String,
}

impl MenuOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Outbound reply destined for the event's channel.
///
/// Replies are an ordered sequence; the transport adapter delivers them
/// in order and owns delivery confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutboundMessage {
    /// Plain text reply
    Text { text: String },

    /// Text with a numbered menu of options
    Menu {
        text: String,
        options: Vec<MenuOption>,
    },

    /// Text carrying a URL (e.g. a payment link)
    Link { text: String, url: String },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn menu(text: impl Into<String>, options: Vec<MenuOption>) -> Self {
        Self::Menu {
            text: text.into(),
            options,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Link {
            text: text.into(),
            url: url.into(),
        }
    }
}
