//! Provider interfaces for external systems.
//!
//! Three collaborators sit behind these traits: LLM inference, payment-link
//! creation, and the outbound messaging transport. Every call to an
//! implementation goes through the resilience layer; the traits themselves
//! know nothing about retries or breakers.

pub mod llm;
pub mod mock;
pub mod payment;
pub mod token;
pub mod transport;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{DebtInvoice, OutboundMessage};

pub use llm::HttpLlmProvider;
pub use mock::{ConsoleTransport, RecordingTransport, ScriptedLlm, StaticLedger, StaticPaymentLinks};
pub use payment::HttpPaymentProvider;
pub use token::TokenCache;
pub use transport::HttpTransport;

/// Errors surfaced by provider implementations.
///
/// `Unavailable` and `Timeout` are transient and eligible for retry;
/// `Protocol` and `Rejected` are not.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out: {0}")]
    Timeout(String),

    #[error("Provider protocol error: {0}")]
    Protocol(String),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Whether the resilience layer may retry this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_) | ProviderError::Timeout(_))
    }

    /// Map a reqwest failure onto the taxonomy
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ProviderError::Unavailable(err.to_string())
        } else {
            ProviderError::Protocol(err.to_string())
        }
    }
}

/// Generation options for an inference call
#[derive(Debug, Clone)]
pub struct InferOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            max_tokens: 64,
            temperature: 0.0,
        }
    }
}

/// LLM inference backend. One interface, interchangeable implementations.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (used as the breaker dependency key)
    fn name(&self) -> &str;

    /// Run one inference and return the raw text result
    async fn infer(&self, prompt: &str, options: &InferOptions) -> Result<String, ProviderError>;
}

/// Payment-link creation backend.
#[async_trait]
pub trait PaymentLinkProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Create a hosted payment link for the given amount
    async fn create_link(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<String, ProviderError>;
}

/// Outbound messaging transport.
///
/// Delivers an ordered batch of messages to one channel. Delivery
/// confirmation beyond the HTTP response is the platform's concern.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        channel_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), ProviderError>;
}

/// Read-only view of a tenant's outstanding invoices (the tenant's
/// billing backend). Consulted only by pharmacy domain nodes.
#[async_trait]
pub trait DebtLedger: Send + Sync {
    fn name(&self) -> &str;

    /// Find an outstanding invoice by reference, scoped to the tenant and
    /// the user's channel
    async fn lookup_invoice(
        &self,
        tenant_id: &str,
        channel_id: &str,
        reference: &str,
    ) -> Result<Option<DebtInvoice>, ProviderError>;
}
