//! In-process provider implementations for the CLI simulator and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{DebtInvoice, OutboundMessage};

use super::{
    DebtLedger, InferOptions, LlmProvider, MessagingTransport, PaymentLinkProvider, ProviderError,
};

/// LLM that replays a scripted queue of responses, then keeps returning
/// the final fallback answer.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: String,
    /// Number of `infer` calls observed (for breaker tests)
    calls: Mutex<u32>,
}

impl ScriptedLlm {
    /// A provider that always answers `fallback`
    pub fn always(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: Mutex::new(0),
        }
    }

    /// A provider that replays `responses` in order, then answers `fallback`
    pub fn scripted(
        responses: Vec<Result<String, ProviderError>>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: fallback.into(),
            calls: Mutex::new(0),
        }
    }

    /// A provider whose every call times out
    pub fn always_timeout() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: String::new(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "llm"
    }

    async fn infer(&self, _prompt: &str, _options: &InferOptions) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        if self.fallback.is_empty() {
            return Err(ProviderError::Timeout("scripted timeout".into()));
        }
        Ok(self.fallback.clone())
    }
}

/// Payment provider that mints deterministic link URLs locally
pub struct StaticPaymentLinks {
    base_url: String,
}

impl StaticPaymentLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for StaticPaymentLinks {
    fn default() -> Self {
        Self::new("https://pay.invalid")
    }
}

#[async_trait]
impl PaymentLinkProvider for StaticPaymentLinks {
    fn name(&self) -> &str {
        "payment"
    }

    async fn create_link(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<String, ProviderError> {
        Ok(format!(
            "{}/{}?amount={}&currency={}",
            self.base_url, reference, amount, currency
        ))
    }
}

/// In-memory ledger keyed by invoice reference
#[derive(Default)]
pub struct StaticLedger {
    invoices: HashMap<String, DebtInvoice>,
}

impl StaticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoice(mut self, invoice: DebtInvoice) -> Self {
        self.invoices.insert(invoice.reference.clone(), invoice);
        self
    }
}

#[async_trait]
impl DebtLedger for StaticLedger {
    fn name(&self) -> &str {
        "ledger"
    }

    async fn lookup_invoice(
        &self,
        _tenant_id: &str,
        _channel_id: &str,
        reference: &str,
    ) -> Result<Option<DebtInvoice>, ProviderError> {
        Ok(self.invoices.get(reference.trim()).cloned())
    }
}

/// Transport that prints replies to stdout (CLI simulate)
#[derive(Default)]
pub struct ConsoleTransport;

#[async_trait]
impl MessagingTransport for ConsoleTransport {
    fn name(&self) -> &str {
        "transport"
    }

    async fn send(
        &self,
        channel_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), ProviderError> {
        for message in messages {
            match message {
                OutboundMessage::Text { text } => println!("[{}] {}", channel_id, text),
                OutboundMessage::Menu { text, options } => {
                    println!("[{}] {}", channel_id, text);
                    for option in options {
                        println!("[{}]   {}. {}", channel_id, option.key, option.label);
                    }
                }
                OutboundMessage::Link { text, url } => {
                    println!("[{}] {} {}", channel_id, text, url)
                }
            }
        }
        Ok(())
    }
}

/// Transport that records every send for assertions
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Vec<OutboundMessage>)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Vec<OutboundMessage>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    fn name(&self) -> &str {
        "transport"
    }

    async fn send(
        &self,
        channel_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), ProviderError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), messages.to_vec()));
        Ok(())
    }
}
