//! Shared services passed into node behaviors.
//!
//! Nodes receive capabilities by composition: one `NodeServices` value is
//! built at startup and handed to every `execute` call. Provider calls go
//! through the resilience layer here so individual behaviors never touch
//! retry or breaker logic.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::adapters::{DebtLedger, LlmProvider, PaymentLinkProvider};
use crate::domain::{DebtInvoice, MenuOption, OutboundMessage};
use crate::resilience::Resilience;

use super::node::NodeError;

/// Shared response-formatting helper.
///
/// Passed to nodes that need it instead of inherited; keeps user-visible
/// formatting consistent across both domains.
#[derive(Debug, Clone, Default)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    /// "Saturday, 14 March 2026"
    pub fn date(&self, date: NaiveDate) -> String {
        date.format("%A, %-d %B %Y").to_string()
    }

    /// "MXN 1,250.50" without thousands grouping: "MXN 1250.50"
    pub fn money(&self, amount: Decimal, currency: &str) -> String {
        format!("{} {:.2}", currency, amount)
    }

    /// Text followed by a numbered option list
    pub fn menu(&self, text: impl Into<String>, options: Vec<MenuOption>) -> OutboundMessage {
        OutboundMessage::menu(text, options)
    }

    /// One-line invoice summary
    pub fn invoice_summary(&self, invoice: &DebtInvoice) -> String {
        let due = invoice
            .due_date
            .map(|d| format!(", due {}", self.date(d)))
            .unwrap_or_default();
        format!(
            "Invoice {}: outstanding balance {}{}",
            invoice.reference,
            self.money(invoice.balance, &invoice.currency),
            due
        )
    }
}

/// Capability bundle injected into every node execution
pub struct NodeServices {
    pub resilience: Arc<Resilience>,
    pub formatter: ResponseFormatter,
    llm: Option<Arc<dyn LlmProvider>>,
    payment: Option<Arc<dyn PaymentLinkProvider>>,
    ledger: Option<Arc<dyn DebtLedger>>,
}

impl NodeServices {
    pub fn new(resilience: Arc<Resilience>) -> Self {
        Self {
            resilience,
            formatter: ResponseFormatter,
            llm: None,
            payment: None,
            ledger: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_payment(mut self, payment: Arc<dyn PaymentLinkProvider>) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn DebtLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.llm.as_ref()
    }

    /// Create a payment link through the resilience layer
    pub async fn payment_link(
        &self,
        amount: Decimal,
        currency: &str,
        reference: &str,
    ) -> Result<String, NodeError> {
        let payment = self
            .payment
            .as_ref()
            .ok_or(NodeError::Unconfigured("payment-link provider"))?;

        let url = self
            .resilience
            .call(payment.name(), || {
                payment.create_link(amount, currency, reference)
            })
            .await?;

        Ok(url)
    }

    /// Look up an outstanding invoice through the resilience layer
    pub async fn lookup_invoice(
        &self,
        tenant_id: &str,
        channel_id: &str,
        reference: &str,
    ) -> Result<Option<DebtInvoice>, NodeError> {
        let ledger = self
            .ledger
            .as_ref()
            .ok_or(NodeError::Unconfigured("debt ledger"))?;

        let invoice = self
            .resilience
            .call(ledger.name(), || {
                ledger.lookup_invoice(tenant_id, channel_id, reference)
            })
            .await?;

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatter_money() {
        let formatter = ResponseFormatter;
        assert_eq!(
            formatter.money(Decimal::new(125050, 2), "MXN"),
            "MXN 1250.50"
        );
        assert_eq!(formatter.money(Decimal::new(300, 0), "USD"), "USD 300.00");
    }

    #[test]
    fn test_formatter_date() {
        let formatter = ResponseFormatter;
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(formatter.date(date), "Saturday, 14 March 2026");
    }

    #[tokio::test]
    async fn test_unconfigured_payment_provider() {
        let services = NodeServices::new(Arc::new(Resilience::default()));
        let result = services
            .payment_link(Decimal::ONE, "MXN", "INV-1")
            .await;

        assert!(matches!(result, Err(NodeError::Unconfigured(_))));
    }
}
