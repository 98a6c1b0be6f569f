//! Entity extraction from free text.
//!
//! Extraction is regex-based and deterministic: dates (ISO or day-first),
//! monetary amounts, and bare menu ordinals. The same parse helpers back
//! the awaited-input routing handler so a slot parses identically whether
//! it arrives as an entity or as a direct answer.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::{Domain, SlotValue};

/// Well-known entity slot names
pub const ENTITY_DATE: &str = "date";
pub const ENTITY_AMOUNT: &str = "amount";
pub const ENTITY_ORDINAL: &str = "ordinal";

/// Parse a date in `YYYY-MM-DD` or `DD/MM/YYYY` form
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .ok()
}

/// Parse a monetary amount, tolerating a currency sigil and thousands
/// separators ("$1,250.50" -> 1250.50)
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    cleaned.parse::<Decimal>().ok()
}

/// Deterministic regex-based entity extractor
pub struct EntityExtractor {
    date_iso: Regex,
    date_dmy: Regex,
    amount: Regex,
    ordinal: Regex,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self {
            date_iso: Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("date_iso pattern"),
            date_dmy: Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{4})\b").expect("date_dmy pattern"),
            amount: Regex::new(r"\$?\s*(\d{1,3}(?:,\d{3})*(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)")
                .expect("amount pattern"),
            ordinal: Regex::new(r"^\s*(\d{1,2})\s*$").expect("ordinal pattern"),
        }
    }

    /// Extract typed entities from `text`.
    ///
    /// The domain steers which entities matter; both verticals currently
    /// share the same extractors, with amounts only surfaced for pharmacy.
    pub fn extract(&self, text: &str, domain: Domain) -> BTreeMap<String, SlotValue> {
        let mut entities = BTreeMap::new();

        // A bare ordinal is a menu answer, never a date or amount
        if let Some(caps) = self.ordinal.captures(text) {
            entities.insert(
                ENTITY_ORDINAL.to_string(),
                SlotValue::Text(caps[1].to_string()),
            );
            return entities;
        }

        let date_match = self
            .date_iso
            .captures(text)
            .or_else(|| self.date_dmy.captures(text));
        if let Some(caps) = date_match {
            if let Some(date) = parse_date(&caps[1]) {
                entities.insert(ENTITY_DATE.to_string(), SlotValue::Date(date));
            }
        }

        if domain == Domain::Pharmacy && !entities.contains_key(ENTITY_DATE) {
            if let Some(caps) = self.amount.captures(text) {
                if let Some(amount) = parse_amount(&caps[1]) {
                    entities.insert(ENTITY_AMOUNT.to_string(), SlotValue::Amount(amount));
                }
            }
        }

        entities
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}
