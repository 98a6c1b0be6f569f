//! Per-domain intent rule tables.
//!
//! Rules are declared in a fixed order; candidate ranking breaks confidence
//! ties by declaration order, so the tables double as a priority list.

use regex::Regex;

use crate::domain::Domain;

// Medical intents
pub const INTENT_BOOK: &str = "book_appointment";
pub const INTENT_RESCHEDULE: &str = "reschedule_appointment";
pub const INTENT_CANCEL: &str = "cancel_appointment";

// Pharmacy intents
pub const INTENT_PAY: &str = "pay_debt";
pub const INTENT_INVOICE: &str = "invoice_query";

// Shared
pub const INTENT_AGENT: &str = "talk_to_agent";

/// One weighted pattern inside a rule
pub struct IntentPattern {
    pub regex: Regex,
    pub weight: f32,
}

/// A rule mapping text patterns to one intent label
pub struct IntentRule {
    pub intent: &'static str,
    pub patterns: Vec<IntentPattern>,
}

impl IntentRule {
    fn new(intent: &'static str, patterns: &[(&str, f32)]) -> Self {
        Self {
            intent,
            patterns: patterns
                .iter()
                .map(|(pattern, weight)| IntentPattern {
                    regex: Regex::new(&format!("(?i){}", pattern)).expect("intent pattern"),
                    weight: *weight,
                })
                .collect(),
        }
    }

    /// Highest weight among matching patterns, if any
    pub fn score(&self, text: &str) -> Option<f32> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.weight)
            .fold(None, |best, w| Some(best.map_or(w, |b: f32| b.max(w))))
    }
}

/// Rule table for one domain, in declaration order
pub fn rules_for(domain: Domain) -> Vec<IntentRule> {
    match domain {
        Domain::Medical => vec![
            IntentRule::new(
                INTENT_BOOK,
                &[
                    (r"\bbook\b.*\bappointment\b", 0.95),
                    (r"\b(book|schedule)\b", 0.7),
                    (r"\bappointment\b", 0.6),
                ],
            ),
            IntentRule::new(
                INTENT_RESCHEDULE,
                &[
                    (r"\bresched", 0.9),
                    (r"\b(move|change)\b.*\bappointment\b", 0.85),
                ],
            ),
            IntentRule::new(
                INTENT_CANCEL,
                &[
                    (r"\bcancel\b.*\bappointment\b", 0.95),
                    (r"\bcancel\b", 0.6),
                ],
            ),
            IntentRule::new(INTENT_AGENT, &[(r"\b(agent|human|someone)\b", 0.8)]),
        ],
        Domain::Pharmacy => vec![
            IntentRule::new(
                INTENT_PAY,
                &[
                    (r"\bpay\b.*\b(debt|balance|invoice|bill)\b", 0.95),
                    (r"\bpay(ment)?\b", 0.7),
                ],
            ),
            IntentRule::new(
                INTENT_INVOICE,
                &[
                    (r"how much.*\bowe\b", 0.95),
                    (r"\b(balance|invoice|debt|bill|owe)\b", 0.7),
                ],
            ),
            IntentRule::new(INTENT_AGENT, &[(r"\b(agent|human|someone)\b", 0.8)]),
        ],
    }
}

/// Intent labels a domain recognizes (used to validate LLM answers)
pub fn known_intents(domain: Domain) -> Vec<&'static str> {
    rules_for(domain).iter().map(|r| r.intent).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_phrase_outranks_weak_keyword() {
        let rules = rules_for(Domain::Medical);
        let book = rules.iter().find(|r| r.intent == INTENT_BOOK).unwrap();

        assert_eq!(book.score("I want to book an appointment"), Some(0.95));
        assert_eq!(book.score("can I book something"), Some(0.7));
        assert_eq!(book.score("hello there"), None);
    }

    #[test]
    fn test_case_insensitive() {
        let rules = rules_for(Domain::Pharmacy);
        let pay = rules.iter().find(|r| r.intent == INTENT_PAY).unwrap();

        assert!(pay.score("PAY MY BALANCE").is_some());
    }

    #[test]
    fn test_known_intents_per_domain() {
        assert!(known_intents(Domain::Medical).contains(&INTENT_BOOK));
        assert!(!known_intents(Domain::Medical).contains(&INTENT_PAY));
        assert!(known_intents(Domain::Pharmacy).contains(&INTENT_PAY));
    }
}
