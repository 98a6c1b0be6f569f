//! Tenant configuration resolved for each inbound event.
//!
//! A `TenantContext` is immutable per request: it is loaded fresh (or from
//! the short-lived tenant cache) at the top of the router and passed down
//! by reference. Nothing below the router mutates it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business vertical a tenant is assigned to.
///
/// Each domain has its own node graph and intent rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Medical appointment booking and rescheduling
    Medical,

    /// Pharmacy payment and debt resolution
    Pharmacy,
}

impl Domain {
    /// Stable name used in logs and transcripts
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Medical => "medical",
            Domain::Pharmacy => "pharmacy",
        }
    }
}

/// Per-tenant feature switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Consult the LLM provider when no intent rule crosses the threshold
    #[serde(default = "default_true")]
    pub llm_fallback_enabled: bool,

    /// Allow pharmacy nodes to create payment links
    #[serde(default = "default_true")]
    pub payment_links_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            llm_fallback_enabled: true,
            payment_links_enabled: true,
        }
    }
}

/// Per-tenant NLU tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluSettings {
    /// Minimum confidence for a rule-based intent candidate to count
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Confidence required for an intent to override the current node's
    /// expected input mid-flow
    #[serde(default = "default_override_threshold")]
    pub intent_override_threshold: f32,
}

fn default_min_confidence() -> f32 {
    0.5
}
fn default_override_threshold() -> f32 {
    0.75
}

impl Default for NluSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            intent_override_threshold: default_override_threshold(),
        }
    }
}

/// Resolved tenant configuration.
///
/// `global_keywords` maps a lowercase keyword to the trigger name routed
/// through the graph's global transition table (e.g. "agent" -> "agent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    /// Stable tenant identifier
    pub tenant_id: String,

    /// Which vertical's node graph serves this tenant
    pub domain: Domain,

    /// Named reference into the credential store (never inline secrets)
    #[serde(default)]
    pub credentials: Option<String>,

    #[serde(default)]
    pub flags: FeatureFlags,

    #[serde(default)]
    pub nlu: NluSettings,

    /// Tenant-wide keywords that override any in-progress flow
    #[serde(default = "default_global_keywords")]
    pub global_keywords: BTreeMap<String, String>,

    /// Disabled tenants reject all inbound traffic
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_global_keywords() -> BTreeMap<String, String> {
    [
        ("cancel".to_string(), "cancel".to_string()),
        ("agent".to_string(), "agent".to_string()),
        ("menu".to_string(), "menu".to_string()),
    ]
    .into_iter()
    .collect()
}

impl TenantContext {
    /// Minimal context for a tenant id and domain, with default settings
    pub fn new(tenant_id: impl Into<String>, domain: Domain) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            domain,
            credentials: None,
            flags: FeatureFlags::default(),
            nlu: NluSettings::default(),
            global_keywords: default_global_keywords(),
            enabled: true,
        }
    }

    /// Look up the trigger name for a global keyword, case-insensitive
    pub fn global_keyword(&self, word: &str) -> Option<&str> {
        self.global_keywords
            .get(&word.to_lowercase())
            .map(String::as_str)
    }
}

/// Tenant resolution failures.
///
/// Neither variant is transient: the caller rejects the inbound event
/// without touching conversation state and without retrying.
#[derive(Debug, Clone, Error)]
pub enum TenantError {
    #[error("Unknown tenant: {0}")]
    NotFound(String),

    #[error("Tenant is disabled: {0}")]
    Disabled(String),
}
