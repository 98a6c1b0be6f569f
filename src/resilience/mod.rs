//! Resilience wrapper for outbound dependency calls.
//!
//! Every call to an LLM, payment-link, or transport provider is funneled
//! through [`Resilience::call`]: breaker admission, per-call timeout,
//! bounded exponential-backoff retry on transient failures. Breaker state
//! is keyed per dependency (not per tenant) and shared process-wide.

pub mod breaker;
pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::ProviderError;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use retry::RetryPolicy;

/// Full policy for one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyPolicy {
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default)]
    pub breaker: BreakerConfig,
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout_ms: default_call_timeout_ms(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl DependencyPolicy {
    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Failure of a resilient call.
///
/// `CircuitOpen` is a distinct kind so the state machine can route to a
/// service-unavailable node instead of retrying indefinitely.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    #[error("Circuit open for dependency '{dependency}'")]
    CircuitOpen { dependency: String },

    #[error("Dependency '{dependency}' failed after {attempts} attempts: {source}")]
    Exhausted {
        dependency: String,
        attempts: u32,
        source: ProviderError,
    },

    #[error("Dependency '{dependency}' rejected the request: {source}")]
    Rejected {
        dependency: String,
        source: ProviderError,
    },
}

impl ResilienceError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }
}

/// Process-wide resilience layer: per-dependency policies and breakers
pub struct Resilience {
    default_policy: DependencyPolicy,
    policies: HashMap<String, DependencyPolicy>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Resilience {
    pub fn new(default_policy: DependencyPolicy) -> Self {
        Self {
            default_policy,
            policies: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Override the policy for a named dependency
    pub fn with_policy(mut self, dependency: impl Into<String>, policy: DependencyPolicy) -> Self {
        self.policies.insert(dependency.into(), policy);
        self
    }

    fn policy(&self, dependency: &str) -> &DependencyPolicy {
        self.policies.get(dependency).unwrap_or(&self.default_policy)
    }

    /// Breaker for a dependency key, created on first use
    fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().expect("breakers poisoned");
            if let Some(existing) = breakers.get(dependency) {
                return existing.clone();
            }
        }

        let mut breakers = self.breakers.write().expect("breakers poisoned");
        breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(self.policy(dependency).breaker.clone()))
            })
            .clone()
    }

    /// Observable breaker state for a dependency (monitoring, tests)
    pub fn breaker_state(&self, dependency: &str) -> BreakerState {
        self.breaker(dependency).state()
    }

    /// Run `op` against `dependency` with timeout, retry, and breaker.
    ///
    /// `op` is a factory so each retry attempt gets a fresh future.
    pub async fn call<T, F, Fut>(&self, dependency: &str, op: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let policy = self.policy(dependency).clone();
        let breaker = self.breaker(dependency);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let permit = match breaker.try_acquire() {
                Some(permit) => permit,
                None => {
                    debug!(dependency, "Circuit open, failing fast");
                    return Err(ResilienceError::CircuitOpen {
                        dependency: dependency.to_string(),
                    });
                }
            };

            let result = match tokio::time::timeout(policy.call_timeout(), op()).await {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "no response within {}ms",
                    policy.call_timeout_ms
                ))),
            };

            match result {
                Ok(value) => {
                    breaker.record_success(permit);
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    // Request-level rejection: the dependency is healthy,
                    // the call is just wrong. Does not count against the
                    // breaker and is never retried.
                    breaker.record_success(permit);
                    return Err(ResilienceError::Rejected {
                        dependency: dependency.to_string(),
                        source: err,
                    });
                }
                Err(err) => {
                    breaker.record_failure(permit);

                    // A failed half-open trial re-opens the breaker; do not
                    // burn retries against it.
                    if !permit.trial && policy.retry.should_retry(attempt) {
                        let delay = policy.retry.delay_for_attempt(attempt);
                        warn!(
                            dependency,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Dependency call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(ResilienceError::Exhausted {
                        dependency: dependency.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(DependencyPolicy::default())
    }
}
