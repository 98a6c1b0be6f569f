//! Circuit Breaker Integration Tests
//!
//! The breaker must open after the configured number of windowed failures,
//! fail fast without touching the dependency while open, and admit exactly
//! one trial call after the cool-down.

use std::sync::Arc;
use std::time::Duration;

use chatflow::adapters::{InferOptions, LlmProvider, ScriptedLlm};
use chatflow::resilience::{
    BreakerConfig, BreakerState, DependencyPolicy, Resilience, ResilienceError, RetryPolicy,
};

fn single_attempt_policy(threshold: u32, cooldown_ms: u64) -> DependencyPolicy {
    DependencyPolicy {
        retry: RetryPolicy::none(),
        call_timeout_ms: 1_000,
        breaker: BreakerConfig {
            failure_threshold: threshold,
            window_secs: 60,
            cooldown_ms,
        },
    }
}

#[tokio::test]
async fn test_llm_timeouts_open_breaker_and_fail_fast() {
    // Threshold 5: five consecutive timeouts trip the breaker
    let resilience = Resilience::new(single_attempt_policy(5, 60_000));
    let llm = Arc::new(ScriptedLlm::always_timeout());
    let opts = InferOptions::default();

    for _ in 0..5 {
        let result = resilience
            .call("llm", || llm.infer("classify", &opts))
            .await;
        assert!(matches!(result, Err(ResilienceError::Exhausted { .. })));
    }

    assert_eq!(resilience.breaker_state("llm"), BreakerState::Open);
    assert_eq!(llm.call_count(), 5);

    // Sixth call fails immediately as CircuitOpen without a provider attempt
    let result = resilience
        .call("llm", || llm.infer("classify", &opts))
        .await;
    assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
    assert_eq!(llm.call_count(), 5);
}

#[tokio::test]
async fn test_half_open_admits_exactly_one_trial() {
    let resilience = Resilience::new(single_attempt_policy(1, 50));
    let llm = Arc::new(ScriptedLlm::scripted(
        vec![
            Err(chatflow::adapters::ProviderError::Timeout("t".into())),
            Ok("recovered".into()),
        ],
        "recovered",
    ));
    let opts = InferOptions::default();

    // Trip the breaker
    let _ = resilience
        .call("llm", || llm.infer("x", &opts))
        .await;
    assert_eq!(resilience.breaker_state("llm"), BreakerState::Open);

    // Cool-down elapses
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(resilience.breaker_state("llm"), BreakerState::HalfOpen);

    // The trial call succeeds and closes the breaker
    let result = resilience
        .call("llm", || llm.infer("x", &opts))
        .await
        .unwrap();
    assert_eq!(result, "recovered");
    assert_eq!(resilience.breaker_state("llm"), BreakerState::Closed);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_failed_trial_reopens_without_retry() {
    let resilience = Resilience::new(DependencyPolicy {
        // Retries are configured, but a half-open trial must not burn them
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 1.0,
        },
        call_timeout_ms: 1_000,
        breaker: BreakerConfig {
            failure_threshold: 1,
            window_secs: 60,
            cooldown_ms: 50,
        },
    });
    let llm = Arc::new(ScriptedLlm::always_timeout());
    let opts = InferOptions::default();

    // Open (first call may retry internally while closed)
    let _ = resilience
        .call("llm", || llm.infer("x", &opts))
        .await;
    let after_open = llm.call_count();
    assert_eq!(resilience.breaker_state("llm"), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(60)).await;

    // Exactly one trial attempt, then open again
    let result = resilience
        .call("llm", || llm.infer("x", &opts))
        .await;
    assert!(matches!(result, Err(ResilienceError::Exhausted { .. })));
    assert_eq!(llm.call_count(), after_open + 1);
    assert_eq!(resilience.breaker_state("llm"), BreakerState::Open);
}

#[tokio::test]
async fn test_breakers_are_keyed_per_dependency() {
    let resilience = Resilience::new(single_attempt_policy(1, 60_000));
    let llm = Arc::new(ScriptedLlm::always_timeout());
    let opts = InferOptions::default();

    let _ = resilience
        .call("llm", || llm.infer("x", &opts))
        .await;
    assert_eq!(resilience.breaker_state("llm"), BreakerState::Open);

    // The payment breaker is untouched
    assert_eq!(resilience.breaker_state("payment"), BreakerState::Closed);
    let ok = resilience
        .call("payment", || async { Ok::<_, chatflow::adapters::ProviderError>(42) })
        .await
        .unwrap();
    assert_eq!(ok, 42);
}
