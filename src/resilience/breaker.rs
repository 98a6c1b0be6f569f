//! Per-dependency circuit breaker.
//!
//! State machine: closed (failures counted in a sliding window) -> open
//! (fail fast, no dependency call) once the window count reaches the
//! threshold -> half-open after the cool-down (one trial call admitted) ->
//! closed on trial success, back to open on trial failure.
//!
//! Transitions are count-based. One `Mutex` guards the whole state so the
//! breaker is safe for concurrent callers against the same dependency key.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Breaker tuning for one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within the window that trip the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Cool-down before a half-open trial is admitted, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    60
}
fn default_cooldown_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BreakerConfig {
    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Admission handed out by [`CircuitBreaker::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPermit {
    /// True when this is the single half-open trial call; the caller must
    /// not retry a failed trial
    pub trial: bool,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    /// Failure timestamps inside the sliding window
    failures: VecDeque<Instant>,
    /// When the breaker last moved to open
    opened_at: Option<Instant>,
    /// A half-open trial is currently in flight
    trial_in_flight: bool,
}

/// Circuit breaker for a single dependency key
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state (open breakers past their cool-down report half-open)
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().expect("breaker poisoned");
        self.roll_state(&mut inner);
        inner.state
    }

    /// Ask to make a call. `None` means fail fast: the dependency must not
    /// be invoked.
    pub fn try_acquire(&self) -> Option<CallPermit> {
        let mut inner = self.inner.lock().expect("breaker poisoned");
        self.roll_state(&mut inner);

        match inner.state {
            BreakerState::Closed => Some(CallPermit { trial: false }),
            BreakerState::Open => None,
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                Some(CallPermit { trial: true })
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self, permit: CallPermit) {
        let mut inner = self.inner.lock().expect("breaker poisoned");

        if permit.trial {
            inner.trial_in_flight = false;
        }
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.failures.clear();
            inner.opened_at = None;
        }
    }

    /// Record a failed call; may trip the breaker
    pub fn record_failure(&self, permit: CallPermit) {
        let mut inner = self.inner.lock().expect("breaker poisoned");
        let now = Instant::now();

        if permit.trial {
            inner.trial_in_flight = false;
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
            return;
        }

        inner.failures.push_back(now);
        self.prune_window(&mut inner, now);

        if inner.state == BreakerState::Closed
            && inner.failures.len() as u32 >= self.config.failure_threshold
        {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }

    /// Open -> half-open once the cool-down has elapsed
    fn roll_state(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            let elapsed = inner
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.config.cooldown() {
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = false;
            }
        }
    }

    fn prune_window(&self, inner: &mut BreakerInner, now: Instant) {
        let window = self.config.window();
        while let Some(oldest) = inner.failures.front() {
            if now.duration_since(*oldest) > window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }
}
