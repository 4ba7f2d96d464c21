//! Circuit breaker states.
//!
//! # States
//! - Closed: normal operation, every call passes through
//! - Open: operation assumed down, calls fail fast
//! - Half-Open: a single trial call probes for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= max_failures
//! Open → Half-Open: reset timer fires
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails or times out (reset timeout backs off)
//! ```
//!
//! # Design Decisions
//! - A state value is created for every transition and never reused; identity
//!   (`Arc::ptr_eq`) is what the transition CAS compares
//! - Each variant carries only what it needs: the failure counter, the reset
//!   timer handle, or the trial permit
//! - Closed may count past `max_failures` under concurrent failures; the
//!   transition itself still happens once

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use serde::Serialize;

use crate::resilience::scheduler::ScheduledTask;

/// Public view of which state a breaker is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Value exported on the `breaker_state` gauge.
    pub fn gauge_value(self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Consecutive failure counting.
#[derive(Debug, Default)]
pub(crate) struct Closed {
    failures: AtomicU32,
}

impl Closed {
    pub(crate) fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Increment and return the post-increment count.
    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    pub(crate) fn reset(&self) {
        self.failures.store(0, Ordering::Release);
    }
}

/// Rejects everything until the reset timer fires.
#[derive(Debug)]
pub(crate) struct Open {
    entered_at: Instant,
    /// Delay actually handed to the scheduler (jitter included).
    reset_after: Duration,
    timer: Mutex<Option<ScheduledTask>>,
}

impl Open {
    pub(crate) fn new(reset_after: Duration) -> Self {
        Self {
            entered_at: Instant::now(),
            reset_after,
            timer: Mutex::new(None),
        }
    }

    pub(crate) fn reset_after(&self) -> Duration {
        self.reset_after
    }

    /// Time left before the reset timer is due.
    pub(crate) fn remaining(&self) -> Duration {
        self.reset_after.saturating_sub(self.entered_at.elapsed())
    }

    pub(crate) fn attach_timer(&self, task: ScheduledTask) {
        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    pub(crate) fn cancel_timer(&self) {
        let task = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            task.cancel();
        }
    }
}

/// Admits exactly one trial call.
#[derive(Debug)]
pub(crate) struct HalfOpen {
    permit: AtomicBool,
}

impl HalfOpen {
    pub(crate) fn new() -> Self {
        Self {
            permit: AtomicBool::new(true),
        }
    }

    /// Claim the trial permit. Only the first caller gets `true`.
    pub(crate) fn try_claim(&self) -> bool {
        self.permit.swap(false, Ordering::AcqRel)
    }

    /// Give the permit back after an abandoned trial.
    pub(crate) fn release(&self) {
        self.permit.store(true, Ordering::Release);
    }
}

/// Variant-specific part of a state.
#[derive(Debug)]
pub(crate) enum Phase {
    Closed(Closed),
    Open(Open),
    HalfOpen(HalfOpen),
}

/// The active state of a breaker.
///
/// `reset_timeout` is the breaker's current reset timeout while this state is
/// installed; it only changes together with the state itself.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) phase: Phase,
    pub(crate) reset_timeout: Duration,
}

impl State {
    pub(crate) fn closed(reset_timeout: Duration) -> Self {
        Self {
            phase: Phase::Closed(Closed::default()),
            reset_timeout,
        }
    }

    pub(crate) fn open(reset_timeout: Duration, reset_after: Duration) -> Self {
        Self {
            phase: Phase::Open(Open::new(reset_after)),
            reset_timeout,
        }
    }

    pub(crate) fn half_open(reset_timeout: Duration) -> Self {
        Self {
            phase: Phase::HalfOpen(HalfOpen::new()),
            reset_timeout,
        }
    }

    pub(crate) fn kind(&self) -> BreakerState {
        match self.phase {
            Phase::Closed(_) => BreakerState::Closed,
            Phase::Open(_) => BreakerState::Open,
            Phase::HalfOpen(_) => BreakerState::HalfOpen,
        }
    }

    pub(crate) fn failure_count(&self) -> u32 {
        match &self.phase {
            Phase::Closed(closed) => closed.failure_count(),
            _ => 0,
        }
    }
}
