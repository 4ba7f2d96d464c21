//! Transition and call-outcome listeners.
//!
//! # Responsibilities
//! - Hold zero-argument callbacks per event kind
//! - Dispatch them off the caller's path once per event
//!
//! # Design Decisions
//! - Each kind is an `ArcSwap<Vec<_>>`; registration is copy-on-write so
//!   dispatch only loads a snapshot and never locks
//! - A panicking listener is caught and logged; the remaining listeners for
//!   the same event still run

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use arc_swap::ArcSwap;

use crate::resilience::scheduler::Scheduler;

/// A listener callback.
pub type Listener = Arc<dyn Fn() + Send + Sync + 'static>;

/// Events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerEvent {
    /// The breaker entered Open.
    Open,
    /// The breaker entered Closed after a successful trial.
    Close,
    /// The breaker entered HalfOpen.
    HalfOpen,
    /// A protected call succeeded.
    CallSuccess,
    /// A protected call returned an error.
    CallFailure,
    /// A protected call exceeded the call timeout.
    CallTimeout,
    /// A call was rejected without being attempted.
    CallRejected,
}

impl BreakerEvent {
    /// All event kinds.
    pub const ALL: [BreakerEvent; 7] = [
        BreakerEvent::Open,
        BreakerEvent::Close,
        BreakerEvent::HalfOpen,
        BreakerEvent::CallSuccess,
        BreakerEvent::CallFailure,
        BreakerEvent::CallTimeout,
        BreakerEvent::CallRejected,
    ];

    fn slot(self) -> usize {
        match self {
            BreakerEvent::Open => 0,
            BreakerEvent::Close => 1,
            BreakerEvent::HalfOpen => 2,
            BreakerEvent::CallSuccess => 3,
            BreakerEvent::CallFailure => 4,
            BreakerEvent::CallTimeout => 5,
            BreakerEvent::CallRejected => 6,
        }
    }

    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerEvent::Open => "open",
            BreakerEvent::Close => "close",
            BreakerEvent::HalfOpen => "half_open",
            BreakerEvent::CallSuccess => "call_success",
            BreakerEvent::CallFailure => "call_failure",
            BreakerEvent::CallTimeout => "call_timeout",
            BreakerEvent::CallRejected => "call_rejected",
        }
    }
}

impl fmt::Display for BreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind listener collections.
pub struct ListenerRegistry {
    slots: [ArcSwap<Vec<Listener>>; 7],
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Register `listener` for `event`.
    pub fn add(&self, event: BreakerEvent, listener: Listener) {
        self.slots[event.slot()].rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Number of listeners registered for `event`.
    pub fn len(&self, event: BreakerEvent) -> usize {
        self.slots[event.slot()].load().len()
    }

    /// True if no listener is registered for `event`.
    pub fn is_empty(&self, event: BreakerEvent) -> bool {
        self.len(event) == 0
    }

    /// Fire every listener for `event` on the scheduler. Returns immediately.
    pub fn notify(&self, breaker: &str, event: BreakerEvent, scheduler: &dyn Scheduler) {
        let listeners = self.slots[event.slot()].load_full();
        if listeners.is_empty() {
            return;
        }

        let breaker = breaker.to_string();
        scheduler.execute(Box::new(move || run_listeners(&breaker, event, &listeners)));
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for event in BreakerEvent::ALL {
            map.entry(&event.as_str(), &self.len(event));
        }
        map.finish()
    }
}

fn run_listeners(breaker: &str, event: BreakerEvent, listeners: &[Listener]) {
    for (index, listener) in listeners.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
            tracing::warn!(
                breaker = %breaker,
                event = %event,
                listener = index,
                "Circuit breaker listener panicked"
            );
        }
    }
}
