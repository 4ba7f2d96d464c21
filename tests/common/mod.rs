//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use circuit_gate::{BreakerConfig, BreakerEvent, CircuitBreaker};

/// The breaker used throughout the lifecycle scenarios.
#[allow(dead_code)]
pub fn scenario_config() -> BreakerConfig {
    BreakerConfig::new(3, Duration::from_millis(100), Duration::from_secs(1))
        .named("scenario")
        .with_exponential_backoff(Duration::from_secs(10))
}

/// A protected operation that can be switched between healthy and failing,
/// and counts how often it actually ran.
#[derive(Clone, Default)]
pub struct FlakyService {
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FlakyService {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn call(&self) -> Result<&'static str, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err("service unavailable".to_string())
        } else {
            Ok("pong")
        }
    }

    /// Runs longer than any call timeout used in the tests.
    pub async fn slow_call(&self, delay: Duration) -> Result<&'static str, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        Ok("late pong")
    }
}

/// Counts how often each event kind fired.
#[derive(Clone)]
pub struct EventCounts {
    counts: Arc<[AtomicUsize; 7]>,
}

#[allow(dead_code)]
impl EventCounts {
    pub fn attach(breaker: &CircuitBreaker) -> Self {
        let counts: Arc<[AtomicUsize; 7]> = Arc::new(std::array::from_fn(|_| AtomicUsize::new(0)));
        for (i, event) in BreakerEvent::ALL.into_iter().enumerate() {
            let counts = counts.clone();
            breaker.add_listener(event, move || {
                counts[i].fetch_add(1, Ordering::SeqCst);
            });
        }
        Self { counts }
    }

    pub fn get(&self, event: BreakerEvent) -> usize {
        let i = BreakerEvent::ALL
            .iter()
            .position(|e| *e == event)
            .expect("known event");
        self.counts[i].load(Ordering::SeqCst)
    }
}

/// Let detached listener dispatches finish.
///
/// Listeners run on the blocking pool; a paused clock does not auto-advance
/// while this wait is in progress.
#[allow(dead_code)]
pub async fn settle() {
    tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(50)))
        .await
        .expect("settle task");
}
