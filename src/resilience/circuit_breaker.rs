//! Circuit breaker for protecting an asynchronous operation.
//!
//! # Responsibilities
//! - Admit, reject or gate each call based on the current state
//! - Enforce the call timeout and report the outcome to the state that admitted it
//! - Install new states with compare-and-swap and fire listeners
//!
//! # Design Decisions
//! - Per-operation circuit breaker (not global); cheap to clone, clones share state
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering a recovering operation)
//! - An outcome reported against a superseded state never mutates it

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::validation::validate_breaker;
use crate::config::{BreakerConfig, BreakerSettings, ConfigError};
use crate::observability::metrics::{self, CallOutcome};
use crate::resilience::backoff;
use crate::resilience::error::BreakerError;
use crate::resilience::listeners::{BreakerEvent, ListenerRegistry};
use crate::resilience::scheduler::{Scheduler, TokioScheduler};
use crate::resilience::state::{BreakerState, Phase, State};
use crate::resilience::timeouts::{call_with_deadline, Completion};

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub max_failures: u32,
    pub current_reset_timeout_ms: u64,
    /// Time until the next half-open trial, when Open.
    pub reopens_in_ms: Option<u64>,
}

/// A circuit breaker guarding one class of operation.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use circuit_gate::{BreakerConfig, CircuitBreaker};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BreakerConfig::new(3, Duration::from_millis(100), Duration::from_secs(1))
///     .named("inventory")
///     .with_exponential_backoff(Duration::from_secs(10));
/// let breaker = CircuitBreaker::new(config)?;
///
/// let stock = breaker
///     .invoke(|| async { Ok::<_, std::io::Error>(42) })
///     .await?;
/// # let _ = stock;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    settings: BreakerSettings,
    state: ArcSwap<State>,
    listeners: ListenerRegistry,
    scheduler: Arc<dyn Scheduler>,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Open { after_trial: bool },
    HalfOpen,
    Close,
}

impl CircuitBreaker {
    /// Create a breaker scheduled on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime; use
    /// [`CircuitBreaker::with_scheduler`] to supply one explicitly.
    pub fn new(config: BreakerConfig) -> Result<Self, ConfigError> {
        Self::with_scheduler(config, Arc::new(TokioScheduler::current()))
    }

    /// Create a breaker that uses `scheduler` for reset timers and listener dispatch.
    pub fn with_scheduler(
        config: BreakerConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, ConfigError> {
        let settings = validate_breaker(&config).map_err(ConfigError::Validation)?;
        let initial = State::closed(settings.reset_timeout);

        tracing::debug!(
            breaker = %config.name,
            max_failures = settings.max_failures,
            call_timeout_ms = settings.call_timeout.as_millis() as u64,
            reset_timeout_ms = settings.reset_timeout.as_millis() as u64,
            "Circuit breaker created"
        );
        metrics::record_state(&config.name, BreakerState::Closed);

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name,
                settings,
                state: ArcSwap::from_pointee(initial),
                listeners: ListenerRegistry::new(),
                scheduler,
            }),
        })
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns the operation's own result, [`BreakerError::CallTimeout`] if it
    /// did not finish within the call timeout, or [`BreakerError::Open`] if the
    /// call was rejected without running.
    pub async fn invoke<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let inner = &self.inner;
        let state = inner.state.load_full();

        let admitted = match &state.phase {
            Phase::Closed(_) => true,
            Phase::Open(_) => false,
            Phase::HalfOpen(half_open) => half_open.try_claim(),
        };
        if !admitted {
            inner.reject(&state);
            return Err(BreakerError::Open);
        }

        let mut guard = TrialGuard {
            state: &state,
            armed: true,
        };
        let (completion, elapsed) =
            call_with_deadline(inner.settings.call_timeout, operation()).await;
        guard.armed = false;

        match completion {
            Completion::Succeeded(value) => {
                inner.call_succeeded(&state, Some(elapsed));
                Ok(value)
            }
            Completion::Failed(error) => {
                inner.call_failed(&state, CallOutcome::Failure, Some(elapsed));
                Err(BreakerError::Operation(error))
            }
            Completion::TimedOut => {
                inner.call_failed(&state, CallOutcome::Timeout, Some(elapsed));
                Err(BreakerError::CallTimeout(inner.settings.call_timeout))
            }
        }
    }

    /// Register a callback for `event`.
    pub fn add_listener(&self, event: BreakerEvent, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.listeners.add(event, Arc::new(listener));
    }

    /// Count a success for work done outside [`CircuitBreaker::invoke`].
    ///
    /// Ignored while Open.
    pub fn record_success(&self) {
        let state = self.inner.state.load_full();
        if !matches!(state.phase, Phase::Open(_)) {
            self.inner.call_succeeded(&state, None);
        }
    }

    /// Count a failure for work done outside [`CircuitBreaker::invoke`].
    ///
    /// Ignored while Open.
    pub fn record_failure(&self) {
        let state = self.inner.state.load_full();
        if !matches!(state.phase, Phase::Open(_)) {
            self.inner.call_failed(&state, CallOutcome::Failure, None);
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> BreakerState {
        self.inner.state.load().kind()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BreakerState::Closed
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == BreakerState::HalfOpen
    }

    /// Consecutive failures counted by the current Closed state; 0 otherwise.
    pub fn failure_count(&self) -> u32 {
        self.inner.state.load().failure_count()
    }

    /// Reset timeout that will apply to the next Open excursion.
    pub fn current_reset_timeout(&self) -> Duration {
        self.inner.state.load().reset_timeout
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.inner.state.load_full();
        let reopens_in_ms = match &state.phase {
            Phase::Open(open) => Some(open.remaining().as_millis() as u64),
            _ => None,
        };

        BreakerSnapshot {
            name: self.inner.name.clone(),
            state: state.kind(),
            failure_count: state.failure_count(),
            max_failures: self.inner.settings.max_failures,
            current_reset_timeout_ms: state.reset_timeout.as_millis() as u64,
            reopens_in_ms,
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Inner {
    fn is_current(&self, state: &Arc<State>) -> bool {
        Arc::ptr_eq(&self.state.load(), state)
    }

    fn reject(&self, state: &State) {
        tracing::debug!(breaker = %self.name, state = %state.kind(), "Call rejected");
        metrics::record_call(&self.name, CallOutcome::Rejected, None);
        self.notify(BreakerEvent::CallRejected);
    }

    fn call_succeeded(self: &Arc<Self>, state: &Arc<State>, elapsed: Option<Duration>) {
        metrics::record_call(&self.name, CallOutcome::Success, elapsed);

        match &state.phase {
            Phase::Closed(closed) => {
                if self.is_current(state) {
                    closed.reset();
                }
            }
            Phase::HalfOpen(_) => {
                self.transition(state, Transition::Close);
            }
            Phase::Open(_) => {}
        }

        self.notify(BreakerEvent::CallSuccess);
    }

    fn call_failed(self: &Arc<Self>, state: &Arc<State>, outcome: CallOutcome, elapsed: Option<Duration>) {
        metrics::record_call(&self.name, outcome, elapsed);

        match &state.phase {
            Phase::Closed(closed) if self.is_current(state) => {
                let failures = closed.record_failure();
                if failures >= self.settings.max_failures {
                    self.transition(state, Transition::Open { after_trial: false });
                }
            }
            Phase::HalfOpen(_) => {
                self.transition(state, Transition::Open { after_trial: true });
            }
            Phase::Closed(_) | Phase::Open(_) => {}
        }

        // Outcome listeners observe the state this call produced.
        self.notify(match outcome {
            CallOutcome::Timeout => BreakerEvent::CallTimeout,
            _ => BreakerEvent::CallFailure,
        });
    }

    /// Replace `from` with the state `to` describes. Returns false if `from`
    /// was no longer current, in which case nothing happens.
    fn transition(self: &Arc<Self>, from: &Arc<State>, to: Transition) -> bool {
        let next = Arc::new(match to {
            Transition::Open { after_trial } => {
                let reset_timeout = if after_trial {
                    backoff::next_reset_timeout(
                        from.reset_timeout,
                        self.settings.backoff_factor,
                        self.settings.max_reset_timeout,
                    )
                } else {
                    from.reset_timeout
                };
                let reset_after =
                    backoff::apply_random_factor(reset_timeout, self.settings.random_factor);
                State::open(reset_timeout, reset_after)
            }
            Transition::HalfOpen => State::half_open(from.reset_timeout),
            Transition::Close => State::closed(self.settings.reset_timeout),
        });

        let previous = self.state.compare_and_swap(from, Arc::clone(&next));
        if !Arc::ptr_eq(&previous, from) {
            tracing::debug!(
                breaker = %self.name,
                from = %from.kind(),
                to = %next.kind(),
                current = %previous.kind(),
                "Transition already performed by another caller"
            );
            return false;
        }
        drop(previous);

        let event = match &next.phase {
            Phase::Open(open) => {
                tracing::warn!(
                    breaker = %self.name,
                    from = %from.kind(),
                    failures = from.failure_count(),
                    reset_after_ms = open.reset_after().as_millis() as u64,
                    "Circuit breaker opened"
                );
                self.schedule_half_open(&next, open.reset_after());
                BreakerEvent::Open
            }
            Phase::HalfOpen(_) => {
                tracing::info!(breaker = %self.name, "Circuit breaker half-open, awaiting trial call");
                BreakerEvent::HalfOpen
            }
            Phase::Closed(_) => {
                tracing::info!(breaker = %self.name, "Circuit breaker closed");
                BreakerEvent::Close
            }
        };

        metrics::record_transition(&self.name, next.kind());
        self.notify(event);
        true
    }

    fn schedule_half_open(self: &Arc<Self>, open_state: &Arc<State>, delay: Duration) {
        let Phase::Open(open) = &open_state.phase else {
            return;
        };

        let breaker: Weak<Inner> = Arc::downgrade(self);
        let expected = Arc::clone(open_state);
        let task = self.scheduler.schedule_once(
            delay,
            Box::new(move || {
                if let Some(inner) = breaker.upgrade() {
                    inner.transition(&expected, Transition::HalfOpen);
                }
            }),
        );
        open.attach_timer(task);
    }

    fn notify(&self, event: BreakerEvent) {
        self.listeners.notify(&self.name, event, self.scheduler.as_ref());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Phase::Open(open) = &self.state.load().phase {
            open.cancel_timer();
        }
    }
}

/// Releases the half-open permit if the caller abandons the trial call.
struct TrialGuard<'a> {
    state: &'a State,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Phase::HalfOpen(half_open) = &self.state.phase {
            half_open.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::scheduler::{ScheduledTask, Task};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn config() -> BreakerConfig {
        BreakerConfig::new(3, Duration::from_millis(100), Duration::from_secs(1))
            .named("test")
            .with_exponential_backoff(Duration::from_secs(10))
    }

    async fn fail(breaker: &CircuitBreaker) -> BreakerError<&'static str> {
        breaker
            .invoke(|| async { Err::<(), _>("boom") })
            .await
            .unwrap_err()
    }

    #[tokio::test(start_paused = true)]
    async fn test_successes_keep_breaker_closed() {
        let breaker = CircuitBreaker::new(config()).unwrap();

        for i in 0..10 {
            let value = breaker.invoke(|| async move { Ok::<_, ()>(i) }).await.unwrap();
            assert_eq!(value, i);
            assert_eq!(breaker.failure_count(), 0);
        }
        assert!(breaker.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config()).unwrap();

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.failure_count(), 2);

        breaker.invoke(|| async { Ok::<_, ()>(()) }).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);

        fail(&breaker).await;
        fail(&breaker).await;
        assert!(breaker.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_max_failures() {
        let breaker = CircuitBreaker::new(config()).unwrap();

        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, BreakerError::Operation("boom")));
        }
        assert!(breaker.is_open());

        let calls = AtomicUsize::new(0);
        let err = breaker
            .invoke(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(config()).unwrap();

        let err = breaker
            .invoke(|| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok::<_, ()>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_timer_moves_to_half_open() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(breaker.is_open());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(breaker.is_half_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_backs_off() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.current_reset_timeout(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        fail(&breaker).await;
        assert!(breaker.is_open());
        assert_eq!(breaker.current_reset_timeout(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2100)).await;
        fail(&breaker).await;
        assert_eq!(breaker.current_reset_timeout(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_trial_resets_backoff() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        fail(&breaker).await;
        assert_eq!(breaker.current_reset_timeout(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2100)).await;
        breaker.invoke(|| async { Ok::<_, ()>(()) }).await.unwrap();

        assert!(breaker.is_closed());
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.current_reset_timeout(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcome_does_not_touch_new_state() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        let stale = breaker.inner.state.load_full();

        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert!(breaker.is_open());

        // A call admitted by the old Closed state finishes late.
        breaker.inner.call_failed(&stale, CallOutcome::Failure, None);
        assert!(!breaker.inner.transition(&stale, Transition::Open { after_trial: false }));
        assert!(breaker.is_open());
        assert_eq!(breaker.current_reset_timeout(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_releases_permit() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(breaker.is_half_open());

        let abandoned = breaker.invoke(|| async {
            std::future::pending::<()>().await;
            Ok::<_, ()>(())
        });
        let _ = tokio::time::timeout(Duration::from_millis(10), abandoned).await;

        assert!(breaker.is_half_open());
        breaker.invoke(|| async { Ok::<_, ()>(()) }).await.unwrap();
        assert!(breaker.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reporting() {
        let breaker = CircuitBreaker::new(config()).unwrap();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 2);
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        fail(&breaker).await;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.name, "test");
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.current_reset_timeout_ms, 1000);
        assert!(snapshot.reopens_in_ms.is_none());

        fail(&breaker).await;
        fail(&breaker).await;
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Open);
        assert_eq!(snapshot.reopens_in_ms, Some(1000));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let err = CircuitBreaker::new(BreakerConfig {
            max_failures: 0,
            ..config()
        })
        .unwrap_err();
        assert_eq!(err.validation_errors().len(), 1);
    }

    #[tokio::test]
    async fn test_sub_millisecond_call_timeout() {
        let config = BreakerConfig::new(3, Duration::from_micros(500), Duration::from_secs(1));
        let breaker = CircuitBreaker::new(config).unwrap();
        assert_eq!(breaker.settings().call_timeout, Duration::from_micros(500));

        let config = BreakerConfig::new(3, Duration::from_micros(1900), Duration::from_secs(1));
        let breaker = CircuitBreaker::new(config).unwrap();
        assert_eq!(breaker.settings().call_timeout, Duration::from_micros(1900));
    }

    /// Runs listeners inline so a test can see the state they observe.
    struct InlineListeners(TokioScheduler);

    impl Scheduler for InlineListeners {
        fn schedule_once(&self, delay: Duration, task: Task) -> ScheduledTask {
            self.0.schedule_once(delay, task)
        }

        fn execute(&self, task: Task) {
            task();
        }
    }

    fn record_states(breaker: &CircuitBreaker, event: BreakerEvent) -> Arc<Mutex<Vec<BreakerState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::downgrade(&breaker.inner);
        let s = seen.clone();
        breaker.add_listener(event, move || {
            if let Some(inner) = inner.upgrade() {
                s.lock().unwrap().push(inner.state.load().kind());
            }
        });
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_listeners_see_installed_state() {
        let scheduler = Arc::new(InlineListeners(TokioScheduler::current()));
        let breaker = CircuitBreaker::with_scheduler(config(), scheduler).unwrap();
        let failures = record_states(&breaker, BreakerEvent::CallFailure);
        let successes = record_states(&breaker, BreakerEvent::CallSuccess);

        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        breaker.invoke(|| async { Ok::<_, ()>(()) }).await.unwrap();

        for _ in 0..3 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        fail(&breaker).await;

        let (closed, open) = (BreakerState::Closed, BreakerState::Open);
        assert_eq!(*failures.lock().unwrap(), vec![closed, closed, open, closed, closed, open, open]);
        assert_eq!(*successes.lock().unwrap(), vec![closed]);
    }

    #[tokio::test]
    async fn test_blocking_listener_does_not_delay_callers() {
        let breaker = CircuitBreaker::new(config()).unwrap();
        breaker.add_listener(BreakerEvent::CallSuccess, || {
            std::thread::sleep(Duration::from_millis(500));
        });

        breaker.invoke(|| async { Ok::<_, ()>(()) }).await.unwrap();

        let started = std::time::Instant::now();
        let result = breaker
            .invoke(|| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, ()>(())
            })
            .await;

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
