//! Timer and executor seam.
//!
//! # Responsibilities
//! - Fire a one-shot callback after a delay (Open → HalfOpen reset timer)
//! - Run fire-and-forget work off the caller's path (listener dispatch)
//!
//! # Design Decisions
//! - The breaker only depends on the `Scheduler` trait; `TokioScheduler` is the
//!   default and captures a runtime handle so callbacks may be submitted from
//!   any thread
//! - Scheduled callbacks can be cancelled through the returned `ScheduledTask`
//! - `execute` runs on the blocking pool, so a slow or blocking listener never
//!   occupies a runtime worker that callers need

use std::fmt;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules callbacks on behalf of a circuit breaker.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: Task) -> ScheduledTask;

    /// Run `task` as soon as possible without the caller waiting on it.
    ///
    /// `task` may block; it must not hold up the caller's executor.
    fn execute(&self, task: Task);
}

/// Handle to a pending one-shot callback.
pub struct ScheduledTask {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ScheduledTask {
    /// Wrap a cancellation function.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Cancel the callback if it has not fired yet. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("pending", &self.cancel.is_some())
            .finish()
    }
}

/// Scheduler backed by a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Use the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> ScheduledTask {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        let abort: AbortHandle = join.abort_handle();
        ScheduledTask::new(move || abort.abort())
    }

    fn execute(&self, task: Task) {
        // Dropping the JoinHandle detaches the task.
        self.handle.spawn_blocking(task);
    }
}
