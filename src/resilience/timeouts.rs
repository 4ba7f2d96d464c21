//! Call deadline enforcement.
//!
//! # Responsibilities
//! - Run a protected operation under the breaker's call timeout
//! - Classify the result as success, failure or timeout
//! - Measure how long the call took
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; on expiry the operation future is dropped,
//!   which is the only cancellation the breaker attempts
//! - The caller is released as soon as the deadline passes

use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// How a protected call ended.
#[derive(Debug)]
pub enum Completion<T, E> {
    /// The operation returned `Ok` within the deadline.
    Succeeded(T),
    /// The operation returned `Err` within the deadline.
    Failed(E),
    /// The deadline passed first.
    TimedOut,
}

/// Await `operation` for at most `deadline`.
pub async fn call_with_deadline<Fut, T, E>(
    deadline: Duration,
    operation: Fut,
) -> (Completion<T, E>, Duration)
where
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let completion = match timeout(deadline, operation).await {
        Ok(Ok(value)) => Completion::Succeeded(value),
        Ok(Err(error)) => Completion::Failed(error),
        Err(_) => Completion::TimedOut,
    };
    (completion, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_succeeds() {
        let (completion, _) =
            call_with_deadline(Duration::from_millis(100), async { Ok::<_, ()>(7) }).await;
        assert!(matches!(completion, Completion::Succeeded(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_failed() {
        let (completion, _) =
            call_with_deadline(Duration::from_millis(100), async { Err::<(), _>("boom") }).await;
        assert!(matches!(completion, Completion::Failed("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let (completion, elapsed) = call_with_deadline(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, ()>(())
        })
        .await;

        assert!(matches!(completion, Completion::TimedOut));
        assert!(elapsed < Duration::from_millis(150));
    }
}
