//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller:
//!     → circuit_breaker.rs (load current state, admit / reject / gate)
//!     → timeouts.rs (run the operation under the call deadline)
//!     → state.rs (record outcome, request transition)
//!     → circuit_breaker.rs (CAS the new state in, schedule reset timer)
//!     → listeners.rs (fire-and-forget notification)
//!
//! Open state entry:
//!     backoff.rs (grow reset timeout, apply random factor)
//!     → scheduler.rs (one-shot timer)
//!     → timer fires → transition Open → HalfOpen
//! ```
//!
//! # Design Decisions
//! - The current state is an `Arc` behind an `ArcSwap`; every transition
//!   installs a fresh state with compare-and-swap, so `invoke` never takes a lock
//! - A losing CAS is a no-op: the winner already performed the same transition
//! - Listener panics are caught and logged, never surfaced to callers
//! - Timeouts and rejections are distinct error kinds

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod listeners;
pub mod scheduler;
pub mod state;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker};
pub use error::BreakerError;
pub use listeners::{BreakerEvent, ListenerRegistry};
pub use scheduler::{ScheduledTask, Scheduler, TokioScheduler};
pub use state::BreakerState;
