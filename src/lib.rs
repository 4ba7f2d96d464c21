//! Circuit breaker for asynchronous operations.
//!
//! A [`CircuitBreaker`] sits between a caller and an operation that may fail
//! or hang. After `max_failures` consecutive failures it opens and rejects
//! calls outright; once the reset timeout elapses it lets a single trial call
//! through and closes again if that call succeeds. Failed trials grow the
//! reset timeout by the backoff factor, up to a maximum.

pub mod config;
pub mod observability;
pub mod registry;
pub mod resilience;

pub use config::{BreakerConfig, ConfigError, GateConfig};
pub use registry::BreakerRegistry;
pub use resilience::{BreakerError, BreakerEvent, BreakerSnapshot, BreakerState, CircuitBreaker};
