//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers produce:
//!     → tracing events (transitions, rejections, listener panics)
//!     → metrics.rs (call outcomes, latencies, transitions, state gauge)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing a subscriber or recorder is the
//!   binary's job
//! - Metrics are cheap (no-op until a recorder is installed)

pub mod logging;
pub mod metrics;
