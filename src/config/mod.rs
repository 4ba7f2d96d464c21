//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!
//! Per breaker:
//!     BreakerConfig (file or fluent builder)
//!     → validation.rs
//!     → BreakerSettings (owned by one CircuitBreaker)
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once a breaker is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{BreakerConfig, BreakerSettings, GateConfig, ObservabilityConfig};
pub use validation::ValidationError;
