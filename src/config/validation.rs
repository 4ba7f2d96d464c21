//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (counts and timeouts > 0, backoff >= 1)
//! - Detect duplicate breaker names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs before a breaker is constructed; an invalid breaker never exists

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::{BreakerConfig, BreakerSettings, GateConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("breaker '{breaker}': max_failures must be greater than 0")]
    MaxFailures { breaker: String },

    #[error("breaker '{breaker}': {field} must be greater than 0")]
    ZeroDuration { breaker: String, field: &'static str },

    #[error("breaker '{breaker}': backoff_factor must be a finite number >= 1, got {value}")]
    BackoffFactor { breaker: String, value: f64 },

    #[error("breaker '{breaker}': max_reset_timeout ({max:?}) is less than reset_timeout ({reset:?})")]
    MaxResetTimeout { breaker: String, reset: Duration, max: Duration },

    #[error("breaker '{breaker}': random_factor must be within [0, 1], got {value}")]
    RandomFactor { breaker: String, value: f64 },

    #[error("breaker name must not be empty")]
    EmptyName,

    #[error("duplicate breaker name '{0}'")]
    DuplicateName(String),
}

/// Validate one breaker definition and produce its settings.
pub fn validate_breaker(config: &BreakerConfig) -> Result<BreakerSettings, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let breaker = || config.name.clone();

    if config.max_failures == 0 {
        errors.push(ValidationError::MaxFailures { breaker: breaker() });
    }

    let durations = [
        ("call_timeout", Some(config.call_timeout)),
        ("reset_timeout", Some(config.reset_timeout)),
        ("max_reset_timeout", config.max_reset_timeout),
    ];
    for (field, value) in durations {
        if value.is_some_and(|d| d.is_zero()) {
            errors.push(ValidationError::ZeroDuration { breaker: breaker(), field });
        }
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        errors.push(ValidationError::BackoffFactor {
            breaker: breaker(),
            value: config.backoff_factor,
        });
    }

    if let Some(max) = config.max_reset_timeout {
        if max < config.reset_timeout {
            errors.push(ValidationError::MaxResetTimeout {
                breaker: breaker(),
                reset: config.reset_timeout,
                max,
            });
        }
    }

    if !(0.0..=1.0).contains(&config.random_factor) {
        errors.push(ValidationError::RandomFactor {
            breaker: breaker(),
            value: config.random_factor,
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(BreakerSettings {
        max_failures: config.max_failures,
        call_timeout: config.call_timeout,
        reset_timeout: config.reset_timeout,
        backoff_factor: config.backoff_factor,
        max_reset_timeout: config.reset_timeout_cap(),
        random_factor: config.random_factor,
    })
}

/// Validate a whole configuration file.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for breaker in &config.breakers {
        if breaker.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
        } else if !seen.insert(breaker.name.as_str()) {
            errors.push(ValidationError::DuplicateName(breaker.name.clone()));
        }

        if let Err(mut breaker_errors) = validate_breaker(breaker) {
            errors.append(&mut breaker_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
