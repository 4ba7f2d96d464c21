//! Named breaker registry.
//!
//! # Responsibilities
//! - Build one breaker per configured protected operation
//! - Hand out shared handles by name
//! - Provide snapshots of every breaker for reporting
//!
//! # Design Decisions
//! - Breakers are independent; the registry holds no cross-breaker state
//! - Concurrent map so lookups never contend with each other

use std::sync::Arc;
use dashmap::DashMap;

use crate::config::validation::validate_config;
use crate::config::{BreakerConfig, ConfigError, GateConfig};
use crate::resilience::{BreakerSnapshot, CircuitBreaker, Scheduler, TokioScheduler};

/// Manages the breakers of one process.
pub struct BreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
    scheduler: Arc<dyn Scheduler>,
}

impl BreakerRegistry {
    /// Create an empty registry on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(TokioScheduler::current()))
    }

    /// Create an empty registry whose breakers share `scheduler`.
    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            breakers: DashMap::new(),
            scheduler,
        }
    }

    /// Build every breaker in `config`. Fails without building any if the
    /// configuration is invalid.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let registry = Self::new();
        for breaker in &config.breakers {
            registry.get_or_insert(breaker.clone())?;
        }

        tracing::info!(count = registry.len(), "Circuit breakers registered");
        Ok(registry)
    }

    /// Look up a breaker by name.
    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    /// Return the breaker named `config.name`, creating it from `config` if absent.
    ///
    /// An existing breaker keeps its original settings.
    pub fn get_or_insert(&self, config: BreakerConfig) -> Result<CircuitBreaker, ConfigError> {
        if let Some(existing) = self.get(&config.name) {
            return Ok(existing);
        }

        let name = config.name.clone();
        let breaker = CircuitBreaker::with_scheduler(config, Arc::clone(&self.scheduler))?;
        let entry = self.breakers.entry(name).or_insert(breaker);
        Ok(entry.value().clone())
    }

    /// Names of all registered breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.breakers.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshots of all registered breakers, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|r| r.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
