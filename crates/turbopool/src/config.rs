//! Pool configuration utilities.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

const DEFAULT_CORE_SIZE: usize = 10;
const DEFAULT_MAX_SIZE: usize = 10;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(20);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Pool sizing and eviction configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Floor of connections maintained while the pool is open
    pub core_size: usize,

    /// Hard ceiling on concurrent connections
    pub max_size: usize,

    /// Grace period before an above-floor idle connection is evicted.
    /// Zero disables eviction entirely.
    pub keep_alive: Duration,

    /// Sweeper period override; defaults to a third of `keep_alive`
    pub sweep_interval: Option<Duration>,
}

impl PoolConfig {
    /// How often the eviction sweeper runs, or `None` when eviction is disabled.
    #[must_use]
    pub fn effective_sweep_interval(&self) -> Option<Duration> {
        if self.keep_alive.is_zero() {
            return None;
        }
        let interval = self.sweep_interval.unwrap_or(self.keep_alive / 3);
        Some(interval.max(MIN_SWEEP_INTERVAL))
    }

    /// Check the sizing bounds.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::Configuration(
                "Max size must be greater than 0".to_string(),
            ));
        }
        if self.core_size > self.max_size {
            return Err(PoolError::Configuration(format!(
                "Core size {} exceeds max size {}",
                self.core_size, self.max_size
            )));
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(PoolError::Configuration(
                "Sweep interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Presets::cached()
    }
}

/// Builder for pool configurations
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    core_size: usize,
    max_size: usize,
    keep_alive: Duration,
    sweep_interval: Option<Duration>,
}

impl PoolConfigBuilder {
    /// Create a new config builder
    #[must_use]
    pub const fn new() -> Self {
        Self {
            core_size: DEFAULT_CORE_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            keep_alive: DEFAULT_KEEP_ALIVE,
            sweep_interval: None,
        }
    }

    /// Set the connection floor
    #[must_use]
    pub const fn core_size(mut self, size: usize) -> Self {
        self.core_size = size;
        self
    }

    /// Set the connection ceiling
    #[must_use]
    pub const fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the idle grace period (zero disables eviction)
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Override how often the eviction sweeper runs
    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Build the configuration
    pub fn build(self) -> PoolResult<PoolConfig> {
        let config = PoolConfig {
            core_size: self.core_size,
            max_size: self.max_size,
            keep_alive: self.keep_alive,
            sweep_interval: self.sweep_interval,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Predefined pool configurations
#[derive(Debug)]
pub struct Presets;

impl Presets {
    /// A single connection that is never evicted
    #[must_use]
    pub const fn single() -> PoolConfig {
        PoolConfig {
            core_size: 1,
            max_size: 1,
            keep_alive: Duration::ZERO,
            sweep_interval: None,
        }
    }

    /// Default sized pool with idle eviction
    #[must_use]
    pub const fn cached() -> PoolConfig {
        PoolConfig {
            core_size: DEFAULT_CORE_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            keep_alive: DEFAULT_KEEP_ALIVE,
            sweep_interval: None,
        }
    }

    /// Exactly `size` connections
    #[must_use]
    pub const fn fixed(size: usize) -> PoolConfig {
        PoolConfig {
            core_size: size,
            max_size: size,
            keep_alive: DEFAULT_KEEP_ALIVE,
            sweep_interval: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = PoolConfigBuilder::new()
            .core_size(2)
            .max_size(5)
            .keep_alive(Duration::from_secs(9))
            .build()
            .unwrap();

        assert_eq!(config.core_size, 2);
        assert_eq!(config.max_size, 5);
        assert_eq!(config.keep_alive, Duration::from_secs(9));
        assert_eq!(config.effective_sweep_interval(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_config_validation() {
        let result = PoolConfigBuilder::new().max_size(0).core_size(0).build();
        assert!(matches!(result, Err(PoolError::Configuration(_))));

        let result = PoolConfigBuilder::new().core_size(6).max_size(5).build();
        assert!(matches!(result, Err(PoolError::Configuration(_))));

        let result = PoolConfigBuilder::new()
            .sweep_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_sweep_interval() {
        let disabled = PoolConfigBuilder::new()
            .keep_alive(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(disabled.effective_sweep_interval(), None);

        let tiny = PoolConfigBuilder::new()
            .keep_alive(Duration::from_nanos(2))
            .build()
            .unwrap();
        assert_eq!(tiny.effective_sweep_interval(), Some(MIN_SWEEP_INTERVAL));

        let overridden = PoolConfigBuilder::new()
            .sweep_interval(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(
            overridden.effective_sweep_interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_presets() {
        let single = Presets::single();
        assert_eq!((single.core_size, single.max_size), (1, 1));
        assert_eq!(single.effective_sweep_interval(), None);

        let fixed = Presets::fixed(4);
        assert_eq!((fixed.core_size, fixed.max_size), (4, 4));
        assert!(fixed.validate().is_ok());

        assert_eq!(PoolConfig::default(), Presets::cached());
    }

    #[test]
    fn test_config_serialization() {
        let config = Presets::fixed(3);
        let json = serde_json::to_string(&config).unwrap();
        let back: PoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
