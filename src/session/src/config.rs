//! Session gate configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GateError, Result};

/// Upper bound accepted for `resolve_timeout_ms`
pub const MAX_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Session gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Time allowed for one role resolution before the gate degrades
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Age after which a cached role should be re-resolved
    #[serde(default = "default_max_role_age_secs")]
    pub max_role_age_secs: u64,
}

fn default_resolve_timeout_ms() -> u64 {
    3_000
}

fn default_max_role_age_secs() -> u64 {
    300
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: default_resolve_timeout_ms(),
            max_role_age_secs: default_max_role_age_secs(),
        }
    }
}

impl GateConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn max_role_age(&self) -> Duration {
        Duration::from_secs(self.max_role_age_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolve_timeout_ms == 0 {
            return Err(GateError::InvalidConfig(
                "resolve_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.resolve_timeout() > MAX_RESOLVE_TIMEOUT {
            return Err(GateError::InvalidConfig(format!(
                "resolve_timeout_ms must be at most {}",
                MAX_RESOLVE_TIMEOUT.as_millis()
            )));
        }
        if self.max_role_age_secs == 0 {
            return Err(GateError::InvalidConfig(
                "max_role_age_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        config.validate().unwrap();
        assert_eq!(config.resolve_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_role_age(), Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_bounds() {
        let zero = GateConfig {
            resolve_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let too_long = GateConfig {
            resolve_timeout_ms: 10_001,
            ..Default::default()
        };
        assert!(too_long.validate().is_err());

        let upper = GateConfig {
            resolve_timeout_ms: 10_000,
            ..Default::default()
        };
        upper.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: GateConfig = toml::from_str("resolve_timeout_ms = 1500").unwrap();
        assert_eq!(config.resolve_timeout(), Duration::from_millis(1500));
        assert_eq!(config.max_role_age_secs, 300);
    }
}
