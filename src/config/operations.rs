//! Config loading, validation, and utility operations.

use super::model::Config;
use super::types::LockScope;
use crate::error::{LeaseError, Result};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(LeaseError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LeaseError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LeaseError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LeaseError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lease_duration_ms`, `poll_interval_ms` and `guard_timeout_ms` must be positive
    /// - a scoped lock needs a non-empty collection and field
    /// - `client_id`, when set, must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.lease_duration_ms == 0 {
            return Err(LeaseError::Config(
                "lease_duration_ms must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(LeaseError::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.guard_timeout_ms == 0 {
            return Err(LeaseError::Config(
                "guard_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let LockScope::Scoped {
            collection, field, ..
        } = &self.scope
        {
            if collection.trim().is_empty() {
                return Err(LeaseError::Config(
                    "scoped lock requires a non-empty collection".to_string(),
                ));
            }
            if field.trim().is_empty() {
                return Err(LeaseError::Config(
                    "scoped lock requires a non-empty filter field".to_string(),
                ));
            }
        }

        if let Some(client_id) = &self.client_id
            && client_id.trim().is_empty()
        {
            return Err(LeaseError::Config(
                "client_id must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn guard_timeout(&self) -> Duration {
        Duration::from_millis(self.guard_timeout_ms)
    }

    pub fn guard_stale_after(&self) -> Duration {
        Duration::from_millis(self.guard_stale_after_ms)
    }
}
