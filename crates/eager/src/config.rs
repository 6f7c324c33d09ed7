//! Engine configuration
//!
//! Limits and defaults applied to every query built by a [`crate::QueryEngine`].

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{OrmError, OrmResult};

/// Default values for engine configuration
pub struct EngineDefaults;

impl EngineDefaults {
    pub const MAX_DEPTH: usize = 10;
    pub const MAX_KEYS_PER_QUERY: usize = 1000;
    pub const HYDRATE: bool = true;
    pub const BUFFER: bool = false;
}

/// Configuration for containment planning and eager loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting depth of a containment tree
    pub max_depth: usize,
    /// Maximum number of owner keys placed in a single `IN (...)` list
    pub max_keys_per_query: usize,
    /// Whether new queries hydrate records into entities
    pub hydrate_by_default: bool,
    /// Whether new queries buffer their results for repeated iteration
    pub buffer_by_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: EngineDefaults::MAX_DEPTH,
            max_keys_per_query: EngineDefaults::MAX_KEYS_PER_QUERY,
            hydrate_by_default: EngineDefaults::HYDRATE,
            buffer_by_default: EngineDefaults::BUFFER,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> OrmResult<()> {
        if self.max_depth == 0 {
            return Err(OrmError::Configuration(
                "Maximum containment depth must be greater than 0".to_string(),
            ));
        }

        if self.max_keys_per_query == 0 {
            return Err(OrmError::Configuration(
                "Maximum keys per query must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build a configuration from `ELIF_EAGER_*` environment variables,
    /// falling back to the defaults for unset variables
    pub fn from_env() -> OrmResult<Self> {
        let max_depth = parse_env("ELIF_EAGER_MAX_DEPTH", EngineDefaults::MAX_DEPTH)?;
        let max_keys_per_query =
            parse_env("ELIF_EAGER_MAX_KEYS_PER_QUERY", EngineDefaults::MAX_KEYS_PER_QUERY)?;
        let hydrate_by_default = parse_env("ELIF_EAGER_HYDRATE", EngineDefaults::HYDRATE)?;
        let buffer_by_default = parse_env("ELIF_EAGER_BUFFER", EngineDefaults::BUFFER)?;

        let config = EngineConfig {
            max_depth,
            max_keys_per_query,
            hydrate_by_default,
            buffer_by_default,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_keys_per_query(mut self, max_keys: usize) -> Self {
        self.max_keys_per_query = max_keys;
        self
    }

    pub fn with_hydration(mut self, hydrate: bool) -> Self {
        self.hydrate_by_default = hydrate;
        self
    }

    pub fn with_buffering(mut self, buffer: bool) -> Self {
        self.buffer_by_default = buffer;
        self
    }
}

fn parse_env<T>(key: &str, default: T) -> OrmResult<T>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            OrmError::Configuration(format!("Invalid value '{}' for {}", raw, key))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.max_keys_per_query, 1000);
        assert!(config.hydrate_by_default);
        assert!(!config.buffer_by_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        assert!(EngineConfig::default().with_max_depth(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_max_keys_per_query(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_keys_per_query": 2}"#).unwrap();
        assert_eq!(config.max_keys_per_query, 2);
        assert_eq!(config.max_depth, EngineDefaults::MAX_DEPTH);
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("ELIF_EAGER_MAX_KEYS_PER_QUERY", "25");
        env::set_var("ELIF_EAGER_BUFFER", "true");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.max_keys_per_query, 25);
        assert!(config.buffer_by_default);
        assert_eq!(config.max_depth, EngineDefaults::MAX_DEPTH);
        assert_eq!(config.hydrate_by_default, EngineDefaults::HYDRATE);

        env::set_var("ELIF_EAGER_MAX_KEYS_PER_QUERY", "0");
        assert!(matches!(EngineConfig::from_env(), Err(OrmError::Configuration(_))));

        env::remove_var("ELIF_EAGER_MAX_KEYS_PER_QUERY");
        env::remove_var("ELIF_EAGER_BUFFER");
        assert_eq!(EngineConfig::from_env().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_parse_env_fallback_and_error() {
        let value: usize = parse_env("ELIF_EAGER_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);

        env::set_var("ELIF_EAGER_TEST_BAD_NUMBER", "lots");
        let result: OrmResult<usize> = parse_env("ELIF_EAGER_TEST_BAD_NUMBER", 1);
        assert!(matches!(result, Err(OrmError::Configuration(_))));
        env::remove_var("ELIF_EAGER_TEST_BAD_NUMBER");
    }
}
