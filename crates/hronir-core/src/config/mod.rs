//! Engine configuration.
//!
//! Deployments tune the qualification threshold and the cascade guard
//! through a TOML file; everything has a default so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mandate::QualificationPolicy;

/// Errors that can occur loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization back to TOML failed.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field failed validation.
    #[error("invalid config: {details}")]
    Validation {
        /// What was wrong.
        details: String,
    },
}

fn default_max_positions() -> u32 {
    1024
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The qualification threshold policy.
    pub qualification: QualificationPolicy,

    /// Upper bound on positions a canonical walk or cascade will visit.
    pub max_positions: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            qualification: QualificationPolicy::default(),
            max_positions: default_max_positions(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a field fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_positions == 0 {
            return Err(ConfigError::Validation {
                details: "max_positions must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
