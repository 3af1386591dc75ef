// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values name things the runtime actually knows about.

use crate::types::{KNOWN_BACKENDS, KNOWN_LOG_LEVELS};
use crate::{BrainJitConfig, ConfigError, ConfigResult};

/// State formats that ship with the core codec registry
pub const BUILTIN_STATE_FORMATS: &[&str] = &["json", "bin", "bincode"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    UnknownBackend { backend: String },
    UnknownLogLevel { level: String },
    UnknownStateFormat { format: String },
    MissingRequired { field: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownBackend { backend } => {
                write!(f, "jit.backend = '{}' is not one of {:?}", backend, KNOWN_BACKENDS)
            }
            Self::UnknownLogLevel { level } => {
                write!(f, "logging.level = '{}' is not one of {:?}", level, KNOWN_LOG_LEVELS)
            }
            Self::UnknownStateFormat { format } => {
                write!(
                    f,
                    "state.default_format = '{}' is not one of {:?}",
                    format, BUILTIN_STATE_FORMATS
                )
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &BrainJitConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    if config.jit.backend.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "jit.backend".to_string(),
        });
    } else if !KNOWN_BACKENDS.contains(&config.jit.backend.as_str()) {
        errors.push(ConfigValidationError::UnknownBackend {
            backend: config.jit.backend.clone(),
        });
    }

    if !KNOWN_LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ConfigValidationError::UnknownLogLevel {
            level: config.logging.level.clone(),
        });
    }

    if !BUILTIN_STATE_FORMATS.contains(&config.state.default_format.as_str()) {
        errors.push(ConfigValidationError::UnknownStateFormat {
            format: config.state.default_format.clone(),
        });
    }

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BrainJitConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = BrainJitConfig::default();
        config.jit.backend = "fpga".to_string();
        config.logging.level = "loud".to_string();
        config.state.default_format = "h5".to_string();

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("jit.backend"));
        assert!(err.contains("logging.level"));
        assert!(err.contains("state.default_format"));
    }

    #[test]
    fn test_empty_backend_is_missing() {
        let mut config = BrainJitConfig::default();
        config.jit.backend.clear();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("Missing required configuration: jit.backend"));
    }
}
