// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `brainjit.toml`.

use serde::{Deserialize, Serialize};

/// Backends the object-transform layer knows how to name
pub const KNOWN_BACKENDS: &[&str] = &["cpu", "gpu", "tpu"];

/// Log levels accepted by `logging.level`
pub const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrainJitConfig {
    pub jit: JitConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Defaults for object-transform wrappers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JitConfig {
    /// Debug escape hatch: wrappers call their target directly
    pub disable_jit: bool,
    pub backend: String,
    pub device: Option<String>,
    pub inline: bool,
    pub keep_unused: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            disable_jit: false,
            backend: "cpu".to_string(),
            device: None,
            inline: false,
            keep_unused: false,
        }
    }
}

/// State persistence configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Warn when `load_state_dict` sees missing or unexpected keys
    pub warn_on_mismatch: bool,
    /// Codec used when a caller asks for the default format (file extension without the dot)
    pub default_format: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            warn_on_mismatch: true,
            default_format: "json".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BrainJitConfig = toml::from_str("[jit]\ndisable_jit = true\n").unwrap();
        assert!(config.jit.disable_jit);
        assert_eq!(config.jit.backend, "cpu");
        assert!(config.state.warn_on_mismatch);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_json_roundtrip() {
        let config = BrainJitConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: BrainJitConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
