// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Observability configuration types

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text or json)
    pub format: LogFormat,

    /// Include the event target (module path) in each line
    pub with_target: bool,
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Text,
    Json,
}

impl LoggingConfig {
    /// Logging configuration from a level string and a JSON switch,
    /// the two knobs `brainjit.toml` exposes
    pub fn from_level(level: &str, json: bool) -> Self {
        LoggingConfig {
            level: level.to_string(),
            format: if json { LogFormat::Json } else { LogFormat::Text },
            ..LoggingConfig::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
            with_target: false,
        }
    }
}
