// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for brainjit

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

/// Initialize console logging
///
/// The filter is built from `config.level` plus any per-crate debug flags.
/// `RUST_LOG`, when set, replaces the computed filter entirely.
///
/// # Errors
///
/// Fails if the filter string is malformed or a global subscriber was
/// already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(from_env) if !from_env.is_empty() => from_env,
        _ => debug_flags.to_filter_string(&config.level),
    };
    let env_filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log filter: {}", filter))?;

    let layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(config.with_target)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed(),
    };

    Registry::default()
        .with(layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::debug!(filter = %filter, "logging initialized");
    Ok(())
}

/// Initialize logging with default settings
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<()> {
    init_logging(debug_flags, &LoggingConfig::default())
}
