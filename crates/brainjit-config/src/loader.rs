// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, BrainJitConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "brainjit.toml";

/// Find the brainjit configuration file
///
/// Search order:
/// 1. `BRAINJIT_CONFIG_PATH` environment variable
/// 2. Current working directory: `./brainjit.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("BRAINJIT_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by BRAINJIT_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet BRAINJIT_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<BrainJitConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: BrainJitConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    validate_config(&config)?;
    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `BRAINJIT_DISABLE_JIT` -> `jit.disable_jit`
/// - `BRAINJIT_BACKEND` -> `jit.backend`
/// - `BRAINJIT_DEVICE` -> `jit.device`
/// - `BRAINJIT_WARN_STATE_MISMATCH` -> `state.warn_on_mismatch`
/// - `BRAINJIT_STATE_FORMAT` -> `state.default_format`
/// - `BRAINJIT_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut BrainJitConfig) {
    if let Ok(value) = env::var("BRAINJIT_DISABLE_JIT") {
        config.jit.disable_jit = parse_flag(&value);
    }
    if let Ok(value) = env::var("BRAINJIT_BACKEND") {
        config.jit.backend = value.to_lowercase();
    }
    if let Ok(value) = env::var("BRAINJIT_DEVICE") {
        config.jit.device = Some(value);
    }
    if let Ok(value) = env::var("BRAINJIT_WARN_STATE_MISMATCH") {
        config.state.warn_on_mismatch = parse_flag(&value);
    }
    if let Ok(value) = env::var("BRAINJIT_STATE_FORMAT") {
        config.state.default_format = value.trim_start_matches('.').to_lowercase();
    }
    if let Ok(value) = env::var("BRAINJIT_LOG_LEVEL") {
        config.logging.level = value.to_lowercase();
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"backend": "gpu", "disable_jit": "true"}`)
pub fn apply_cli_overrides(config: &mut BrainJitConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("disable_jit") {
        config.jit.disable_jit = parse_flag(value);
    }
    if let Some(value) = cli_args.get("backend") {
        config.jit.backend = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("device") {
        config.jit.device = Some(value.clone());
    }
    if let Some(value) = cli_args.get("inline") {
        config.jit.inline = parse_flag(value);
    }
    if let Some(value) = cli_args.get("keep_unused") {
        config.jit.keep_unused = parse_flag(value);
    }
    if let Some(value) = cli_args.get("state_format") {
        config.state.default_format = value.trim_start_matches('.').to_lowercase();
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.to_lowercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("BRAINJIT_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("BRAINJIT_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("BRAINJIT_CONFIG_PATH", "/definitely/not/here/brainjit.toml");
        let result = find_config_file();
        env::remove_var("BRAINJIT_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("BRAINJIT_BACKEND");
        env::remove_var("BRAINJIT_DISABLE_JIT");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[jit]").unwrap();
        writeln!(file, "backend = \"gpu\"").unwrap();
        writeln!(file, "[state]").unwrap();
        writeln!(file, "warn_on_mismatch = false").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.jit.backend, "gpu");
        assert!(!config.state.warn_on_mismatch);
        assert!(!config.jit.disable_jit);
    }

    #[test]
    fn test_load_rejects_invalid_backend() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("BRAINJIT_BACKEND");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[jit]\nbackend = \"abacus\"\n").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = BrainJitConfig::default();

        env::set_var("BRAINJIT_DISABLE_JIT", "yes");
        env::set_var("BRAINJIT_STATE_FORMAT", ".BIN");

        apply_environment_overrides(&mut config);

        env::remove_var("BRAINJIT_DISABLE_JIT");
        env::remove_var("BRAINJIT_STATE_FORMAT");

        assert!(config.jit.disable_jit);
        assert_eq!(config.state.default_format, "bin");
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[jit]\nbackend = \"cpu\"\n[logging]\nlevel = \"warn\"\n").unwrap();

        env::set_var("BRAINJIT_BACKEND", "gpu");
        env::set_var("BRAINJIT_LOG_LEVEL", "debug");

        let mut cli_args = HashMap::new();
        cli_args.insert("backend".to_string(), "tpu".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("BRAINJIT_BACKEND");
        env::remove_var("BRAINJIT_LOG_LEVEL");

        // CLI wins for backend, env wins for log level (no CLI override)
        assert_eq!(config.jit.backend, "tpu");
        assert_eq!(config.logging.level, "debug");
    }
}
