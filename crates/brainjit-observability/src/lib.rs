// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # brainjit-observability
//!
//! Logging setup shared by every brainjit crate, with per-crate debug flag
//! support (`--debug-brainjit-core`, `--debug-all`, `BRAINJIT_DEBUG`).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known brainjit crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "brainjit",
    "brainjit-core",
    "brainjit-config",
    "brainjit-observability",
];
