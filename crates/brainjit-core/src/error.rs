// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the object-transform core

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the object graph, collectors, persistence and transforms
#[derive(Error, Debug)]
pub enum BrainJitError {
    /// Another live object already holds this name
    #[error("Naming error: {0}")]
    Naming(String),

    /// A collector key was rebound to a different object
    #[error("Conflict: key '{key}' is bound to {existing}, cannot rebind to {incoming}")]
    Conflict {
        key: String,
        existing: String,
        incoming: String,
    },

    /// A registered node does not have the required kind
    #[error("Invalid node kind: expected {expected}, got {actual}")]
    InvalidNodeKind { expected: String, actual: String },

    /// Malformed static-argument configuration
    #[error("Invalid static arguments: {0}")]
    InvalidStaticArgs(String),

    /// A static argument cannot be used as part of a cache key
    #[error("Static argument is not hashable: {0}")]
    UnhashableStatic(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Assigning an array of another shape to a variable
    #[error("Shape mismatch for '{target}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        target: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file format for {}: supported extensions are {supported:?}", .path.display())]
    UnsupportedFormat { path: PathBuf, supported: Vec<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    /// The compiled function did not return a value for a discovered variable
    #[error("Missing state for '{0}' in compiled output")]
    MissingState(String),

    /// Shape inference or compilation failed inside the numeric engine
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Config(#[from] brainjit_config::ConfigError),
}

impl From<serde_json::Error> for BrainJitError {
    fn from(err: serde_json::Error) -> Self {
        BrainJitError::Codec(format!("json: {}", err))
    }
}

impl From<bincode::Error> for BrainJitError {
    fn from(err: bincode::Error) -> Self {
        BrainJitError::Codec(format!("bincode: {}", err))
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, BrainJitError>;
