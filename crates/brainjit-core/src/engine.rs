// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The numeric engine seam
//!
//! Transforms never compute anything themselves. They hand pure functions
//! to a [`NumericEngine`], which provides shape-only evaluation and a
//! compiler. [`EagerEngine`] is the reference implementation: it evaluates
//! shapes by running on zero-filled placeholders and "compiles" by
//! returning the pure function unchanged.

use std::rc::Rc;

use ahash::AHashSet;
use brainjit_config::JitConfig;
use tracing::debug;

use crate::error::{BrainJitError, Result};
use crate::value::{CallArgs, StateMap, Value};

/// A transformable target
pub type TargetFn = Rc<dyn Fn(&CallArgs) -> Result<Value>>;

/// State-in, state-out adapter handed to the compiler
pub type PureFn = Rc<dyn Fn(StateMap, &CallArgs) -> Result<(Value, StateMap)>>;

/// What the compiler returns; same signature as [`PureFn`]
pub type CompiledFn = PureFn;

/// Compiler configuration, passed to the engine verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitOptions {
    pub static_argnums: Vec<usize>,
    pub static_argnames: Vec<String>,
    pub donate_argnums: Vec<usize>,
    pub device: Option<String>,
    pub inline: bool,
    pub keep_unused: bool,
    pub backend: Option<String>,
    pub abstracted_axes: Option<String>,
    /// Name of the wrapper object
    pub name: Option<String>,
}

impl JitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context-wide defaults from `[jit]` in `brainjit.toml`
    pub fn from_config(config: &JitConfig) -> Self {
        Self {
            device: config.device.clone(),
            backend: Some(config.backend.clone()),
            inline: config.inline,
            keep_unused: config.keep_unused,
            ..Self::default()
        }
    }

    pub fn static_argnums(mut self, argnums: impl IntoIterator<Item = usize>) -> Self {
        self.static_argnums = argnums.into_iter().collect();
        self
    }

    pub fn static_argnames<S: Into<String>>(mut self, argnames: impl IntoIterator<Item = S>) -> Self {
        self.static_argnames = argnames.into_iter().map(Into::into).collect();
        self
    }

    pub fn donate_argnums(mut self, argnums: impl IntoIterator<Item = usize>) -> Self {
        self.donate_argnums = argnums.into_iter().collect();
        self
    }

    pub fn device(mut self, device: &str) -> Self {
        self.device = Some(device.to_string());
        self
    }

    pub fn backend(mut self, backend: &str) -> Self {
        self.backend = Some(backend.to_string());
        self
    }

    pub fn inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    pub fn keep_unused(mut self, keep_unused: bool) -> Self {
        self.keep_unused = keep_unused;
        self
    }

    pub fn abstracted_axes(mut self, axes: &str) -> Self {
        self.abstracted_axes = Some(axes.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Fill unset placement fields from `defaults`
    pub fn or_defaults(mut self, defaults: &JitOptions) -> Self {
        if self.device.is_none() {
            self.device = defaults.device.clone();
        }
        if self.backend.is_none() {
            self.backend = defaults.backend.clone();
        }
        self.inline |= defaults.inline;
        self.keep_unused |= defaults.keep_unused;
        self
    }

    /// Reject repeated static argument positions or names
    pub fn validate(&self) -> Result<()> {
        let mut seen = AHashSet::new();
        if let Some(dup) = self.static_argnums.iter().find(|i| !seen.insert(**i)) {
            return Err(BrainJitError::InvalidStaticArgs(format!(
                "static_argnums lists position {} more than once",
                dup
            )));
        }
        let mut seen = AHashSet::new();
        if let Some(dup) = self.static_argnames.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(BrainJitError::InvalidStaticArgs(format!(
                "static_argnames lists '{}' more than once",
                dup
            )));
        }
        Ok(())
    }
}

/// Shape inference and compilation for pure functions
pub trait NumericEngine {
    fn name(&self) -> &str;

    /// Evaluate `f` for output structure only, without real computation
    fn eval_shape(&self, f: &dyn Fn(&CallArgs) -> Result<Value>, args: &CallArgs) -> Result<Value>;

    /// Compile `pure` into a callable with the same inputs and outputs
    fn compile(&self, pure: PureFn, options: &JitOptions) -> Result<CompiledFn>;

    /// Map `f` over every leaf of `value`
    fn tree_map(&self, value: &Value, f: &mut dyn FnMut(&Value) -> Value) -> Value {
        value.tree_map(f)
    }
}

/// Runs everything eagerly on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct EagerEngine;

impl EagerEngine {
    pub const BACKEND: &'static str = "cpu";
}

impl NumericEngine for EagerEngine {
    fn name(&self) -> &str {
        "eager"
    }

    fn eval_shape(&self, f: &dyn Fn(&CallArgs) -> Result<Value>, args: &CallArgs) -> Result<Value> {
        let placeholders = args.tree_map(&mut |leaf| leaf.abstractify());
        Ok(f(&placeholders)?.abstractify())
    }

    fn compile(&self, pure: PureFn, options: &JitOptions) -> Result<CompiledFn> {
        if let Some(backend) = options.backend.as_deref() {
            if backend != Self::BACKEND {
                return Err(BrainJitError::Engine(format!(
                    "backend '{}' is not available, the eager engine only runs on '{}'",
                    backend,
                    Self::BACKEND
                )));
            }
        }
        debug!(
            static_argnums = ?options.static_argnums,
            static_argnames = ?options.static_argnames,
            donate_argnums = ?options.donate_argnums,
            "eager compile"
        );
        Ok(pure)
    }
}
