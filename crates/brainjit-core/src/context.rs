// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-scoped runtime context
//!
//! A [`Context`] owns everything that would otherwise be global: the name
//! registry, the variable stack, the transform cache, the codec registry
//! and the numeric engine. It is cheap to clone (`Rc`) and `!Send`; tests
//! build as many independent contexts as they need.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use brainjit_config::{validate_config, BrainJitConfig};
use tracing::{debug, info};

use crate::cache::{TargetId, TransformCache};
use crate::engine::{EagerEngine, JitOptions, NumericEngine};
use crate::error::{BrainJitError, Result};
use crate::io::{CodecRegistry, StateCodec};
use crate::naming::NameRegistry;
use crate::stack::VariableStack;
use crate::value::Array;
use crate::variable::{VarId, VarKind, Variable};

/// Object, variable and target ids are unique across every context
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

struct ContextInner {
    naming: NameRegistry,
    stack: VariableStack,
    cache: TransformCache,
    codecs: RefCell<CodecRegistry>,
    engine: Rc<dyn NumericEngine>,
    disable_jit: Cell<bool>,
    warn_on_mismatch: Cell<bool>,
    default_format: String,
    jit_defaults: JitOptions,
    eval_depth: Cell<usize>,
}

#[derive(Clone)]
pub struct Context(Rc<ContextInner>);

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Context with the eager engine and default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Context configured from a loaded `brainjit.toml`
    ///
    /// # Errors
    ///
    /// `Config` if the configuration does not validate.
    pub fn from_config(config: &BrainJitConfig) -> Result<Self> {
        validate_config(config)?;
        let ctx = Self::builder()
            .disable_jit(config.jit.disable_jit)
            .warn_on_mismatch(config.state.warn_on_mismatch)
            .default_format(&config.state.default_format)
            .jit_defaults(JitOptions::from_config(&config.jit))
            .build();
        info!(
            backend = %config.jit.backend,
            disable_jit = config.jit.disable_jit,
            default_format = %config.state.default_format,
            "context configured"
        );
        Ok(ctx)
    }

    pub(crate) fn next_id(&self) -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_target_id(&self) -> TargetId {
        TargetId(self.next_id())
    }

    pub fn naming(&self) -> &NameRegistry {
        &self.0.naming
    }

    pub fn stack(&self) -> &VariableStack {
        &self.0.stack
    }

    pub fn cache(&self) -> &TransformCache {
        &self.0.cache
    }

    pub fn engine(&self) -> &dyn NumericEngine {
        self.0.engine.as_ref()
    }

    fn make_var(&self, kind: VarKind, value: Array) -> Variable {
        Variable::new(VarId(self.next_id()), kind, value, self.0.stack.clone())
    }

    /// Plain state handle
    pub fn variable(&self, value: Array) -> Variable {
        self.make_var(VarKind::Variable, value)
    }

    /// Trainable state handle
    pub fn train_var(&self, value: Array) -> Variable {
        self.make_var(VarKind::TrainVar, value)
    }

    pub fn parameter(&self, value: Array) -> Variable {
        self.make_var(VarKind::Parameter, value)
    }

    /// Handle with its own identity sharing `target`'s storage
    pub fn variable_view(&self, target: &Variable) -> Variable {
        Variable::view_of(VarId(self.next_id()), target)
    }

    /// Debug escape hatch: wrappers call their targets directly
    pub fn set_disable_jit(&self, disable: bool) {
        if self.0.disable_jit.replace(disable) != disable {
            debug!(disable_jit = disable, "jit mode changed");
        }
    }

    pub fn is_jit_disabled(&self) -> bool {
        self.0.disable_jit.get()
    }

    pub fn warn_on_mismatch(&self) -> bool {
        self.0.warn_on_mismatch.get()
    }

    pub fn set_warn_on_mismatch(&self, warn: bool) {
        self.0.warn_on_mismatch.set(warn);
    }

    /// Defaults merged into every wrapper's options
    pub fn jit_defaults(&self) -> &JitOptions {
        &self.0.jit_defaults
    }

    pub fn register_codec(&self, codec: Rc<dyn StateCodec>) {
        debug!(codec = codec.name(), extensions = ?codec.extensions(), "codec registered");
        self.0.codecs.borrow_mut().register(codec);
    }

    pub fn supported_formats(&self) -> Vec<String> {
        self.0.codecs.borrow().supported()
    }

    /// Codec for `path`; a path without an extension uses the default format
    pub fn codec_for(&self, path: &Path) -> Result<Rc<dyn StateCodec>> {
        let codecs = self.0.codecs.borrow();
        if path.extension().is_some() {
            return codecs.for_path(path);
        }
        codecs
            .for_format(&self.0.default_format)
            .ok_or_else(|| BrainJitError::UnsupportedFormat {
                path: path.to_path_buf(),
                supported: codecs.supported(),
            })
    }

    pub fn is_evaluating_shape(&self) -> bool {
        self.0.eval_depth.get() > 0
    }

    pub(crate) fn enter_eval(&self) -> EvalGuard {
        self.0.eval_depth.set(self.0.eval_depth.get() + 1);
        EvalGuard(self.clone())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("engine", &self.0.engine.name())
            .field("disable_jit", &self.0.disable_jit.get())
            .field("live_names", &self.0.naming.live_count())
            .field("cache_entries", &self.0.cache.len())
            .field("stack_depth", &self.0.stack.depth())
            .finish()
    }
}

/// Marks an ongoing shape evaluation
pub(crate) struct EvalGuard(Context);

impl Drop for EvalGuard {
    fn drop(&mut self) {
        let depth = self.0 .0.eval_depth.get();
        self.0 .0.eval_depth.set(depth.saturating_sub(1));
    }
}

pub struct ContextBuilder {
    engine: Rc<dyn NumericEngine>,
    disable_jit: bool,
    warn_on_mismatch: bool,
    default_format: String,
    jit_defaults: JitOptions,
    codecs: CodecRegistry,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            engine: Rc::new(EagerEngine),
            disable_jit: false,
            warn_on_mismatch: true,
            default_format: "json".to_string(),
            jit_defaults: JitOptions::default(),
            codecs: CodecRegistry::with_defaults(),
        }
    }
}

impl ContextBuilder {
    pub fn engine(mut self, engine: Rc<dyn NumericEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn disable_jit(mut self, disable: bool) -> Self {
        self.disable_jit = disable;
        self
    }

    pub fn warn_on_mismatch(mut self, warn: bool) -> Self {
        self.warn_on_mismatch = warn;
        self
    }

    pub fn default_format(mut self, format: &str) -> Self {
        self.default_format = format.to_string();
        self
    }

    pub fn jit_defaults(mut self, options: JitOptions) -> Self {
        self.jit_defaults = options;
        self
    }

    pub fn codec(mut self, codec: Rc<dyn StateCodec>) -> Self {
        self.codecs.register(codec);
        self
    }

    pub fn build(self) -> Context {
        debug!(engine = self.engine.name(), disable_jit = self.disable_jit, "context created");
        Context(Rc::new(ContextInner {
            naming: NameRegistry::new(),
            stack: VariableStack::new(),
            cache: TransformCache::new(),
            codecs: RefCell::new(self.codecs),
            engine: self.engine,
            disable_jit: Cell::new(self.disable_jit),
            warn_on_mismatch: Cell::new(self.warn_on_mismatch),
            default_format: self.default_format,
            jit_defaults: self.jit_defaults,
            eval_depth: Cell::new(0),
        }))
    }
}
