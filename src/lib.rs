// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # brainjit
//!
//! Stateful object graphs for brain dynamics models, and object-oriented
//! JIT transforms that let those graphs run through a pure-function
//! compiler without giving up in-place state.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! brainjit = "0.0.1-beta.1"
//! ```
//!
//! ```rust
//! use std::rc::Rc;
//! use brainjit::prelude::*;
//!
//! struct Counter {
//!     base: ObjectBase,
//!     count: Variable,
//! }
//! brainjit::brain_object!(Counter);
//!
//! impl Counter {
//!     fn inc(&self, _args: &CallArgs) -> Result<Value> {
//!         self.count.update(|c| c + 1.0)?;
//!         Ok(Value::None)
//!     }
//! }
//!
//! let ctx = Context::new();
//! let count = ctx.variable(scalar(0.0));
//! let base = ObjectBase::of::<Counter>(&ctx, None)?;
//! base.register_var("count", &count);
//! let counter = Rc::new(Counter { base, count });
//!
//! let inc = jit_method(&counter, Counter::inc, JitOptions::new())?;
//! for _ in 0..3 {
//!     inc.call(&CallArgs::new())?;
//! }
//! assert_eq!(counter.count.value(), scalar(3.0));
//! # Ok::<(), BrainJitError>(())
//! ```
//!
//! ## Configured startup
//!
//! ```rust,no_run
//! use brainjit::prelude::*;
//!
//! let config = brainjit::config::load_config(None, None)?;
//! let flags = brainjit::observability::parse_debug_flags();
//! brainjit::observability::init_logging(
//!     &flags,
//!     &brainjit::observability::LoggingConfig::from_level(&config.logging.level, config.logging.json),
//! )?;
//! let ctx = Context::from_config(&config)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crates
//!
//! - **brainjit-core**: object graph, variables, tracer scopes, transforms
//! - **brainjit-config**: `brainjit.toml` loading and validation
//! - **brainjit-observability**: logging initialization and debug flags
//!
//! ## License
//!
//! Apache-2.0

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use brainjit_config as config;
pub use brainjit_core as core;
pub use brainjit_observability as observability;

pub use brainjit_core::brain_object;

/// Array crate behind every variable value
pub use ndarray;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use brainjit_core::prelude::*;
    pub use brainjit_config::BrainJitConfig;
}
