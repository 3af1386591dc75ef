// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # brainjit Core
//!
//! Stateful object graphs that can be handed to a pure-function compiler.
//!
//! - **Object graph**: [`ObjectBase`](object::ObjectBase) nodes with unique
//!   names, declared child nodes and variables, traversal with absolute or
//!   relative paths, `state_dict` save and load
//! - **Variables**: shared mutable array handles that report every read and
//!   write to the active tracer scope
//! - **Transforms**: [`jit`](jit::jit), [`jit_method`](jit::jit_method) and
//!   [`ClsJit`](jit::ClsJit) discover the variables a call touches, compile a
//!   pure adapter once per call site and write results back in place
//!
//! All runtime registries live in a [`Context`](context::Context); nothing is
//! global and nothing is `Send`.
//!
//! ```rust
//! use std::rc::Rc;
//! use brainjit_core::prelude::*;
//!
//! struct Leaky {
//!     base: ObjectBase,
//!     v: Variable,
//! }
//! brainjit_core::brain_object!(Leaky);
//!
//! impl Leaky {
//!     fn update(&self, args: &CallArgs) -> Result<Value> {
//!         let input = args.float(0)?;
//!         self.v.update(|v| v * 0.5 + input)?;
//!         Ok(Value::Array(self.v.value()))
//!     }
//! }
//!
//! let ctx = Context::new();
//! let v = ctx.variable(array1(&[0.0, 0.0]));
//! let base = ObjectBase::of::<Leaky>(&ctx, None)?;
//! base.register_var("v", &v);
//! let cell = Rc::new(Leaky { base, v });
//!
//! let step = jit_method(&cell, Leaky::update, JitOptions::new())?;
//! step.call(&CallArgs::new().arg(1.0))?;
//! step.call(&CallArgs::new().arg(1.0))?;
//! assert_eq!(cell.v.value(), array1(&[1.5, 1.5]));
//! # Ok::<(), BrainJitError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cache;
pub mod collector;
pub mod context;
pub mod engine;
pub mod error;
pub mod io;
pub mod jit;
pub mod naming;
pub mod object;
pub mod stack;
pub mod transform;
pub mod value;
pub mod variable;

pub use cache::{CacheEntry, CacheKey, StaticSlot, TargetId, TransformCache};
pub use collector::{Collectable, Collector, Selector};
pub use context::{Context, ContextBuilder};
pub use engine::{CompiledFn, EagerEngine, JitOptions, NumericEngine, PureFn, TargetFn};
pub use error::{BrainJitError, Result};
pub use io::{BincodeCodec, CodecRegistry, JsonCodec, StateCodec};
pub use jit::{jit, jit_method, ClsJit, JitTransform};
pub use naming::NameRegistry;
pub use object::{
    downcast_object, AsObject, BrainObject, ObjectBase, ObjectGraph, ObjectRef, PathMethod, StateLoadResult, Traverse,
};
pub use stack::{StackGuard, VariableStack};
pub use transform::{eval_shape, eval_shape_with_stack, merge_static, partition_static, Partition};
pub use value::{array1, scalar, Array, CallArgs, StateMap, StaticKey, Value};
pub use variable::{VarId, VarKind, Variable};

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::collector::{Collectable, Collector, Selector};
    pub use crate::context::{Context, ContextBuilder};
    pub use crate::engine::{EagerEngine, JitOptions, NumericEngine};
    pub use crate::error::{BrainJitError, Result};
    pub use crate::jit::{jit, jit_method, ClsJit, JitTransform};
    pub use crate::object::{
        AsObject, BrainObject, ObjectBase, ObjectGraph, ObjectRef, PathMethod, StateLoadResult, Traverse,
    };
    pub use crate::transform::eval_shape;
    pub use crate::value::{array1, scalar, Array, CallArgs, StateMap, Value};
    pub use crate::variable::{VarKind, Variable};
}
