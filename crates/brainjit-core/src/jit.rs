// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Object-oriented JIT transforms
//!
//! A wrapped call looks pure to the numeric engine and stateful to the
//! caller. On the first call for a given call site the target is run once
//! in shape-only mode to discover every [`Variable`] it touches; a pure
//! adapter `(state, args) -> (result, new_state)` is built around it and
//! compiled. Every call then reads the discovered variables, invokes the
//! compiled function and writes the new state back in place.
//!
//! ```rust
//! use brainjit_core::prelude::*;
//!
//! let ctx = Context::new();
//! let total = ctx.variable(scalar(0.0));
//! let acc = total.clone();
//! let add = jit(
//!     &ctx,
//!     move |args: &CallArgs| {
//!         let x = args.float(0)?;
//!         acc.update(|t| t + x)?;
//!         Ok(Value::None)
//!     },
//!     JitOptions::new(),
//! )?;
//! add.call(&CallArgs::new().arg(2.0))?;
//! add.call(&CallArgs::new().arg(3.0))?;
//! assert_eq!(total.value(), scalar(5.0));
//! # Ok::<(), BrainJitError>(())
//! ```

use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use tracing::{debug, trace, warn};

use crate::brain_object;
use crate::cache::{CacheEntry, CacheKey, StaticSlot, TargetId};
use crate::collector::Collector;
use crate::context::Context;
use crate::engine::{JitOptions, PureFn, TargetFn};
use crate::error::{BrainJitError, Result};
use crate::object::{short_type_name, AsObject, BrainObject, ObjectBase, ObjectGraph, ObjectRef};
use crate::transform::{evaluate, merge_static, partition_static, Partition};
use crate::value::{CallArgs, StateMap, StaticKey, Value};
use crate::variable::{VarId, Variable};

/// Pure adapter over `target` for the variables in `stack`
fn make_pure(target: TargetFn, stack: Collector<Variable>, statics: Vec<(StaticSlot, Value)>) -> PureFn {
    Rc::new(move |mut state: StateMap, dynamic: &CallArgs| -> Result<(Value, StateMap)> {
        let mut incoming = Vec::with_capacity(stack.len());
        for (key, var) in stack.iter() {
            let value = state
                .remove(key)
                .ok_or_else(|| BrainJitError::MissingState(key.clone()))?;
            incoming.push((var, value));
        }
        for (var, value) in &incoming {
            var.replace_raw(value.clone());
        }
        let out = match target(&merge_static(&statics, dynamic)) {
            Ok(out) => out,
            Err(e) => {
                for (var, value) in incoming {
                    var.replace_raw(value);
                }
                return Err(e);
            }
        };
        let changes = stack
            .iter()
            .map(|(key, var)| (key.clone(), var.raw().clone()))
            .collect();
        Ok((out, changes))
    })
}

/// Put every handle back to the value it held before the call
fn restore(stack: &Collector<Variable>, mut before: StateMap) {
    for (key, var) in stack.iter() {
        if let Some(value) = before.remove(key) {
            var.replace_raw(value);
        }
    }
}

fn invoke(entry: &CacheEntry, dynamic: &CallArgs) -> Result<Value> {
    let state = entry.stack.dict();
    let before = state.clone();
    let (out, mut changes) = match (entry.compiled)(state, dynamic) {
        Ok(result) => result,
        Err(e) => {
            restore(&entry.stack, before);
            return Err(e);
        }
    };
    let mut updates = Vec::with_capacity(entry.stack.len());
    for (key, var) in entry.stack.iter() {
        let expected = before.get(key).map(|a| a.shape().to_vec()).unwrap_or_default();
        let checked = changes
            .remove(key)
            .ok_or_else(|| BrainJitError::MissingState(key.clone()))
            .and_then(|value| {
                if value.shape() == expected.as_slice() {
                    Ok(value)
                } else {
                    Err(BrainJitError::ShapeMismatch {
                        target: key.clone(),
                        expected,
                        actual: value.shape().to_vec(),
                    })
                }
            });
        match checked {
            Ok(value) => updates.push((key, var, value)),
            Err(e) => {
                restore(&entry.stack, before);
                return Err(e);
            }
        }
    }
    for (key, var, value) in updates {
        var.write_back(key, value)?;
    }
    Ok(out)
}

/// Shared call path of [`JitTransform`] and [`ClsJit`]
fn call_transformed(
    ctx: &Context,
    target: &TargetFn,
    target_id: TargetId,
    owner: Option<u64>,
    options: &JitOptions,
    repr: &str,
    args: &CallArgs,
) -> Result<Value> {
    if ctx.is_jit_disabled() {
        trace!(transform = repr, "jit disabled, calling target directly");
        return target(args);
    }

    let Partition { statics, dynamic } = partition_static(args, &options.static_argnums, &options.static_argnames)?;
    let key = CacheKey::new(target_id, owner, &statics)?;

    let entry = match ctx.cache().lookup(&key) {
        Some(entry) => entry,
        None => {
            let bound = |dyn_args: &CallArgs| target(&merge_static(&statics, dyn_args));
            let (_, stack) = evaluate(ctx, &bound, &dynamic)?;
            debug!(
                transform = repr,
                owner = ?owner,
                statics = ?key.statics.iter().map(|(_, k)| k).collect::<Vec<&StaticKey>>(),
                variables = stack.len(),
                "variables discovered"
            );
            let pure = make_pure(Rc::clone(target), stack.clone(), statics);
            let compiled = ctx.engine().compile(pure, options)?;
            let entry = CacheEntry { stack, compiled };
            ctx.cache().store(key, entry.clone());
            entry
        }
    };
    invoke(&entry, &dynamic)
}

/// A compiled view of a function or bound method; itself an object node
pub struct JitTransform {
    base: ObjectBase,
    target: TargetFn,
    target_id: TargetId,
    owner: Option<u64>,
    options: JitOptions,
    target_repr: String,
}
brain_object!(JitTransform);

impl JitTransform {
    fn build(ctx: &Context, target: TargetFn, owner: Option<u64>, options: JitOptions, target_repr: String) -> Result<Self> {
        options.validate()?;
        let options = options.or_defaults(ctx.jit_defaults());
        let base = ObjectBase::new(ctx, "JitTransform", options.name.as_deref())?;
        let target_id = ctx.next_target_id();
        debug!(name = %base.name(), function = %target_repr, "jit transform created");
        Ok(Self {
            base,
            target,
            target_id,
            owner,
            options,
            target_repr,
        })
    }

    /// Call through the compiled artifact
    pub fn call(&self, args: &CallArgs) -> Result<Value> {
        call_transformed(
            self.base.context(),
            &self.target,
            self.target_id,
            self.owner,
            &self.options,
            &self.target_repr,
            args,
        )
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    /// Unique variables reachable through implicit registrations
    fn num_of_vars(&self) -> usize {
        let mut ids: AHashSet<VarId> = self.base.implicit_vars().values().map(Variable::id).collect();
        for node in self.base.implicit_nodes().values() {
            if let Ok(vars) = node.vars() {
                ids.extend(vars.values().map(Variable::id));
            }
        }
        ids.len()
    }

    /// Explicitly declared variables; discovery makes this unnecessary
    pub fn register_dyn_vars<K, I>(&self, vars: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Variable)>,
    {
        warn!(
            transform = %self.base.name(),
            "dyn_vars no longer need to be provided; variables are collected automatically"
        );
        self.base.register_implicit_named_vars(vars)
    }

    /// Explicitly declared child nodes; discovery makes this unnecessary
    pub fn register_child_objs<K, I>(&self, nodes: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ObjectRef)>,
    {
        warn!(
            transform = %self.base.name(),
            "child_objs no longer need to be provided; nodes are collected automatically"
        );
        self.base.register_implicit_named_nodes(nodes)
    }
}

impl fmt::Display for JitTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = "JitTransform";
        write!(
            f,
            "{}(target={}, \n{} num_of_vars={})",
            name,
            self.target_repr,
            " ".repeat(name.len()),
            self.num_of_vars()
        )
    }
}

/// Wrap a function
///
/// # Errors
///
/// `InvalidStaticArgs` for repeated static positions or names, `Naming`
/// if `options.name` is taken.
pub fn jit<F>(ctx: &Context, f: F, options: JitOptions) -> Result<Rc<JitTransform>>
where
    F: Fn(&CallArgs) -> Result<Value> + 'static,
{
    let repr = std::any::type_name::<F>().to_string();
    Ok(Rc::new(JitTransform::build(ctx, Rc::new(f), None, options, repr)?))
}

/// Wrap a method bound to `owner`
///
/// The owner becomes an implicit child node of the transform so its
/// variables are reachable from it, and the owner's identity is part of
/// the cache key.
pub fn jit_method<T, F>(owner: &Rc<T>, method: F, options: JitOptions) -> Result<Rc<JitTransform>>
where
    T: BrainObject,
    F: Fn(&T, &CallArgs) -> Result<Value> + 'static,
{
    let ctx = owner.base().context().clone();
    let weak: Weak<T> = Rc::downgrade(owner);
    let owner_name = owner.base().name();
    let target: TargetFn = Rc::new(move |args: &CallArgs| -> Result<Value> {
        let owner = weak
            .upgrade()
            .ok_or_else(|| BrainJitError::InvalidArgument("the owner of this method was dropped".to_string()))?;
        method(&owner, args)
    });
    let repr = format!("{}.{}", owner_name, short_type_name::<F>());
    let transform = JitTransform::build(&ctx, target, Some(owner.base().id()), options, repr)?;
    transform.base.register_implicit_nodes([owner.to_object()])?;
    Ok(Rc::new(transform))
}

/// A jitted method shared by every instance of `T`
///
/// Each instance gets its own cache entries, keyed by its object id.
pub struct ClsJit<T: BrainObject> {
    ctx: Context,
    method: Rc<dyn Fn(&T, &CallArgs) -> Result<Value>>,
    target_id: TargetId,
    options: JitOptions,
    method_repr: String,
}

impl<T: BrainObject> ClsJit<T> {
    pub fn new<F>(ctx: &Context, method: F, options: JitOptions) -> Result<Self>
    where
        F: Fn(&T, &CallArgs) -> Result<Value> + 'static,
    {
        options.validate()?;
        Ok(Self {
            ctx: ctx.clone(),
            method: Rc::new(method),
            target_id: ctx.next_target_id(),
            options: options.or_defaults(ctx.jit_defaults()),
            method_repr: format!("{}.{}", short_type_name::<T>(), short_type_name::<F>()),
        })
    }

    /// Call the method on `owner`
    pub fn call(&self, owner: &Rc<T>, args: &CallArgs) -> Result<Value> {
        if self.ctx.is_jit_disabled() {
            return (self.method)(owner, args);
        }
        let weak: Weak<T> = Rc::downgrade(owner);
        let method = Rc::clone(&self.method);
        let target: TargetFn = Rc::new(move |args: &CallArgs| -> Result<Value> {
            let owner = weak
                .upgrade()
                .ok_or_else(|| BrainJitError::InvalidArgument("the owner of this method was dropped".to_string()))?;
            method(&owner, args)
        });
        call_transformed(
            &self.ctx,
            &target,
            self.target_id,
            Some(owner.base().id()),
            &self.options,
            &self.method_repr,
            args,
        )
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }
}
