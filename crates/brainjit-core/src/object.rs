// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Object graph nodes
//!
//! Every stateful entity embeds an [`ObjectBase`] and implements
//! [`BrainObject`] (usually through [`brain_object!`](crate::brain_object)).
//! Child nodes and variables are declared explicitly at construction time;
//! traversal walks that index.
//!
//! ```rust
//! use std::rc::Rc;
//! use brainjit_core::prelude::*;
//!
//! struct Counter {
//!     base: ObjectBase,
//!     count: Variable,
//! }
//! brainjit_core::brain_object!(Counter);
//!
//! impl Counter {
//!     fn new(ctx: &Context) -> Result<Rc<Self>> {
//!         let base = ObjectBase::of::<Self>(ctx, None)?;
//!         let count = ctx.variable(scalar(0.0));
//!         base.register_var("count", &count);
//!         Ok(Rc::new(Self { base, count }))
//!     }
//! }
//!
//! let ctx = Context::new();
//! let counter = Counter::new(&ctx)?;
//! assert_eq!(counter.vars()?.len(), 1);
//! # Ok::<(), BrainJitError>(())
//! ```

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell};
use std::path::Path;
use std::rc::Rc;

use ahash::AHashSet;
use tracing::{debug, info, warn};

use crate::collector::{Collectable, Collector, Selector};
use crate::context::Context;
use crate::error::{BrainJitError, Result};
use crate::naming::NameToken;
use crate::value::StateMap;
use crate::variable::{VarKind, Variable};

/// A node in the object graph
pub trait BrainObject: 'static {
    fn base(&self) -> &ObjectBase;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to any node
pub type ObjectRef = Rc<dyn BrainObject>;

/// Implement [`BrainObject`] for a type that embeds an [`ObjectBase`]
///
/// The field defaults to `base`.
#[macro_export]
macro_rules! brain_object {
    ($ty:ty) => {
        $crate::brain_object!($ty, base);
    };
    ($ty:ty, $field:ident) => {
        impl $crate::object::BrainObject for $ty {
            fn base(&self) -> &$crate::object::ObjectBase {
                &self.$field
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

/// Conversion into a shared node handle
pub trait AsObject {
    fn to_object(&self) -> ObjectRef;
}

impl<T: BrainObject> AsObject for Rc<T> {
    fn to_object(&self) -> ObjectRef {
        self.clone()
    }
}

impl AsObject for Rc<dyn BrainObject> {
    fn to_object(&self) -> ObjectRef {
        Rc::clone(self)
    }
}

/// `T` if `object` is one
pub fn downcast_object<T: BrainObject>(object: &ObjectRef) -> Option<&T> {
    object.as_any().downcast_ref::<T>()
}

/// Last path segment of `T`'s type name, without generics
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head).to_string()
}

/// Identity, name and child registries shared by every node
pub struct ObjectBase {
    id: u64,
    type_name: String,
    name: RefCell<String>,
    token: Rc<NameToken>,
    ctx: Context,
    attr_nodes: RefCell<Vec<(String, ObjectRef)>>,
    attr_vars: RefCell<Vec<(String, Variable)>>,
    implicit_vars: RefCell<Collector<Variable>>,
    implicit_nodes: RefCell<Collector<ObjectRef>>,
    excluded_vars: RefCell<AHashSet<String>>,
}

impl ObjectBase {
    /// Base for a node of `type_name`
    ///
    /// Without a name a fresh `{type_name}{n}` is generated.
    ///
    /// # Errors
    ///
    /// `Naming` if `name` is held by another live object.
    pub fn new(ctx: &Context, type_name: &str, name: Option<&str>) -> Result<Self> {
        let id = ctx.next_id();
        let token = NameToken::new(id);
        let name = match name {
            Some(name) => name.to_string(),
            None => ctx.naming().get_unique_name(type_name),
        };
        ctx.naming().check_name_uniqueness(&name, &token)?;
        debug!(id, name = %name, type_name, "object created");
        Ok(Self {
            id,
            type_name: type_name.to_string(),
            name: RefCell::new(name),
            token,
            ctx: ctx.clone(),
            attr_nodes: RefCell::new(Vec::new()),
            attr_vars: RefCell::new(Vec::new()),
            implicit_vars: RefCell::new(Collector::new()),
            implicit_nodes: RefCell::new(Collector::new()),
            excluded_vars: RefCell::new(AHashSet::new()),
        })
    }

    /// Base named after the Rust type `T`
    pub fn of<T: ?Sized>(ctx: &Context, name: Option<&str>) -> Result<Self> {
        Self::new(ctx, &short_type_name::<T>(), name)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Rename the node; the old name is released
    pub fn set_name(&self, name: &str) -> Result<()> {
        let old = self.name();
        if old == name {
            return Ok(());
        }
        self.ctx.naming().check_name_uniqueness(name, &self.token)?;
        self.ctx.naming().release(&old, &self.token);
        *self.name.borrow_mut() = name.to_string();
        Ok(())
    }

    /// Declare `node` as the child attribute `attr`; re-declaring replaces it
    pub fn register_node(&self, attr: &str, node: &impl AsObject) {
        let node = node.to_object();
        let mut attrs = self.attr_nodes.borrow_mut();
        match attrs.iter_mut().find(|(k, _)| k == attr) {
            Some(slot) => slot.1 = node,
            None => attrs.push((attr.to_string(), node)),
        }
    }

    /// Declare `var` as the attribute `attr`; re-declaring replaces it
    pub fn register_var(&self, attr: &str, var: &Variable) {
        let mut attrs = self.attr_vars.borrow_mut();
        match attrs.iter_mut().find(|(k, _)| k == attr) {
            Some(slot) => slot.1 = var.clone(),
            None => attrs.push((attr.to_string(), var.clone())),
        }
    }

    /// Hide the attribute variable `attr` from `vars()`
    pub fn exclude_var(&self, attr: &str) {
        self.excluded_vars.borrow_mut().insert(attr.to_string());
    }

    /// Register variables not reachable as attributes, keyed `var{id}`
    pub fn register_implicit_vars<I>(&self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = Variable>,
    {
        let mut implicit = self.implicit_vars.borrow_mut();
        for var in vars {
            implicit.insert(format!("var{}", var.id()), var)?;
        }
        Ok(())
    }

    /// Register variables under caller-given keys
    pub fn register_implicit_named_vars<K, I>(&self, vars: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Variable)>,
    {
        let mut implicit = self.implicit_vars.borrow_mut();
        for (key, var) in vars {
            implicit.insert(key, var)?;
        }
        Ok(())
    }

    /// Register child nodes not reachable as attributes, keyed by node name
    pub fn register_implicit_nodes<I>(&self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = ObjectRef>,
    {
        let mut implicit = self.implicit_nodes.borrow_mut();
        for node in nodes {
            implicit.insert(node.base().name(), node)?;
        }
        Ok(())
    }

    /// Register child nodes under caller-given keys
    pub fn register_implicit_named_nodes<K, I>(&self, nodes: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ObjectRef)>,
    {
        let mut implicit = self.implicit_nodes.borrow_mut();
        for (key, node) in nodes {
            implicit.insert(key, node)?;
        }
        Ok(())
    }

    /// Register child nodes that must all be of type `K`
    ///
    /// # Errors
    ///
    /// `InvalidNodeKind` on the first node of another type; nothing is
    /// registered in that case.
    pub fn register_implicit_nodes_of<K, I>(&self, nodes: I) -> Result<()>
    where
        K: BrainObject,
        I: IntoIterator<Item = ObjectRef>,
    {
        let nodes: Vec<ObjectRef> = nodes.into_iter().collect();
        if let Some(bad) = nodes.iter().find(|n| !n.as_any().is::<K>()) {
            return Err(BrainJitError::InvalidNodeKind {
                expected: short_type_name::<K>(),
                actual: bad.base().type_name().to_string(),
            });
        }
        self.register_implicit_nodes(nodes)
    }

    pub fn implicit_vars(&self) -> Ref<'_, Collector<Variable>> {
        self.implicit_vars.borrow()
    }

    pub fn implicit_nodes(&self) -> Ref<'_, Collector<ObjectRef>> {
        self.implicit_nodes.borrow()
    }

    /// Attribute children then implicit children, in declaration order
    fn children(&self) -> Vec<(String, ObjectRef)> {
        let mut out = self.attr_nodes.borrow().clone();
        out.extend(self.implicit_nodes.borrow().iter().cloned());
        out
    }

    fn attr_vars(&self) -> Vec<(String, Variable)> {
        let excluded = self.excluded_vars.borrow();
        self.attr_vars
            .borrow()
            .iter()
            .filter(|(k, _)| !excluded.contains(k))
            .cloned()
            .collect()
    }
}

impl Drop for ObjectBase {
    fn drop(&mut self) {
        self.ctx.naming().release(self.name.get_mut(), &self.token);
    }
}

impl Collectable for ObjectRef {
    type Kind = TypeId;

    fn identity(&self) -> u64 {
        self.base().id()
    }

    fn type_name(&self) -> String {
        self.base().type_name().to_string()
    }

    fn is_kind(&self, kind: &TypeId) -> bool {
        Any::type_id(self.as_any()) == *kind
    }

    fn same_kind(&self, other: &Self) -> bool {
        Any::type_id(self.as_any()) == Any::type_id(other.as_any())
    }
}

/// How traversal keys its results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMethod {
    /// Flat namespace keyed by each node's own name
    #[default]
    Absolute,
    /// Dotted attribute path from the root
    Relative,
}

/// Traversal options for `nodes()` / `vars()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traverse {
    pub method: PathMethod,
    /// Maximum depth below the root; `None` is unbounded
    pub level: Option<usize>,
    pub include_self: bool,
}

impl Default for Traverse {
    fn default() -> Self {
        Self {
            method: PathMethod::Absolute,
            level: None,
            include_self: true,
        }
    }
}

impl Traverse {
    pub fn relative() -> Self {
        Self {
            method: PathMethod::Relative,
            ..Self::default()
        }
    }

    pub fn level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn include_self(mut self, include_self: bool) -> Self {
        self.include_self = include_self;
        self
    }
}

/// Outcome of [`ObjectGraph::load_state_dict`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateLoadResult {
    pub missing_keys: Vec<String>,
    pub unexpected_keys: Vec<String>,
}

fn find_nodes(
    node: &ObjectRef,
    opts: &Traverse,
    lid: usize,
    edges: &mut AHashSet<(u64, u64)>,
) -> Result<Collector<ObjectRef>> {
    let mut gather = Collector::new();
    if opts.include_self {
        let key = match opts.method {
            PathMethod::Absolute => node.base().name(),
            PathMethod::Relative => String::new(),
        };
        gather.insert(key, node.clone())?;
    }
    if opts.level.is_some_and(|level| lid >= level) {
        return Ok(gather);
    }

    let parent = node.base().id();
    let mut next = Vec::new();
    for (key, child) in node.base().children() {
        if edges.insert((parent, child.base().id())) {
            let key = match opts.method {
                PathMethod::Absolute => child.base().name(),
                PathMethod::Relative => key,
            };
            gather.insert(key.clone(), child.clone())?;
            next.push((key, child));
        }
    }

    for (k1, child) in next {
        let sub = find_nodes(&child, opts, lid + 1, edges)?;
        match opts.method {
            PathMethod::Absolute => gather.update(&sub)?,
            PathMethod::Relative => {
                for (k2, grandchild) in sub.iter() {
                    if !k2.is_empty() {
                        gather.insert(format!("{}.{}", k1, k2), grandchild.clone())?;
                    }
                }
            }
        }
    }
    Ok(gather)
}

fn var_key(node_path: &str, attr: &str) -> String {
    if node_path.is_empty() {
        attr.to_string()
    } else {
        format!("{}.{}", node_path, attr)
    }
}

/// Traversal, collection and persistence over any node
pub trait ObjectGraph: AsObject {
    /// Every node reachable from this one, this one included
    fn nodes(&self) -> Result<Collector<ObjectRef>> {
        self.nodes_with(&Traverse::default())
    }

    /// Reachable nodes; an edge (parent, child) is followed at most once
    fn nodes_with(&self, opts: &Traverse) -> Result<Collector<ObjectRef>> {
        let mut edges = AHashSet::new();
        find_nodes(&self.to_object(), opts, 0, &mut edges)
    }

    /// Every variable, variable views excluded
    fn vars(&self) -> Result<Collector<Variable>> {
        self.vars_with(&Traverse::default(), &[VarKind::VariableView])
    }

    /// Attribute variables not of an `exclude` kind, plus implicit variables,
    /// for every node `nodes_with(opts)` finds
    fn vars_with(&self, opts: &Traverse, exclude: &[VarKind]) -> Result<Collector<Variable>> {
        let mut gather = Collector::new();
        for (node_path, node) in self.nodes_with(opts)?.iter() {
            for (attr, var) in node.base().attr_vars() {
                if exclude.iter().any(|kind| var.kind().is_a(kind)) {
                    continue;
                }
                gather.insert(var_key(node_path, &attr), var)?;
            }
            for (key, var) in node.base().implicit_vars().iter() {
                gather.insert(var_key(node_path, key), var.clone())?;
            }
        }
        Ok(gather)
    }

    /// Trainable variables only
    fn train_vars(&self) -> Result<Collector<Variable>> {
        Ok(self.vars()?.subset(Selector::Kind(VarKind::TrainVar)))
    }

    fn train_vars_with(&self, opts: &Traverse) -> Result<Collector<Variable>> {
        Ok(self
            .vars_with(opts, &[VarKind::VariableView])?
            .subset(Selector::Kind(VarKind::TrainVar)))
    }

    /// Raw value of every unique variable
    fn state_dict(&self) -> Result<StateMap> {
        Ok(self.vars()?.unique().dict())
    }

    /// Overwrite every variable whose key appears in `state`
    ///
    /// Key mismatches are reported, never raised.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if a provided value has the wrong shape; no variable
    /// is written in that case.
    fn load_state_dict(&self, state: &StateMap, warn: bool) -> Result<StateLoadResult> {
        let variables = self.vars()?.unique();
        let mut result = StateLoadResult::default();
        let mut pending = Vec::new();
        for (key, var) in variables.iter() {
            match state.get(key) {
                Some(value) => {
                    var.check_shape(key, value)?;
                    pending.push((var, value));
                }
                None => result.missing_keys.push(key.clone()),
            }
        }
        result.unexpected_keys = state
            .keys()
            .filter(|k| !variables.contains_key(k))
            .cloned()
            .collect();

        for (var, value) in pending {
            var.set_value(value.clone())?;
        }

        if warn {
            if !result.unexpected_keys.is_empty() {
                warn!(keys = ?result.unexpected_keys, "Unexpected keys in state_dict");
            }
            if !result.missing_keys.is_empty() {
                warn!(keys = ?result.missing_keys, "Missing keys in state_dict");
            }
        }
        Ok(result)
    }

    /// Write `variables` (all of `vars()` by default) with the codec
    /// registered for the file extension
    fn save_states(&self, path: &Path, variables: Option<&Collector<Variable>>) -> Result<()> {
        let object = self.to_object();
        let state = match variables {
            Some(vars) => vars.dict(),
            None => self.vars()?.dict(),
        };
        let ctx = object.base().context();
        let codec = ctx.codec_for(path)?;
        codec.save(path, &state)?;
        info!(
            object = %object.base().name(),
            path = %path.display(),
            codec = codec.name(),
            variables = state.len(),
            "states saved"
        );
        Ok(())
    }

    /// Read a state file and load it through `load_state_dict`
    fn load_states(&self, path: &Path) -> Result<StateLoadResult> {
        if !path.exists() {
            return Err(BrainJitError::FileNotFound(path.to_path_buf()));
        }
        let object = self.to_object();
        let ctx = object.base().context();
        let codec = ctx.codec_for(path)?;
        let state = codec.load(path)?;
        let result = self.load_state_dict(&state, ctx.warn_on_mismatch())?;
        info!(
            object = %object.base().name(),
            path = %path.display(),
            codec = codec.name(),
            variables = state.len(),
            "states loaded"
        );
        Ok(result)
    }
}

impl<T: AsObject + ?Sized> ObjectGraph for T {}
