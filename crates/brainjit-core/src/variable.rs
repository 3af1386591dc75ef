// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! State handles
//!
//! A [`Variable`] is a shared, mutable array with reference identity.
//! Cloning a `Variable` clones the handle, not the data. Every read and
//! write goes through the owning context's [`VariableStack`] so an active
//! trace scope can discover it.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::collector::Collectable;
use crate::error::{BrainJitError, Result};
use crate::stack::VariableStack;
use crate::value::Array;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u64);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sub-kinds of state handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Plain dynamical state
    Variable,
    /// Trainable state
    TrainVar,
    Parameter,
    /// Alias of another variable's storage; skipped by `vars()` by default
    VariableView,
}

impl VarKind {
    pub fn name(&self) -> &'static str {
        match self {
            VarKind::Variable => "Variable",
            VarKind::TrainVar => "TrainVar",
            VarKind::Parameter => "Parameter",
            VarKind::VariableView => "VariableView",
        }
    }

    /// Sub-kind check: every kind is a `Variable`
    pub fn is_a(&self, other: &VarKind) -> bool {
        self == other || *other == VarKind::Variable
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct VarInner {
    id: VarId,
    kind: VarKind,
    value: Rc<RefCell<Array>>,
    stack: VariableStack,
}

#[derive(Clone)]
pub struct Variable(Rc<VarInner>);

impl Variable {
    pub(crate) fn new(id: VarId, kind: VarKind, value: Array, stack: VariableStack) -> Self {
        Self(Rc::new(VarInner {
            id,
            kind,
            value: Rc::new(RefCell::new(value)),
            stack,
        }))
    }

    /// New handle with its own identity over `target`'s storage
    pub(crate) fn view_of(id: VarId, target: &Variable) -> Self {
        Self(Rc::new(VarInner {
            id,
            kind: VarKind::VariableView,
            value: Rc::clone(&target.0.value),
            stack: target.0.stack.clone(),
        }))
    }

    pub fn id(&self) -> VarId {
        self.0.id
    }

    pub fn kind(&self) -> VarKind {
        self.0.kind
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.value.borrow().shape().to_vec()
    }

    /// Copy of the current value
    pub fn value(&self) -> Array {
        self.0.stack.record(self);
        self.0.value.borrow().clone()
    }

    /// Borrow the current value without copying
    pub fn with_value<R>(&self, f: impl FnOnce(&Array) -> R) -> R {
        self.0.stack.record(self);
        f(&self.0.value.borrow())
    }

    /// Overwrite the value in place
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `value` does not have the current shape.
    pub fn set_value(&self, value: Array) -> Result<()> {
        self.check_shape(&format!("var{}", self.0.id), &value)?;
        self.0.stack.record(self);
        *self.0.value.borrow_mut() = value;
        Ok(())
    }

    /// Replace the value with `f(current)`
    pub fn update(&self, f: impl FnOnce(&Array) -> Array) -> Result<()> {
        let next = f(&self.value());
        self.set_value(next)
    }

    pub fn ptr_eq(&self, other: &Variable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Current value without recording the access
    pub(crate) fn raw(&self) -> Ref<'_, Array> {
        self.0.value.borrow()
    }

    /// Overwrite without recording or checking shape
    pub(crate) fn replace_raw(&self, value: Array) {
        *self.0.value.borrow_mut() = value;
    }

    /// Write a compiled result back into the handle
    pub(crate) fn write_back(&self, key: &str, value: Array) -> Result<()> {
        self.check_shape(key, &value)?;
        self.0.stack.record(self);
        *self.0.value.borrow_mut() = value;
        Ok(())
    }

    pub(crate) fn check_shape(&self, key: &str, value: &Array) -> Result<()> {
        let current = self.0.value.borrow();
        if current.shape() != value.shape() {
            return Err(BrainJitError::ShapeMismatch {
                target: key.to_string(),
                expected: current.shape().to_vec(),
                actual: value.shape().to_vec(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(id={}, shape={:?})",
            self.0.kind,
            self.0.id,
            self.0.value.borrow().shape()
        )
    }
}

impl Collectable for Variable {
    type Kind = VarKind;

    fn identity(&self) -> u64 {
        self.0.id.0
    }

    fn type_name(&self) -> String {
        self.0.kind.name().to_string()
    }

    fn is_kind(&self, kind: &VarKind) -> bool {
        self.0.kind.is_a(kind)
    }

    fn same_kind(&self, other: &Self) -> bool {
        self.0.kind == other.0.kind
    }
}
