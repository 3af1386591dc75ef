// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Values flowing through transformed calls
//!
//! A [`Value`] is a small tree of scalars, strings and `f64` arrays. Call
//! arguments and results use it so the numeric engine can map over leaves
//! without knowing the caller's concrete types.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{BrainJitError, Result};

/// The numeric payload of every variable
pub type Array = ArrayD<f64>;

/// Flat mapping from variable path to raw array
pub type StateMap = BTreeMap<String, Array>;

/// Zero-dimensional array holding `x`
pub fn scalar(x: f64) -> Array {
    ArrayD::from_elem(IxDyn(&[]), x)
}

/// One-dimensional array copied from `values`
pub fn array1(values: &[f64]) -> Array {
    Array1::from(values.to_vec()).into_dyn()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Array),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of a scalar leaf; single-element arrays count as scalars
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            Value::Array(a) if a.len() == 1 => a.iter().next().copied(),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Value::Array(a) => Some(a.shape().to_vec()),
            Value::Float(_) | Value::Int(_) => Some(Vec::new()),
            _ => None,
        }
    }

    /// Hashable key for a static argument
    ///
    /// # Errors
    ///
    /// `UnhashableStatic` for arrays, which cannot be baked into a compiled
    /// artifact.
    pub fn static_key(&self) -> Result<StaticKey> {
        Ok(match self {
            Value::None => StaticKey::None,
            Value::Bool(b) => StaticKey::Bool(*b),
            Value::Int(i) => StaticKey::Int(*i),
            Value::Float(x) => StaticKey::Float(float_bits(*x)),
            Value::Str(s) => StaticKey::Str(s.clone()),
            Value::Tuple(items) => StaticKey::Tuple(
                items
                    .iter()
                    .map(Value::static_key)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Array(a) => {
                return Err(BrainJitError::UnhashableStatic(format!(
                    "array of shape {:?}",
                    a.shape()
                )))
            }
        })
    }

    /// Shape-preserving placeholder: numeric leaves become zeros
    pub fn abstractify(&self) -> Value {
        self.tree_map(&mut |leaf| match leaf {
            Value::Array(a) => Value::Array(Array::zeros(a.raw_dim())),
            Value::Float(_) => Value::Float(0.0),
            other => other.clone(),
        })
    }

    /// Apply `f` to every non-tuple leaf, rebuilding tuples around the results
    pub fn tree_map(&self, f: &mut dyn FnMut(&Value) -> Value) -> Value {
        match self {
            Value::Tuple(items) => Value::Tuple(items.iter().map(|v| v.tree_map(f)).collect()),
            leaf => f(leaf),
        }
    }

    /// Leaves in depth-first order
    pub fn tree_leaves(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            Value::Tuple(items) => items.iter().for_each(|v| v.collect_leaves(out)),
            leaf => out.push(leaf),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

/// Hashable image of a static [`Value`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StaticKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Tuple(Vec<StaticKey>),
}

/// Positional and keyword arguments of one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.to_string(), value.into());
        self
    }

    /// Number of positional arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Value> {
        self.args.get(index).ok_or_else(|| {
            BrainJitError::InvalidArgument(format!(
                "positional argument {} missing ({} given)",
                index,
                self.args.len()
            ))
        })
    }

    pub fn get_kw(&self, name: &str) -> Result<&Value> {
        self.kwargs
            .get(name)
            .ok_or_else(|| BrainJitError::InvalidArgument(format!("keyword argument '{}' missing", name)))
    }

    pub fn array(&self, index: usize) -> Result<&Array> {
        let value = self.get(index)?;
        value.as_array().ok_or_else(|| {
            BrainJitError::InvalidArgument(format!(
                "argument {} is {}, expected array",
                index,
                value.type_name()
            ))
        })
    }

    pub fn float(&self, index: usize) -> Result<f64> {
        let value = self.get(index)?;
        value.as_float().ok_or_else(|| {
            BrainJitError::InvalidArgument(format!(
                "argument {} is {}, expected a scalar",
                index,
                value.type_name()
            ))
        })
    }

    /// String argument, looked up by position first, then by keyword
    pub fn str_arg(&self, index: usize, name: &str) -> Result<&str> {
        let value = match self.args.get(index) {
            Some(v) => v,
            None => self.get_kw(name)?,
        };
        value.as_str().ok_or_else(|| {
            BrainJitError::InvalidArgument(format!("argument '{}' is {}, expected str", name, value.type_name()))
        })
    }

    pub fn tree_map(&self, f: &mut dyn FnMut(&Value) -> Value) -> CallArgs {
        CallArgs {
            args: self.args.iter().map(|v| v.tree_map(f)).collect(),
            kwargs: self
                .kwargs
                .iter()
                .map(|(k, v)| (k.clone(), v.tree_map(f)))
                .collect(),
        }
    }
}

/// Bits of `x` with `-0.0` folded into `0.0` and every NaN into one
fn float_bits(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}
