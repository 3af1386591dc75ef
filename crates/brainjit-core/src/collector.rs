// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ordered, conflict-checked collections of variables and nodes

use std::fmt;

use ahash::{AHashMap, AHashSet};

use crate::error::{BrainJitError, Result};
use crate::value::{Array, StateMap};
use crate::variable::Variable;

/// Something a [`Collector`] can hold: it has a stable identity and a kind
pub trait Collectable: Clone {
    type Kind;

    /// Reference identity, unique across every context
    fn identity(&self) -> u64;

    fn type_name(&self) -> String;

    fn is_kind(&self, kind: &Self::Kind) -> bool;

    fn same_kind(&self, other: &Self) -> bool;
}

/// Matching modes for [`Collector::subset`]
pub enum Selector<'a, T: Collectable> {
    /// Values of this kind (or a sub-kind)
    Kind(T::Kind),
    /// Values whose type name starts with this prefix
    Prefix(&'a str),
    /// Values of the same kind as an exemplar
    SameKindAs(&'a T),
}

impl<T: Collectable> Selector<'_, T> {
    fn matches(&self, value: &T) -> bool {
        match self {
            Selector::Kind(kind) => value.is_kind(kind),
            Selector::Prefix(prefix) => value.type_name().starts_with(prefix),
            Selector::SameKindAs(exemplar) => exemplar.same_kind(value),
        }
    }
}

/// Insertion-ordered mapping from key to value
///
/// A key can only be re-bound to the object it already holds.
#[derive(Clone)]
pub struct Collector<T: Collectable> {
    entries: Vec<(String, T)>,
    index: AHashMap<String, usize>,
}

impl<T: Collectable> Default for Collector<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<T: Collectable> Collector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs, failing on the first conflicting key
    pub fn try_from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        let mut collector = Self::new();
        for (key, value) in pairs {
            collector.insert(key, value)?;
        }
        Ok(collector)
    }

    /// Bind `key` to `value`
    ///
    /// # Errors
    ///
    /// `Conflict` if `key` already holds an object with another identity.
    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        if let Some(&pos) = self.index.get(&key) {
            let existing = &self.entries[pos].1;
            if existing.identity() != value.identity() {
                return Err(BrainJitError::Conflict {
                    key,
                    existing: describe(existing),
                    incoming: describe(&value),
                });
            }
            return Ok(());
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    /// Unconditionally bind `key` to `value`; the key moves to the end
    pub fn replace(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        self.remove(&key);
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let pos = self.index.remove(key)?;
        let (_, value) = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Insert every entry of `other`; conflicts propagate
    pub fn update(&mut self, other: &Collector<T>) -> Result<()> {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone())?;
        }
        Ok(())
    }

    /// A new collector holding `self` followed by `other`
    pub fn merged(&self, other: &Collector<T>) -> Result<Self> {
        let mut gather = self.clone();
        gather.update(other)?;
        Ok(gather)
    }

    pub fn subset(&self, selector: Selector<'_, T>) -> Self {
        self.filter(|_, value| selector.matches(value))
    }

    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&str, &T) -> bool,
    {
        let mut gather = Self::new();
        for (key, value) in self.iter() {
            if predicate(key, value) {
                gather.index.insert(key.clone(), gather.entries.len());
                gather.entries.push((key.clone(), value.clone()));
            }
        }
        gather
    }

    /// First key per identity, in insertion order
    pub fn unique(&self) -> Self {
        let mut seen = AHashSet::new();
        self.filter(|_, value| seen.insert(value.identity()))
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, T)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn describe<T: Collectable>(value: &T) -> String {
    format!("{}#{}", value.type_name(), value.identity())
}

impl<'a, T: Collectable> IntoIterator for &'a Collector<T> {
    type Item = &'a (String, T);
    type IntoIter = std::slice::Iter<'a, (String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<T: Collectable> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, describe(v))))
            .finish()
    }
}

impl Collector<Variable> {
    /// Current raw value of every variable, keyed like the collector
    pub fn dict(&self) -> StateMap {
        self.iter()
            .map(|(key, var)| (key.clone(), var.value()))
            .collect()
    }

    /// Raw values in insertion order
    pub fn data(&self) -> Vec<Array> {
        self.values().map(Variable::value).collect()
    }

    /// Overwrite every variable from `inputs`
    ///
    /// All keys and shapes are checked before anything is written.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a length or key mismatch, `ShapeMismatch` if a
    /// value has the wrong shape.
    pub fn assign(&self, inputs: &StateMap) -> Result<()> {
        if self.len() != inputs.len() {
            return Err(BrainJitError::InvalidArgument(format!(
                "the target has {} variables, while the input has {} values",
                self.len(),
                inputs.len()
            )));
        }
        let mut pending = Vec::with_capacity(self.len());
        for (key, var) in self.iter() {
            let value = inputs.get(key).ok_or_else(|| {
                BrainJitError::InvalidArgument(format!("no input value for variable '{}'", key))
            })?;
            var.check_shape(key, value)?;
            pending.push((var, value));
        }
        for (var, value) in pending {
            var.set_value(value.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::value::{array1, scalar};
    use crate::variable::VarKind;

    #[test]
    fn test_rebind_same_identity_ok_other_conflicts() {
        let ctx = Context::new();
        let h1 = ctx.variable(scalar(1.0));
        let h2 = ctx.variable(scalar(1.0));
        let mut c = Collector::new();
        c.insert("x", h1.clone()).unwrap();
        c.insert("x", h1).unwrap();
        assert_eq!(c.len(), 1);
        let err = c.insert("x", h2).unwrap_err();
        assert!(matches!(err, BrainJitError::Conflict { ref key, .. } if key == "x"));
    }

    #[test]
    fn test_handles_from_separate_contexts_stay_distinct() {
        let first = Context::new();
        let second = Context::new();
        let a = first.variable(scalar(1.0));
        let b = second.variable(scalar(2.0));
        assert_ne!(a.identity(), b.identity());

        let mut c = Collector::new();
        c.insert("x", a.clone()).unwrap();
        assert!(matches!(c.insert("x", b.clone()), Err(BrainJitError::Conflict { .. })));

        let both = Collector::try_from_pairs(vec![("a".to_string(), a), ("b".to_string(), b)]).unwrap();
        assert_eq!(both.unique().len(), 2);
    }

    #[test]
    fn test_update_propagates_conflict() {
        let ctx = Context::new();
        let mut a = Collector::new();
        a.insert("x", ctx.variable(scalar(1.0))).unwrap();
        let mut b = Collector::new();
        b.insert("x", ctx.variable(scalar(2.0))).unwrap();
        assert!(a.update(&b).is_err());
        assert!(a.merged(&b).is_err());
    }

    #[test]
    fn test_unique_keeps_first_key() {
        let ctx = Context::new();
        let v = ctx.variable(scalar(1.0));
        let w = ctx.variable(scalar(2.0));
        let c = Collector::try_from_pairs(vec![
            ("a".to_string(), v.clone()),
            ("b".to_string(), w),
            ("c".to_string(), v),
        ])
        .unwrap();
        let keys: Vec<_> = c.unique().keys().map(str::to_string).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_subset_modes() {
        let ctx = Context::new();
        let plain = ctx.variable(scalar(0.0));
        let train = ctx.train_var(scalar(0.0));
        let param = ctx.parameter(scalar(0.0));
        let c = Collector::try_from_pairs(vec![
            ("plain".to_string(), plain),
            ("train".to_string(), train.clone()),
            ("param".to_string(), param),
        ])
        .unwrap();

        assert_eq!(c.subset(Selector::Kind(VarKind::Variable)).len(), 3);
        assert_eq!(c.subset(Selector::Kind(VarKind::TrainVar)).len(), 1);
        let by_prefix: Vec<_> = c.subset(Selector::Prefix("Param")).keys().map(str::to_string).collect();
        assert_eq!(by_prefix, vec!["param"]);
        let same: Vec<_> = c.subset(Selector::SameKindAs(&train)).keys().map(str::to_string).collect();
        assert_eq!(same, vec!["train"]);
    }

    #[test]
    fn test_replace_and_remove_keep_index() {
        let ctx = Context::new();
        let mut c = Collector::new();
        c.insert("a", ctx.variable(scalar(1.0))).unwrap();
        c.insert("b", ctx.variable(scalar(2.0))).unwrap();
        c.replace("a", ctx.variable(scalar(3.0)));
        let keys: Vec<_> = c.keys().map(str::to_string).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(c.get("a").unwrap().value(), scalar(3.0));
        assert!(c.remove("b").is_some());
        assert_eq!(c.get("a").unwrap().value(), scalar(3.0));
    }

    #[test]
    fn test_assign_checks_before_writing() {
        let ctx = Context::new();
        let a = ctx.variable(scalar(1.0));
        let b = ctx.variable(array1(&[1.0, 2.0]));
        let c = Collector::try_from_pairs(vec![("a".to_string(), a.clone()), ("b".to_string(), b)]).unwrap();

        let mut bad = StateMap::new();
        bad.insert("a".to_string(), scalar(5.0));
        bad.insert("b".to_string(), scalar(5.0));
        assert!(matches!(c.assign(&bad), Err(BrainJitError::ShapeMismatch { .. })));
        assert_eq!(a.value(), scalar(1.0));

        let mut good = c.dict();
        good.insert("a".to_string(), scalar(7.0));
        c.assign(&good).unwrap();
        assert_eq!(c.data()[0], scalar(7.0));
    }
}
