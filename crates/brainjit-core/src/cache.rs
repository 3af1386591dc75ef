// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transform cache
//!
//! Maps a call site (target, owning object, static arguments) to the
//! variables discovered for it and the compiled pure function. Entries are
//! never evicted automatically.

use std::cell::RefCell;

use ahash::AHashMap;

use crate::collector::Collector;
use crate::engine::CompiledFn;
use crate::error::Result;
use crate::value::{StaticKey, Value};
use crate::variable::Variable;

/// Identity of a wrapped function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

/// Where a static argument was passed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StaticSlot {
    Position(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target: TargetId,
    /// Object id when the target is bound to an instance
    pub owner: Option<u64>,
    pub statics: Vec<(StaticSlot, StaticKey)>,
}

impl CacheKey {
    /// # Errors
    ///
    /// `UnhashableStatic` if a static argument cannot be hashed.
    pub fn new(target: TargetId, owner: Option<u64>, statics: &[(StaticSlot, Value)]) -> Result<Self> {
        let statics = statics
            .iter()
            .map(|(slot, value)| value.static_key().map(|key| (slot.clone(), key)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            target,
            owner,
            statics,
        })
    }
}

/// Discovered variables and the compiled function for one call site
#[derive(Clone)]
pub struct CacheEntry {
    pub stack: Collector<Variable>,
    pub compiled: CompiledFn,
}

#[derive(Default)]
pub struct TransformCache {
    entries: RefCell<AHashMap<CacheKey, CacheEntry>>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn store(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.borrow_mut().insert(key, entry);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Drop every entry of `target`; returns how many were removed
    pub fn invalidate(&self, target: TargetId) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|key, _| key.target != target);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of entries for `target`
    pub fn entries_for(&self, target: TargetId) -> usize {
        self.entries
            .borrow()
            .keys()
            .filter(|key| key.target == target)
            .count()
    }
}
