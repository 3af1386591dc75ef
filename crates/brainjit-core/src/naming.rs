// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unique object names
//!
//! Names are `{type_name}{counter}` with one counter per type. The registry
//! holds weak references to each holder's [`NameToken`], so a name is only
//! reserved while its object is alive.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::trace;

use crate::error::{BrainJitError, Result};

/// Liveness marker owned by a named object
#[derive(Debug)]
pub struct NameToken {
    owner: u64,
}

impl NameToken {
    pub fn new(owner: u64) -> Rc<Self> {
        Rc::new(Self { owner })
    }

    pub fn owner(&self) -> u64 {
        self.owner
    }
}

#[derive(Debug, Default)]
pub struct NameRegistry {
    counters: RefCell<AHashMap<String, u64>>,
    live: RefCell<AHashMap<String, Weak<NameToken>>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh name for `type_name`, skipping any name a live object holds
    ///
    /// Counters only grow, so an auto-generated name is never handed out
    /// twice by the same registry.
    pub fn get_unique_name(&self, type_name: &str) -> String {
        let mut counters = self.counters.borrow_mut();
        let counter = counters.entry(type_name.to_string()).or_insert(0);
        loop {
            let name = format!("{}{}", type_name, *counter);
            *counter += 1;
            if !self.is_live(&name) {
                return name;
            }
        }
    }

    /// Reserve `name` for `token`
    ///
    /// Re-registering the same holder is a no-op.
    ///
    /// # Errors
    ///
    /// `Naming` if another live object already holds `name`.
    pub fn check_name_uniqueness(&self, name: &str, token: &Rc<NameToken>) -> Result<()> {
        let mut live = self.live.borrow_mut();
        if let Some(existing) = live.get(name).and_then(Weak::upgrade) {
            if !Rc::ptr_eq(&existing, token) {
                return Err(BrainJitError::Naming(format!(
                    "In the current context, name \"{}\" is already used by object {} (requested by {})",
                    name,
                    existing.owner(),
                    token.owner()
                )));
            }
            return Ok(());
        }
        live.insert(name.to_string(), Rc::downgrade(token));
        trace!(name, owner = token.owner(), "name reserved");
        Ok(())
    }

    /// Free `name` if `token` holds it
    pub fn release(&self, name: &str, token: &NameToken) {
        let mut live = self.live.borrow_mut();
        let held_by_token = live
            .get(name)
            .map(|weak| std::ptr::eq(weak.as_ptr(), token) || weak.strong_count() == 0)
            .unwrap_or(false);
        if held_by_token {
            live.remove(name);
        }
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.live
            .borrow()
            .get(name)
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.live
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
