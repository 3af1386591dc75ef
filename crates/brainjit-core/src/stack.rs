// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Trace scopes that discover which variables a function touches
//!
//! Entering a scope pushes a fresh collector; every variable read or write
//! is recorded into the innermost scope only. Leaving the scope pops it and
//! hands back what it collected. A restoring scope also remembers each
//! variable's value at first touch and puts it back on exit, so discovery
//! runs leave no side effects.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::trace;

use crate::collector::Collector;
use crate::value::Array;
use crate::variable::Variable;

struct Scope {
    vars: Collector<Variable>,
    originals: AHashMap<u64, Array>,
    restore: bool,
}

#[derive(Clone, Default)]
pub struct VariableStack {
    scopes: Rc<RefCell<Vec<Scope>>>,
}

impl VariableStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording into a new scope
    pub fn enter(&self) -> StackGuard {
        self.push(false)
    }

    /// Start recording into a new scope that undoes its writes on exit
    pub fn enter_restoring(&self) -> StackGuard {
        self.push(true)
    }

    fn push(&self, restore: bool) -> StackGuard {
        let mut scopes = self.scopes.borrow_mut();
        scopes.push(Scope {
            vars: Collector::new(),
            originals: AHashMap::new(),
            restore,
        });
        trace!(depth = scopes.len(), restore, "variable stack scope entered");
        StackGuard {
            stack: self.clone(),
            depth: scopes.len(),
            finished: false,
        }
    }

    /// Attribute an access of `var` to the innermost scope
    pub(crate) fn record(&self, var: &Variable) {
        let mut scopes = self.scopes.borrow_mut();
        let Some(top) = scopes.last_mut() else {
            return;
        };
        let key = format!("var{}", var.id());
        if top.vars.contains_key(&key) {
            return;
        }
        if top.restore {
            top.originals.insert(var.id().0, var.raw().clone());
        }
        top.vars.replace(key, var.clone());
    }

    pub fn depth(&self) -> usize {
        self.scopes.borrow().len()
    }

    pub fn is_tracing(&self) -> bool {
        self.depth() > 0
    }

    /// Pop the scope at `depth` together with anything nested above it
    fn pop_to(&self, depth: usize) -> Collector<Variable> {
        let popped: Vec<Scope> = {
            let mut scopes = self.scopes.borrow_mut();
            if depth == 0 || scopes.len() < depth {
                return Collector::new();
            }
            scopes.drain(depth - 1..).collect()
        };
        // Innermost first, so the outer scope's originals win.
        for scope in popped.iter().rev() {
            if scope.restore {
                for var in scope.vars.values() {
                    if let Some(original) = scope.originals.get(&var.id().0) {
                        var.replace_raw(original.clone());
                    }
                }
            }
        }
        trace!(depth, "variable stack scope exited");
        popped
            .into_iter()
            .next()
            .map(|scope| scope.vars)
            .unwrap_or_default()
    }
}

/// Active scope; dropping it without [`StackGuard::finish`] discards the
/// collected variables
#[must_use = "dropping the guard immediately closes the scope"]
pub struct StackGuard {
    stack: VariableStack,
    depth: usize,
    finished: bool,
}

impl StackGuard {
    /// Close the scope and return every variable it recorded
    pub fn finish(mut self) -> Collector<Variable> {
        self.finished = true;
        self.stack.pop_to(self.depth)
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.stack.pop_to(self.depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::value::scalar;

    #[test]
    fn test_idle_tracing_idle() {
        let ctx = Context::new();
        let stack = ctx.stack();
        assert!(!stack.is_tracing());
        let guard = stack.enter();
        assert!(stack.is_tracing());
        let found = guard.finish();
        assert!(found.is_empty());
        assert!(!stack.is_tracing());
    }

    #[test]
    fn test_records_reads_and_writes_once() {
        let ctx = Context::new();
        let v = ctx.variable(scalar(1.0));
        let w = ctx.variable(scalar(2.0));
        let guard = ctx.stack().enter();
        let _ = v.value();
        let _ = v.value();
        w.set_value(scalar(3.0)).unwrap();
        let found = guard.finish();
        assert_eq!(found.len(), 2);
        assert_eq!(w.value(), scalar(3.0));
    }

    #[test]
    fn test_innermost_scope_only() {
        let ctx = Context::new();
        let v = ctx.variable(scalar(1.0));
        let w = ctx.variable(scalar(1.0));
        let outer = ctx.stack().enter();
        let _ = v.value();
        let inner = ctx.stack().enter();
        let _ = w.value();
        let inner_found = inner.finish();
        let outer_found = outer.finish();
        assert_eq!(inner_found.len(), 1);
        assert!(inner_found.values().next().unwrap().ptr_eq(&w));
        assert_eq!(outer_found.len(), 1);
        assert!(outer_found.values().next().unwrap().ptr_eq(&v));
    }

    #[test]
    fn test_restoring_scope_undoes_writes() {
        let ctx = Context::new();
        let v = ctx.variable(scalar(1.0));
        let guard = ctx.stack().enter_restoring();
        v.set_value(scalar(5.0)).unwrap();
        v.set_value(scalar(6.0)).unwrap();
        let found = guard.finish();
        assert_eq!(found.len(), 1);
        assert_eq!(v.value(), scalar(1.0));
    }

    #[test]
    fn test_dropped_guard_pops_scope() {
        let ctx = Context::new();
        let v = ctx.variable(scalar(1.0));
        {
            let _guard = ctx.stack().enter_restoring();
            v.set_value(scalar(2.0)).unwrap();
        }
        assert_eq!(ctx.stack().depth(), 0);
        assert_eq!(v.value(), scalar(1.0));
    }
}
