// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end behavior of naming, collectors, the object graph and the
//! object-transform wrappers, checked through a counting engine.

use std::cell::Cell;
use std::rc::Rc;

use brainjit::core::{CompiledFn, PureFn};
use brainjit::prelude::*;

/// Eager engine that counts shape evaluations, compilations and invocations
#[derive(Default)]
struct CountingEngine {
    inner: EagerEngine,
    shape_evals: Cell<usize>,
    compiles: Cell<usize>,
    invocations: Rc<Cell<usize>>,
}

impl NumericEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    fn eval_shape(&self, f: &dyn Fn(&CallArgs) -> Result<Value>, args: &CallArgs) -> Result<Value> {
        self.shape_evals.set(self.shape_evals.get() + 1);
        self.inner.eval_shape(f, args)
    }

    fn compile(&self, pure: PureFn, options: &JitOptions) -> Result<CompiledFn> {
        self.compiles.set(self.compiles.get() + 1);
        let compiled = self.inner.compile(pure, options)?;
        let invocations = Rc::clone(&self.invocations);
        Ok(Rc::new(move |state: StateMap, args: &CallArgs| -> Result<(Value, StateMap)> {
            invocations.set(invocations.get() + 1);
            compiled(state, args)
        }))
    }
}

fn counting_context() -> (Context, Rc<CountingEngine>) {
    let engine = Rc::new(CountingEngine::default());
    let ctx = Context::builder().engine(engine.clone()).build();
    (ctx, engine)
}

struct Node {
    base: ObjectBase,
}
brainjit::brain_object!(Node);

impl Node {
    fn new(ctx: &Context, name: Option<&str>) -> Rc<Self> {
        Rc::new(Self {
            base: ObjectBase::of::<Self>(ctx, name).unwrap(),
        })
    }
}

struct Counter {
    base: ObjectBase,
    count: Variable,
}
brainjit::brain_object!(Counter);

impl Counter {
    fn new(ctx: &Context) -> Rc<Self> {
        let base = ObjectBase::of::<Self>(ctx, None).unwrap();
        let count = ctx.variable(scalar(0.0));
        base.register_var("count", &count);
        Rc::new(Self { base, count })
    }

    fn inc(&self, _args: &CallArgs) -> Result<Value> {
        self.count.update(|c| c + 1.0)?;
        Ok(Value::None)
    }
}

#[test]
fn test_live_names_are_distinct_and_reusable_after_drop() {
    let ctx = Context::new();
    let a = Node::new(&ctx, None);
    let b = Node::new(&ctx, None);
    assert_ne!(a.base.name(), b.base.name());

    let chosen = Node::new(&ctx, Some("cortex"));
    assert!(matches!(
        ObjectBase::of::<Node>(&ctx, Some("cortex")),
        Err(BrainJitError::Naming(_))
    ));
    drop(chosen);
    let again = Node::new(&ctx, Some("cortex"));
    assert_eq!(again.base.name(), "cortex");
}

#[test]
fn test_collector_rebinding_requires_same_identity() {
    let ctx = Context::new();
    let h1 = ctx.variable(scalar(1.0));
    let h2 = ctx.variable(scalar(1.0));
    let mut c = Collector::new();
    c.insert("x", h1.clone()).unwrap();
    c.insert("x", h1.clone()).unwrap();
    assert!(matches!(c.insert("x", h2), Err(BrainJitError::Conflict { .. })));
    assert_eq!(c.len(), 1);
}

#[test]
fn test_state_dict_round_trip_is_clean() {
    let ctx = Context::new();
    let net = Node::new(&ctx, Some("net"));
    let a = ctx.variable(scalar(1.0));
    let b = ctx.train_var(scalar(2.0));
    net.base.register_var("a", &a);
    net.base.register_var("b", &b);

    let state = net.state_dict().unwrap();
    assert_eq!(state.len(), 2);
    let result = net.load_state_dict(&state, true).unwrap();
    assert_eq!(result, StateLoadResult::default());
    assert_eq!(a.value(), scalar(1.0));
    assert_eq!(b.value(), scalar(2.0));
}

#[test]
fn test_wrapped_function_writes_state_and_reuses_cache() {
    let (ctx, engine) = counting_context();
    let v = ctx.variable(array1(&[1.0, 2.0]));
    let w = ctx.variable(array1(&[0.0, 0.0]));
    let (vc, wc) = (v.clone(), w.clone());
    let f = jit(
        &ctx,
        move |args: &CallArgs| -> Result<Value> {
            let x = args.float(0)?;
            wc.set_value(vc.with_value(|v| v * x))?;
            Ok(Value::None)
        },
        JitOptions::new(),
    )
    .unwrap();

    f.call(&CallArgs::new().arg(2.0)).unwrap();
    assert_eq!(w.value(), array1(&[2.0, 4.0]));
    f.call(&CallArgs::new().arg(3.0)).unwrap();
    assert_eq!(w.value(), array1(&[3.0, 6.0]));
    assert_eq!(v.value(), array1(&[1.0, 2.0]));

    assert_eq!(engine.shape_evals.get(), 1);
    assert_eq!(engine.compiles.get(), 1);
    assert_eq!(engine.invocations.get(), 2);
}

#[test]
fn test_implicit_cycle_traversal_terminates() {
    let ctx = Context::new();
    let a = Node::new(&ctx, Some("A"));
    let b = Node::new(&ctx, Some("B"));
    a.base.register_implicit_nodes([b.to_object()]).unwrap();
    b.base.register_implicit_nodes([a.to_object()]).unwrap();

    let nodes = a.nodes().unwrap();
    let keys: Vec<&str> = nodes.keys().collect();
    assert_eq!(keys, vec!["A", "B"]);
}

#[test]
fn test_each_static_value_gets_its_own_entry() {
    let (ctx, engine) = counting_context();
    let acc = ctx.variable(scalar(0.0));
    let handle = acc.clone();
    let f = jit(
        &ctx,
        move |args: &CallArgs| -> Result<Value> {
            let x = args.float(0)?;
            let factor = match args.str_arg(1, "mode")? {
                "train" => 1.0,
                _ => 0.0,
            };
            handle.update(|a| a + x * factor)?;
            Ok(Value::None)
        },
        JitOptions::new().static_argnums([1]),
    )
    .unwrap();

    f.call(&CallArgs::new().arg(2.0).arg("train")).unwrap();
    f.call(&CallArgs::new().arg(5.0).arg("eval")).unwrap();
    assert_eq!(ctx.cache().entries_for(f.target_id()), 2);
    f.call(&CallArgs::new().arg(1.0).arg("train")).unwrap();
    assert_eq!(ctx.cache().entries_for(f.target_id()), 2);
    assert_eq!(engine.compiles.get(), 2);
    assert_eq!(acc.value(), scalar(3.0));
}

#[test]
fn test_disabled_jit_calls_target_directly() {
    let (ctx, engine) = counting_context();
    let counter = Counter::new(&ctx);
    let inc = jit_method(&counter, Counter::inc, JitOptions::new()).unwrap();

    for _ in 0..3 {
        inc.call(&CallArgs::new()).unwrap();
    }
    assert_eq!(counter.count.value(), scalar(3.0));

    ctx.set_disable_jit(true);
    inc.call(&CallArgs::new()).unwrap();
    assert_eq!(counter.count.value(), scalar(4.0));
    assert_eq!(engine.invocations.get(), 3);
    assert_eq!(engine.compiles.get(), 1);
}

#[test]
fn test_instances_share_class_jit_but_not_entries() {
    let (ctx, engine) = counting_context();
    let first = Counter::new(&ctx);
    let second = Counter::new(&ctx);
    let inc = ClsJit::new(&ctx, Counter::inc, JitOptions::new()).unwrap();

    inc.call(&first, &CallArgs::new()).unwrap();
    inc.call(&first, &CallArgs::new()).unwrap();
    inc.call(&second, &CallArgs::new()).unwrap();

    assert_eq!(first.count.value(), scalar(2.0));
    assert_eq!(second.count.value(), scalar(1.0));
    assert_eq!(ctx.cache().entries_for(inc.target_id()), 2);
    assert_eq!(engine.compiles.get(), 2);
}

#[test]
fn test_public_eval_shape_leaves_state_untouched() {
    let ctx = Context::new();
    let counter = Counter::new(&ctx);
    let c = Rc::clone(&counter);
    let f = move |args: &CallArgs| -> Result<Value> {
        c.inc(args)?;
        Ok(Value::Array(c.count.value()))
    };
    let out = eval_shape(&ctx, &f, &CallArgs::new(), &[], &[]).unwrap();
    assert_eq!(out.shape(), Some(Vec::new()));
    assert_eq!(counter.count.value(), scalar(0.0));
}

#[test]
fn test_cache_invalidation_forces_rediscovery() {
    let (ctx, engine) = counting_context();
    let counter = Counter::new(&ctx);
    let inc = jit_method(&counter, Counter::inc, JitOptions::new()).unwrap();
    inc.call(&CallArgs::new()).unwrap();
    assert_eq!(ctx.cache().invalidate(inc.target_id()), 1);
    inc.call(&CallArgs::new()).unwrap();
    assert_eq!(engine.shape_evals.get(), 2);
    assert_eq!(counter.count.value(), scalar(2.0));
}

#[test]
fn test_signed_zero_static_shares_one_entry() {
    let (ctx, engine) = counting_context();
    let acc = ctx.variable(scalar(1.0));
    let handle = acc.clone();
    let f = jit(
        &ctx,
        move |args: &CallArgs| -> Result<Value> {
            let offset = args.float(0)?;
            handle.update(|a| a + offset)?;
            Ok(Value::None)
        },
        JitOptions::new().static_argnums([0]),
    )
    .unwrap();

    f.call(&CallArgs::new().arg(0.0)).unwrap();
    f.call(&CallArgs::new().arg(-0.0)).unwrap();
    assert_eq!(ctx.cache().entries_for(f.target_id()), 1);
    assert_eq!(engine.compiles.get(), 1);
    assert_eq!(acc.value(), scalar(1.0));
}
