// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static-argument handling and shape-only evaluation

use ahash::AHashSet;
use tracing::trace;

use crate::cache::StaticSlot;
use crate::collector::Collector;
use crate::context::Context;
use crate::error::{BrainJitError, Result};
use crate::value::{CallArgs, Value};
use crate::variable::Variable;

/// Static arguments pulled out of a call, with the remaining dynamic ones
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub statics: Vec<(StaticSlot, Value)>,
    pub dynamic: CallArgs,
}

/// Split `args` into static and dynamic parts
///
/// Static names that were not passed are ignored.
///
/// # Errors
///
/// `InvalidStaticArgs` if a static position is beyond the positional
/// arguments actually passed.
pub fn partition_static(args: &CallArgs, static_argnums: &[usize], static_argnames: &[String]) -> Result<Partition> {
    if let Some(bad) = static_argnums.iter().find(|&&i| i >= args.len()) {
        return Err(BrainJitError::InvalidStaticArgs(format!(
            "static_argnums {:?} refers to position {} but only {} positional arguments were passed",
            static_argnums,
            bad,
            args.len()
        )));
    }
    let positions: AHashSet<usize> = static_argnums.iter().copied().collect();

    let mut partition = Partition::default();
    for (i, arg) in args.args.iter().enumerate() {
        if positions.contains(&i) {
            partition.statics.push((StaticSlot::Position(i), arg.clone()));
        } else {
            partition.dynamic.args.push(arg.clone());
        }
    }
    for (name, arg) in &args.kwargs {
        if static_argnames.iter().any(|n| n == name) {
            partition.statics.push((StaticSlot::Name(name.clone()), arg.clone()));
        } else {
            partition.dynamic.kwargs.insert(name.clone(), arg.clone());
        }
    }
    Ok(partition)
}

/// Rebuild the full argument list from statics and dynamic arguments
pub fn merge_static(statics: &[(StaticSlot, Value)], dynamic: &CallArgs) -> CallArgs {
    let mut positional: Vec<(usize, &Value)> = statics
        .iter()
        .filter_map(|(slot, value)| match slot {
            StaticSlot::Position(i) => Some((*i, value)),
            StaticSlot::Name(_) => None,
        })
        .collect();
    positional.sort_by_key(|(i, _)| *i);

    let mut merged = dynamic.clone();
    for (i, value) in positional {
        let at = i.min(merged.args.len());
        merged.args.insert(at, value.clone());
    }
    for (slot, value) in statics {
        if let StaticSlot::Name(name) = slot {
            merged.kwargs.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Run `f` for output structure only inside a restoring variable scope
///
/// Nested inside another shape evaluation, `f` runs directly on the
/// already-abstract arguments.
pub(crate) fn evaluate(
    ctx: &Context,
    f: &dyn Fn(&CallArgs) -> Result<Value>,
    dynamic: &CallArgs,
) -> Result<(Value, Collector<Variable>)> {
    let guard = ctx.stack().enter_restoring();
    let out = if ctx.is_evaluating_shape() {
        trace!("nested shape evaluation runs directly");
        f(dynamic)?
    } else {
        let _eval = ctx.enter_eval();
        ctx.engine().eval_shape(f, dynamic)?
    };
    Ok((out, guard.finish()))
}

fn evaluate_partitioned(
    ctx: &Context,
    f: &dyn Fn(&CallArgs) -> Result<Value>,
    args: &CallArgs,
    static_argnums: &[usize],
    static_argnames: &[String],
) -> Result<(Value, Collector<Variable>)> {
    let Partition { statics, dynamic } = partition_static(args, static_argnums, static_argnames)?;
    for (_, value) in &statics {
        value.static_key()?;
    }
    let bound = |dyn_args: &CallArgs| f(&merge_static(&statics, dyn_args));
    evaluate(ctx, &bound, &dynamic)
}

/// Output structure of `f(args)` without real computation
///
/// Variables touched by `f` are put back afterwards.
pub fn eval_shape(
    ctx: &Context,
    f: &dyn Fn(&CallArgs) -> Result<Value>,
    args: &CallArgs,
    static_argnums: &[usize],
    static_argnames: &[String],
) -> Result<Value> {
    evaluate_partitioned(ctx, f, args, static_argnums, static_argnames).map(|(out, _)| out)
}

/// Like [`eval_shape`], also returning every variable `f` touched
pub fn eval_shape_with_stack(
    ctx: &Context,
    f: &dyn Fn(&CallArgs) -> Result<Value>,
    args: &CallArgs,
    static_argnums: &[usize],
    static_argnames: &[String],
) -> Result<(Value, Collector<Variable>)> {
    evaluate_partitioned(ctx, f, args, static_argnums, static_argnames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{array1, scalar};

    #[test]
    fn test_partition_and_merge_restore_order() {
        let args = CallArgs::new()
            .arg(1.0)
            .arg("train")
            .arg(2.0)
            .arg(true)
            .kwarg("dt", 0.1)
            .kwarg("mode", "fast");
        let p = partition_static(&args, &[1, 3], &["mode".to_string(), "absent".to_string()]).unwrap();
        assert_eq!(p.dynamic.args, vec![Value::Float(1.0), Value::Float(2.0)]);
        assert!(p.dynamic.kwargs.contains_key("dt"));
        assert_eq!(p.statics.len(), 3);
        assert_eq!(merge_static(&p.statics, &p.dynamic), args);
    }

    #[test]
    fn test_out_of_range_static_index() {
        let args = CallArgs::new().arg(1.0);
        let err = partition_static(&args, &[1], &[]).unwrap_err();
        assert!(matches!(err, BrainJitError::InvalidStaticArgs(_)));
    }

    #[test]
    fn test_eval_shape_has_no_side_effects() {
        let ctx = Context::new();
        let v = ctx.variable(array1(&[1.0, 2.0]));
        let w = ctx.variable(scalar(0.0));
        let (vc, wc) = (v.clone(), w.clone());
        let f = move |args: &CallArgs| -> Result<Value> {
            let x = args.float(0)?;
            let total = vc.value().sum() + x;
            wc.set_value(scalar(total))?;
            Ok(Value::Float(total))
        };
        let (out, found) = eval_shape_with_stack(&ctx, &f, &CallArgs::new().arg(5.0), &[], &[]).unwrap();
        assert_eq!(out, Value::Float(0.0));
        assert_eq!(found.len(), 2);
        assert_eq!(w.value(), scalar(0.0));
        assert!(!ctx.stack().is_tracing());
        assert!(!ctx.is_evaluating_shape());
    }

    #[test]
    fn test_statics_reach_function_unabstracted() {
        let ctx = Context::new();
        let f = |args: &CallArgs| -> Result<Value> {
            let mode = args.str_arg(1, "mode")?;
            let scale = args.float(2)?;
            if mode != "train" || scale != 3.0 {
                return Err(BrainJitError::InvalidArgument(format!("saw {} / {}", mode, scale)));
            }
            Ok(Value::Array(args.array(0)? * scale))
        };
        let args = CallArgs::new().arg(array1(&[1.0, 1.0])).arg("train").arg(3.0);
        let out = eval_shape(&ctx, &f, &args, &[1, 2], &[]).unwrap();
        assert_eq!(out.shape(), Some(vec![2]));
        // Without index 2 static, the scale is a zero placeholder.
        assert!(eval_shape(&ctx, &f, &args, &[1], &[]).is_err());
    }

    #[test]
    fn test_unhashable_static_fails_before_evaluation() {
        let ctx = Context::new();
        let f = |_: &CallArgs| -> Result<Value> { panic!("must not run") };
        let args = CallArgs::new().arg(array1(&[1.0]));
        let err = eval_shape(&ctx, &f, &args, &[0], &[]).unwrap_err();
        assert!(matches!(err, BrainJitError::UnhashableStatic(_)));
    }

    #[test]
    fn test_engine_error_surfaces_and_scope_closes() {
        let ctx = Context::new();
        let f = |_: &CallArgs| -> Result<Value> { Err(BrainJitError::Engine("boom".into())) };
        let err = eval_shape(&ctx, &f, &CallArgs::new(), &[], &[]).unwrap_err();
        assert!(matches!(err, BrainJitError::Engine(ref m) if m == "boom"));
        assert_eq!(ctx.stack().depth(), 0);
        assert!(!ctx.is_evaluating_shape());
    }
}
