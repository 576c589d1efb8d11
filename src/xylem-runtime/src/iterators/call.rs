//! User function calls and argument conversion.

use common_error::{dynamic_err, ErrorCode, XylemError, XylemResult};
use log::trace;
use xylem_core::{Item, ItemType, SequenceType};

use super::Evaluator;
use crate::functions::{atomize, Numeric};
use crate::plan::PlanNodeId;
use crate::state::PlanState;
use crate::store::NodeStore;

/// Apply function conversion rules: atomize for atomic targets, cast
/// untyped values, promote integers to doubles, then check the type.
pub fn coerce(items: Vec<Item>, target: &SequenceType, store: &dyn NodeStore) -> XylemResult<Vec<Item>> {
    let items = if target.item.is_atomic() {
        atomize(&items, store)
            .into_iter()
            .map(|item| convert(item, target.item))
            .collect::<XylemResult<Vec<_>>>()?
    } else {
        items
    };
    if !target.matches(&items) {
        dynamic_err!(
            XPTY0004,
            "sequence of {} item(s) does not match required type {target}",
            items.len()
        );
    }
    Ok(items)
}

fn convert(item: Item, target: ItemType) -> XylemResult<Item> {
    Ok(match (item, target) {
        (Item::Untyped(s), ItemType::String) => Item::String(s),
        (Item::Untyped(s), ItemType::Double | ItemType::Numeric) => {
            Numeric::from_item(&Item::Untyped(s))?.into_item()
        }
        (Item::Untyped(s), ItemType::Integer) => match s.trim().parse::<i64>() {
            Ok(v) => Item::Integer(v),
            Err(_) => dynamic_err!(FORG0001, "cannot cast \"{s}\" to xs:integer"),
        },
        (Item::Untyped(s), ItemType::Boolean) => match s.trim() {
            "true" | "1" => Item::Boolean(true),
            "false" | "0" => Item::Boolean(false),
            _ => dynamic_err!(FORG0001, "cannot cast \"{s}\" to xs:boolean"),
        },
        #[allow(clippy::cast_precision_loss)]
        (Item::Integer(v), ItemType::Double) => Item::Double(v as f64),
        (item, _) => item,
    })
}

impl Evaluator<'_> {
    /// Evaluate a function body in a nested state one level deeper.
    pub(super) fn eval_call(
        &self,
        function: u32,
        args: &[PlanNodeId],
        state: &mut PlanState,
    ) -> XylemResult<Vec<Item>> {
        let plan = self.plan;
        let f = plan
            .function(function)
            .ok_or_else(|| XylemError::internal(format!("call of unknown function plan {function}")))?;
        if f.params.len() != args.len() {
            return Err(XylemError::arity_mismatch(
                f.name.clone(),
                f.params.len().to_string(),
                args.len(),
            ));
        }

        let depth = state.depth() + 1;
        if depth > self.ctx.config.max_call_depth {
            return Err(XylemError::dynamic(
                ErrorCode::XQDY0054,
                format!("call depth limit {} exceeded in {}", self.ctx.config.max_call_depth, f.name),
            ));
        }

        let mut nested = PlanState::with_depth(plan, depth);
        for ((slot, ty), arg) in f.params.iter().zip(args) {
            let value = coerce(self.drain(*arg, state)?, ty, self.ctx.store.as_ref())?;
            nested.bind(*slot, value.into());
        }

        trace!("call {} at depth {depth}", f.name);
        let result = self
            .open(f.body, &mut nested)
            .and_then(|()| self.drain(f.body, &mut nested));
        self.close(f.body, &mut nested);
        state.extend_updates(nested.take_pending_updates());

        coerce(result?, &f.return_type, self.ctx.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_config::{ExecutionConfig, DEFAULT_MAX_CALL_DEPTH};

    use super::*;
    use crate::functions::{ArithOp, CompareOp, ScalarOp};
    use crate::plan::{FunctionPlan, PlanBuilder, PlanKind};
    use crate::store::MemoryNodeStore;
    use crate::DynamicContext;

    #[test]
    fn test_coerce_casts_untyped_and_promotes() {
        let store = MemoryNodeStore::new();
        let out = coerce(
            vec![Item::Untyped("4".into())],
            &SequenceType::one(ItemType::Integer),
            &store,
        )
        .unwrap();
        assert_eq!(out, vec![Item::Integer(4)]);

        let out = coerce(vec![Item::Integer(4)], &SequenceType::one(ItemType::Double), &store).unwrap();
        assert_eq!(out, vec![Item::Double(4.0)]);

        let err = coerce(Vec::new(), &SequenceType::one(ItemType::Integer), &store).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::XPTY0004));
    }

    /// `local:fact($n) { if ($n le 1) then 1 else $n * local:fact($n - 1) }`
    fn factorial_plan(arg: i64) -> crate::Plan {
        recursive_plan(ArithOp::Multiply, arg)
    }

    /// `f($n) = if ($n le 1) then 1 else $n <op> f($n - 1)`, called with `arg`.
    fn recursive_plan(op: ArithOp, arg: i64) -> crate::Plan {
        let mut b = PlanBuilder::new();
        let n = b.new_var_slot();
        let int = SequenceType::one(ItemType::Integer);
        let fact = b.add_function(FunctionPlan {
            name: "local:f".into(),
            params: vec![(n, int)],
            return_type: int,
            body: PlanNodeId(0),
        });

        let lit = |b: &mut PlanBuilder, v: i64| b.add_node(PlanKind::Literal(Arc::from(vec![Item::Integer(v)])));
        let vn = b.add_node(PlanKind::Var(n));
        let one = lit(&mut b, 1);
        let cond = b.add_node(PlanKind::Scalar {
            op: ScalarOp::ValueCompare(CompareOp::Le),
            args: vec![vn, one],
        });
        let then_branch = lit(&mut b, 1);
        let vn2 = b.add_node(PlanKind::Var(n));
        let one2 = lit(&mut b, 1);
        let minus = b.add_node(PlanKind::Scalar {
            op: ScalarOp::Arith(ArithOp::Subtract),
            args: vec![vn2, one2],
        });
        let recurse = b.add_node(PlanKind::UserCall {
            function: fact,
            args: vec![minus],
        });
        let vn3 = b.add_node(PlanKind::Var(n));
        let times = b.add_node(PlanKind::Scalar {
            op: ScalarOp::Arith(op),
            args: vec![vn3, recurse],
        });
        let body = b.add_node(PlanKind::If {
            cond,
            then_branch,
            else_branch: times,
        });
        b.set_function_body(fact, body).unwrap();

        let arg = lit(&mut b, arg);
        let root = b.add_node(PlanKind::UserCall {
            function: fact,
            args: vec![arg],
        });
        b.finish(root).unwrap()
    }

    fn run(plan: &crate::Plan, ctx: &DynamicContext) -> XylemResult<Vec<Item>> {
        let mut state = PlanState::new(plan);
        let ev = Evaluator::new(plan, ctx);
        ev.open(plan.root(), &mut state)?;
        let out = ev.drain(plan.root(), &mut state);
        ev.close(plan.root(), &mut state);
        out
    }

    #[test]
    fn test_recursive_call() {
        let plan = factorial_plan(5);
        let out = run(&plan, &DynamicContext::default()).unwrap();
        assert_eq!(out, vec![Item::Integer(120)]);
    }

    #[test]
    fn test_call_depth_limit() {
        let plan = factorial_plan(50);
        let ctx = DynamicContext::default().with_config(ExecutionConfig { max_call_depth: 10 });
        let err = run(&plan, &ctx).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::XQDY0054));
    }

    #[test]
    fn test_default_depth_limit_fits_test_thread_stack() {
        let depth = DEFAULT_MAX_CALL_DEPTH as i64;
        let ctx = DynamicContext::default();

        let out = run(&recursive_plan(ArithOp::Add, depth), &ctx).unwrap();
        assert_eq!(out, vec![Item::Integer(depth * (depth + 1) / 2)]);

        let err = run(&recursive_plan(ArithOp::Add, depth + 1), &ctx).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::XQDY0054));
    }
}
