//! Compile-time evaluation of closed, pure subtrees.

use std::sync::Arc;

use common_error::XylemResult;
use log::{debug, trace};
use xylem_catalog::generate_expr;
use xylem_ir::{AnnotationKey, ExprId, ExprKind};
use xylem_runtime::{DynamicContext, Execution};

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("FoldConst", fold_const)
}

/// Whether a subtree may be replaced by its value.
///
/// The subtree must be deterministic and free of side effects. It may not
/// read the dynamic context, create nodes or reference unbound variables.
/// Expensive subtrees fold only when the configuration allows it.
pub fn is_foldable(ctx: &RewriteContext<'_>, id: ExprId) -> bool {
    if matches!(ctx.arena.kind(id), ExprKind::Literal(_) | ExprKind::VarRef(_)) {
        return false;
    }
    let holder = &ctx.arena.node(id).annotations;
    holder.get(AnnotationKey::Deterministic).is_yes()
        && holder.get(AnnotationKey::SideEffectFree).is_yes()
        && holder.get(AnnotationKey::RequiresDynamicContext).is_no()
        && holder.get(AnnotationKey::Unfoldable).is_no()
        && (ctx.config.fold_expensive_ops || holder.get(AnnotationKey::Expensive).is_no())
        && ctx.free_vars(id).is_empty()
}

fn fold_const(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    if !is_foldable(ctx, id) {
        return Ok(None);
    }

    let plan = match generate_expr(ctx.arena, id, ctx.sctx, ctx.catalog) {
        Ok(plan) => plan,
        Err(err) => {
            debug!("FoldConst: cannot lower {}: {}", ctx.arena.kind(id).name(), err);
            return Ok(None);
        }
    };

    // A dynamic error is left for run time, where it surfaces only if the
    // expression is actually evaluated.
    match Execution::new(Arc::new(plan), DynamicContext::default()).collect() {
        Ok(items) => {
            trace!("FoldConst: {} folded to {} item(s)", ctx.arena.kind(id).name(), items.len());
            Ok(Some(ctx.literal(items)))
        }
        Err(err) => {
            debug!("FoldConst: declined, evaluation raised {}", err);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use common_config::RewriterConfig;
    use xylem_catalog::{annotate, FunctionCatalog};
    use xylem_core::Item;
    use xylem_ir::{ExprArena, StaticContext};

    use super::*;

    fn run(arena: &mut ExprArena, root: ExprId, config: &RewriterConfig) -> Option<ExprId> {
        let catalog = FunctionCatalog::builtin().unwrap();
        let sctx = StaticContext::default();
        annotate(arena, root, &sctx, &catalog).unwrap();
        let mut ctx = RewriteContext::new(arena, &sctx, &catalog, config);
        fold_const(&mut ctx, root).unwrap()
    }

    #[test]
    fn test_folds_arithmetic() {
        let mut arena = ExprArena::new();
        let a = arena.item(2i64);
        let b = arena.item(3i64);
        let add = arena.call_op("add", vec![a, b]);
        let folded = run(&mut arena, add, &RewriterConfig::default()).unwrap();
        assert_eq!(
            arena.kind(folded).as_literal().map(|s| s.to_vec()),
            Some(vec![Item::Integer(5)])
        );
    }

    #[test]
    fn test_declines_on_dynamic_error() {
        let mut arena = ExprArena::new();
        let a = arena.item(1i64);
        let b = arena.item(0i64);
        let div = arena.call_op("integer-divide", vec![a, b]);
        assert!(run(&mut arena, div, &RewriterConfig::default()).is_none());
    }

    #[test]
    fn test_expensive_needs_opt_in() {
        let mut arena = ExprArena::new();
        let a = arena.item(1i64);
        let b = arena.item(3i64);
        let range = arena.call_op("to", vec![a, b]);
        assert!(run(&mut arena, range, &RewriterConfig::default()).is_none());

        let config = RewriterConfig::default().with_fold_expensive_ops(true);
        let folded = run(&mut arena, range, &config).unwrap();
        assert_eq!(arena.kind(folded).as_literal().map(|s| s.len()), Some(3));
    }

    #[test]
    fn test_free_variable_blocks_folding() {
        let mut arena = ExprArena::new();
        let x = arena.new_var("x");
        let one = arena.item(1i64);
        let r = arena.var_ref(x);
        let add = arena.call_op("add", vec![r, one]);
        let two = arena.item(2i64);
        let root = arena.flwor(vec![xylem_ir::Clause::Let { var: x, domain: two }], add);
        let catalog = FunctionCatalog::builtin().unwrap();
        let sctx = StaticContext::default();
        annotate(&mut arena, root, &sctx, &catalog).unwrap();
        let config = RewriterConfig::default();
        let ctx = RewriteContext::new(&mut arena, &sctx, &catalog, &config);
        assert!(!is_foldable(&ctx, add));
        assert!(is_foldable(&ctx, root));
    }
}
