//! Boolean filters rewritten as `for ... where` blocks.

use common_error::XylemResult;
use xylem_core::{ItemType, SequenceType};
use xylem_ir::{Clause, ExprId, ExprKind};

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::pre("RefactorPredFLWOR", refactor_pred)
}

/// `e[p]` with a boolean `p` becomes `for $dot at $pos in e where p return $dot`.
///
/// Numeric predicates select by position and are left alone.
fn refactor_pred(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let ExprKind::Filter {
        input,
        predicate,
        dot,
        position,
    } = *ctx.arena.kind(id)
    else {
        return Ok(None);
    };
    let boolean = SequenceType::optional(ItemType::Boolean);
    if !ctx.static_type(predicate).is_some_and(|t| t.is_subtype_of(&boolean)) {
        return Ok(None);
    }

    let ret = ctx.arena.var_ref(dot);
    let flwor = ctx.arena.flwor(
        vec![
            Clause::For {
                var: dot,
                position,
                domain: input,
            },
            Clause::Where(predicate),
        ],
        ret,
    );
    Ok(Some(flwor))
}

#[cfg(test)]
mod tests {
    use common_config::RewriterConfig;
    use xylem_catalog::{annotate, FunctionCatalog};
    use xylem_ir::{ExprArena, StaticContext};

    use super::*;

    fn filter(arena: &mut ExprArena, boolean: bool) -> ExprId {
        let input = arena.literal(vec![1i64.into(), 2i64.into(), 3i64.into()]);
        let dot = arena.new_var("dot");
        let predicate = if boolean {
            let d = arena.var_ref(dot);
            let two = arena.item(2i64);
            arena.call_op("value-greater-than", vec![d, two])
        } else {
            arena.item(2i64)
        };
        arena.filter(input, predicate, dot, None)
    }

    fn run(arena: &mut ExprArena, root: ExprId) -> Option<ExprId> {
        let catalog = FunctionCatalog::builtin().unwrap();
        let sctx = StaticContext::default();
        let config = RewriterConfig::default();
        annotate(arena, root, &sctx, &catalog).unwrap();
        let mut ctx = RewriteContext::new(arena, &sctx, &catalog, &config);
        refactor_pred(&mut ctx, root).unwrap()
    }

    #[test]
    fn test_boolean_predicate_refactored() {
        let mut arena = ExprArena::new();
        let root = filter(&mut arena, true);
        let new = run(&mut arena, root).unwrap();
        let f = arena.kind(new).as_flwor().unwrap();
        assert!(matches!(f.clauses[1], Clause::Where(_)));
    }

    #[test]
    fn test_positional_predicate_kept() {
        let mut arena = ExprArena::new();
        let root = filter(&mut arena, false);
        assert_eq!(run(&mut arena, root), None);
    }
}
