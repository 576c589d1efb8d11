//! Removal of node sorts and duplicate elimination nobody needs.

use common_error::XylemResult;
use xylem_catalog::{sort_mode, SORT_FAMILY};
use xylem_core::{ItemType, QName};
use xylem_ir::{AnnotationKey, ExprId, ExprKind};
use xylem_runtime::functions::{SortDistinctMode, SortOrder};

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("EliminateNodeOps", eliminate_node_ops)
}

/// Weakest sort-family mode still required, given the input and consumer.
fn required_mode(ctx: &RewriteContext<'_>, id: ExprId, input: ExprId, mode: SortDistinctMode) -> SortDistinctMode {
    let singleton = ctx.static_type(input).is_some_and(|t| t.is_singleton_or_empty());
    let input_sorted = ctx.is_yes(input, AnnotationKey::ProducesSortedNodes);
    let input_distinct = ctx.annotation(input, AnnotationKey::ProducesDuplicates).is_no();

    let need_sort = !singleton
        && !ctx.is_yes(id, AnnotationKey::IgnoresSortedNodes)
        && match mode.order {
            Some(SortOrder::Ascending) => !input_sorted,
            Some(SortOrder::Descending) => true,
            None => false,
        };
    let need_distinct = !singleton
        && mode.distinct
        && !ctx.is_yes(id, AnnotationKey::IgnoresDuplicates)
        && !input_distinct;

    SortDistinctMode::new(mode.order.filter(|_| need_sort), need_distinct, mode.allow_atomics)
}

fn eliminate_node_ops(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let ExprKind::Call { name, args } = ctx.arena.kind(id) else {
        return Ok(None);
    };
    let (Some(mode), [input]) = (sort_mode(name), args.as_slice()) else {
        return Ok(None);
    };
    let input = *input;
    let Some(ty) = ctx.static_type(input) else {
        return Ok(None);
    };

    if mode.allow_atomics && ty.is_builtin_atomic() {
        return Ok(Some(input));
    }
    // Anything that may mix in atomic values keeps the operator and its
    // run-time check.
    if !ty.is_empty() && !ty.item.is_subtype_of(ItemType::Node) {
        return Ok(None);
    }

    let required = required_mode(ctx, id, input, mode);
    if required == mode {
        return Ok(None);
    }
    if required.is_noop() {
        return Ok(Some(input));
    }
    let Some((local, _)) = SORT_FAMILY.iter().find(|(_, m)| *m == required) else {
        return Ok(None);
    };
    Ok(Some(ctx.arena.call(QName::op(*local), vec![input])))
}
