//! Loop-invariant code motion for FLWOR blocks.

use std::collections::BTreeSet;

use common_error::XylemResult;
use log::trace;
use xylem_ir::{Clause, ExprId, ExprKind, Flwor, VarId};

use super::clause_exprs_mut;
use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("HoistExprsOutOfLoops", hoist_exprs)
}

/// A hoistable subtree and the child slot it occupies.
struct Found {
    parent: Option<(ExprId, usize)>,
    expr: ExprId,
}

/// Child positions evaluated every time their parent is.
///
/// Branches, predicates, lazily bound call arguments and the right operand
/// of `and`/`or` may be skipped at run time, so nothing is hoisted from them.
fn eager_children(kind: &ExprKind) -> Vec<usize> {
    match kind {
        ExprKind::Call { name, args } => {
            let short_circuit = name.prefix == "op" && (name.local == "and" || name.local == "or");
            let n = if short_circuit { 1 } else { args.len() };
            (0..n).collect()
        }
        ExprKind::PathStep { .. }
        | ExprKind::TypeTest { .. }
        | ExprKind::ElementCtor { .. }
        | ExprKind::TextCtor { .. }
        | ExprKind::Filter { .. }
        | ExprKind::If { .. }
        | ExprKind::Quantified { .. } => vec![0],
        _ => Vec::new(),
    }
}

fn is_candidate(ctx: &RewriteContext<'_>, id: ExprId, bound: &BTreeSet<VarId>) -> bool {
    !matches!(ctx.arena.kind(id), ExprKind::Literal(_) | ExprKind::VarRef(_))
        && ctx.is_pure(id)
        && ctx.free_vars(id).is_disjoint(bound)
}

/// Outermost hoistable subtree of `id`, pre-order.
fn find(ctx: &RewriteContext<'_>, id: ExprId, parent: Option<(ExprId, usize)>, bound: &BTreeSet<VarId>) -> Option<Found> {
    if is_candidate(ctx, id, bound) {
        return Some(Found { parent, expr: id });
    }
    let kind = ctx.arena.kind(id);
    let children = kind.children();
    eager_children(kind)
        .into_iter()
        .find_map(|idx| find(ctx, children[idx], Some((id, idx)), bound))
}

fn non_empty(ctx: &RewriteContext<'_>, id: ExprId) -> bool {
    ctx.static_type(id).is_some_and(|t| t.occurrence.min() >= 1)
}

/// Location of a hoistable subtree relative to the loop at `loop_at`.
///
/// Positions after the loop are searched in clause order while they are
/// reached for every iteration of it: a `where` clause or a possibly empty
/// `for` domain ends the search, so hoisting never evaluates an
/// expression the original query would have skipped.
fn search(ctx: &RewriteContext<'_>, clauses: &[Clause], ret: ExprId, loop_at: usize) -> Option<(usize, usize, Found)> {
    let mut bound = BTreeSet::new();
    for k in loop_at..=clauses.len() {
        if k > loop_at {
            let slots = match clauses.get(k) {
                Some(clause) => clause.exprs(),
                None => vec![ret],
            };
            for (j, slot) in slots.into_iter().enumerate() {
                if let Some(found) = find(ctx, slot, None, &bound) {
                    return Some((k, j, found));
                }
            }
        }
        let clause = clauses.get(k)?;
        match clause {
            Clause::For { domain, .. } if !non_empty(ctx, *domain) => return None,
            Clause::Where(_) => return None,
            _ => {}
        }
        bound.extend(clause.bound_vars());
    }
    None
}

fn hoist_exprs(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let Some(Flwor { mut clauses, mut ret }) = ctx.arena.kind(id).as_flwor().cloned() else {
        return Ok(None);
    };

    let hit = (0..clauses.len())
        .filter(|i| clauses[*i].is_for())
        .find_map(|i| search(ctx, &clauses, ret, i).map(|hit| (i, hit)));
    let Some((loop_at, (k, j, found))) = hit else {
        return Ok(None);
    };

    let var = ctx.arena.new_var("hoisted");
    let reference = ctx.arena.var_ref(var);
    match found.parent {
        Some((parent, idx)) => *ctx.arena.kind_mut(parent).children_mut()[idx] = reference,
        None if k == clauses.len() => ret = reference,
        None => *clause_exprs_mut(&mut clauses[k])[j] = reference,
    }
    trace!(
        "HoistExprsOutOfLoops: moved {} in front of clause {}",
        ctx.arena.kind(found.expr).name(),
        loop_at
    );
    clauses.insert(
        loop_at,
        Clause::Let {
            var,
            domain: found.expr,
        },
    );
    *ctx.arena.kind_mut(id) = ExprKind::Flwor(Flwor { clauses, ret });
    Ok(Some(id))
}
