//! Flattening of nested FLWOR blocks.

use common_error::XylemResult;
use xylem_ir::{Clause, ExprId, ExprKind, Flwor};

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("MergeFLWOR", merge_flwor)
}

/// Lets of a block made only of `let` clauses, with its return.
fn let_only(kind: &ExprKind) -> Option<(Vec<Clause>, ExprId)> {
    let f = kind.as_flwor()?;
    let all_lets = !f.clauses.is_empty() && f.clauses.iter().all(|c| matches!(c, Clause::Let { .. }));
    all_lets.then(|| (f.clauses.clone(), f.ret))
}

fn merge_flwor(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let Some(Flwor { clauses, mut ret }) = ctx.arena.kind(id).as_flwor().cloned() else {
        return Ok(None);
    };
    let mut changed = false;

    // for $x in (let $y := e return d)  =>  let $y := e for $x in d
    let mut merged = Vec::with_capacity(clauses.len());
    for mut clause in clauses {
        if let Clause::For { domain, .. } | Clause::Let { domain, .. } = &mut clause {
            if let Some((lets, inner_ret)) = let_only(ctx.arena.kind(*domain)) {
                merged.extend(lets);
                *domain = inner_ret;
                changed = true;
            }
        }
        merged.push(clause);
    }

    // ... return (for ... return r)  =>  ... for ... return r
    let outer_ordered = merged.iter().any(|c| matches!(c, Clause::OrderBy(_)));
    if !outer_ordered {
        if let Some(inner) = ctx.arena.kind(ret).as_flwor() {
            if !inner.has_order_by() {
                let inner = inner.clone();
                merged.extend(inner.clauses);
                ret = inner.ret;
                changed = true;
            }
        }
    }

    if !changed {
        return Ok(None);
    }
    *ctx.arena.kind_mut(id) = ExprKind::Flwor(Flwor { clauses: merged, ret });
    Ok(Some(id))
}
