//! Removal of dead `let` bindings and substitution of trivial ones.

use std::collections::HashMap;

use common_error::XylemResult;
use xylem_ir::{AnnotationKey, Clause, ExprId, ExprKind, Flwor};

use super::clause_exprs_mut;
use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("EliminateUnusedLetVars", eliminate_unused_let_vars)
}

fn eliminate_unused_let_vars(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let Some(Flwor { mut clauses, mut ret }) = ctx.arena.kind(id).as_flwor().cloned() else {
        return Ok(None);
    };

    let mut changed = false;
    let mut i = 0;
    while i < clauses.len() {
        let Clause::Let { var, domain } = clauses[i] else {
            i += 1;
            continue;
        };

        let uses: usize = clauses[i + 1..]
            .iter()
            .flat_map(Clause::exprs)
            .chain(std::iter::once(ret))
            .map(|e| ctx.arena.count_var_refs(e, var))
            .sum();

        if uses == 0 && ctx.is_yes(domain, AnnotationKey::SideEffectFree) {
            clauses.remove(i);
            changed = true;
            continue;
        }

        if matches!(ctx.arena.kind(domain), ExprKind::Literal(_) | ExprKind::VarRef(_)) {
            for clause in &mut clauses[i + 1..] {
                for slot in clause_exprs_mut(clause) {
                    *slot = substitute(ctx, *slot, var, domain);
                }
            }
            ret = substitute(ctx, ret, var, domain);
            clauses.remove(i);
            changed = true;
            continue;
        }

        i += 1;
    }

    if !changed {
        return Ok(None);
    }
    if clauses.is_empty() {
        return Ok(Some(ret));
    }
    *ctx.arena.kind_mut(id) = ExprKind::Flwor(Flwor { clauses, ret });
    Ok(Some(id))
}

fn substitute(ctx: &mut RewriteContext<'_>, root: ExprId, var: xylem_ir::VarId, value: ExprId) -> ExprId {
    if ctx.arena.count_var_refs(root, var) == 0 {
        return root;
    }
    let copy = ctx.arena.deep_clone(value, &mut HashMap::new());
    ctx.arena.substitute_var(root, var, copy)
}
