//! Inlining of small non-recursive user functions.

use std::collections::{BTreeSet, HashMap};

use common_error::XylemResult;
use log::trace;
use xylem_core::TypeOp;
use xylem_ir::{Clause, ExprArena, ExprId, ExprKind, FunctionId, StaticContext};

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("InlineFunctions", inline_functions)
}

/// Whether `function` can reach a call of itself.
fn is_recursive(arena: &ExprArena, sctx: &StaticContext, function: FunctionId) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack = vec![function];
    while let Some(f) = stack.pop() {
        let Some(decl) = sctx.function(f) else {
            continue;
        };
        for id in arena.descendants(decl.body) {
            if let ExprKind::UserCall { function: callee, .. } = arena.kind(id) {
                if *callee == function {
                    return true;
                }
                if seen.insert(*callee) {
                    stack.push(*callee);
                }
            }
        }
    }
    false
}

/// `f(a1, .., an)` becomes
/// `let $p1 := a1 coerced .. let $pn := an coerced return body coerced`.
///
/// The body is copied with fresh variables, so the declaration stays
/// valid for other call sites.
fn inline_functions(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let ExprKind::UserCall { function, args } = ctx.arena.kind(id).clone() else {
        return Ok(None);
    };
    let sctx = ctx.sctx;
    let Some(decl) = sctx.function(function) else {
        return Ok(None);
    };
    if decl.params.len() != args.len()
        || ctx.arena.subtree_size(decl.body) > ctx.config.inline_threshold
        || is_recursive(ctx.arena, sctx, function)
    {
        return Ok(None);
    }

    let mut renames = HashMap::new();
    let mut clauses = Vec::with_capacity(args.len());
    for ((param, ty), arg) in decl.params.iter().zip(args) {
        let name = ctx.arena.var_name(*param).to_string();
        let fresh = ctx.arena.new_var(name);
        renames.insert(*param, fresh);
        let domain = ctx.arena.type_test(TypeOp::Coerce, arg, *ty);
        clauses.push(Clause::Let { var: fresh, domain });
    }
    let body = ctx.arena.deep_clone(decl.body, &mut renames);
    let ret = ctx.arena.type_test(TypeOp::Coerce, body, decl.return_type);

    trace!("InlineFunctions: inlined {}", decl.name);
    if clauses.is_empty() {
        return Ok(Some(ret));
    }
    Ok(Some(ctx.arena.flwor(clauses, ret)))
}
