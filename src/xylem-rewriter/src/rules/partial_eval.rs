//! Static decisions on conditionals, clauses and type operations.

use common_error::XylemResult;
use xylem_core::{Item, Occurrence, Quantifier, SequenceType, TypeOp};
use xylem_ir::{AnnotationKey, Clause, ExprId, ExprKind, Flwor};
use xylem_runtime::functions::effective_boolean_value;

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("PartialEval", partial_eval)
}

pub(crate) fn type_enforcing_rule() -> RewriteRule {
    RewriteRule::post("EliminateTypeEnforcingOperations", eliminate_type_enforcing)
}

/// Effective boolean value of a literal node, `None` if it is not a
/// literal or has no boolean value.
fn literal_ebv(ctx: &RewriteContext<'_>, id: ExprId) -> Option<bool> {
    let items = ctx.arena.kind(id).as_literal()?;
    effective_boolean_value(items).ok()
}

fn literal_len(ctx: &RewriteContext<'_>, id: ExprId) -> Option<usize> {
    ctx.arena.kind(id).as_literal().map(|s| s.len())
}

fn partial_eval(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    match ctx.arena.kind(id).clone() {
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => Ok(literal_ebv(ctx, cond).map(|b| if b { then_branch } else { else_branch })),
        ExprKind::TypeTest {
            op: TypeOp::InstanceOf,
            input,
            target,
        } => {
            if !ctx.is_yes(input, AnnotationKey::SideEffectFree) {
                return Ok(None);
            }
            let Some(ty) = ctx.static_type(input) else {
                return Ok(None);
            };
            let decided = if ty.is_subtype_of(&target) {
                Some(true)
            } else if !ty.intersects(&target) {
                Some(false)
            } else {
                None
            };
            Ok(decided.map(|b| ctx.literal(vec![Item::Boolean(b)])))
        }
        ExprKind::Quantified {
            quantifier, domain, ..
        } if literal_len(ctx, domain) == Some(0) => {
            Ok(Some(ctx.literal(vec![Item::Boolean(quantifier == Quantifier::Every)])))
        }
        ExprKind::Flwor(flwor) => eval_clauses(ctx, id, flwor),
        _ => Ok(None),
    }
}

fn eval_clauses(ctx: &mut RewriteContext<'_>, id: ExprId, flwor: Flwor) -> XylemResult<Option<ExprId>> {
    let mut clauses = Vec::with_capacity(flwor.clauses.len());
    let mut changed = false;
    for clause in flwor.clauses {
        match clause {
            Clause::Where(cond) => match literal_ebv(ctx, cond) {
                Some(true) => changed = true,
                Some(false) => return empty_block(ctx, id),
                None => clauses.push(clause),
            },
            Clause::For {
                var,
                position,
                domain,
            } => match literal_len(ctx, domain) {
                Some(0) => return empty_block(ctx, id),
                Some(1) => {
                    clauses.push(Clause::Let { var, domain });
                    if let Some(pos) = position {
                        let one = ctx.literal(vec![Item::Integer(1)]);
                        clauses.push(Clause::Let { var: pos, domain: one });
                    }
                    changed = true;
                }
                _ => clauses.push(clause),
            },
            other => clauses.push(other),
        }
    }
    if !changed {
        return Ok(None);
    }
    *ctx.arena.kind_mut(id) = ExprKind::Flwor(Flwor {
        clauses,
        ret: flwor.ret,
    });
    Ok(Some(id))
}

/// Replace a block that can produce no tuple with the empty sequence.
fn empty_block(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    if !ctx.is_yes(id, AnnotationKey::SideEffectFree) {
        return Ok(None);
    }
    Ok(Some(ctx.literal(Vec::new())))
}

// ============================================================================
// Type-enforcing operations
// ============================================================================

fn cardinality_target(local: &str) -> Option<Occurrence> {
    match local {
        "zero-or-one" => Some(Occurrence::ZeroOrOne),
        "one-or-more" => Some(Occurrence::OneOrMore),
        "exactly-one" => Some(Occurrence::One),
        _ => None,
    }
}

/// Drop `treat as`, argument coercions and cardinality checks whose input
/// type already satisfies them.
fn eliminate_type_enforcing(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let (input, target) = match ctx.arena.kind(id) {
        ExprKind::TypeTest {
            op: TypeOp::Treat | TypeOp::Coerce,
            input,
            target,
        } => (*input, *target),
        ExprKind::Call { name, args } if name.prefix == "fn" && args.len() == 1 => {
            let Some(occurrence) = cardinality_target(&name.local) else {
                return Ok(None);
            };
            (args[0], SequenceType::new(xylem_core::ItemType::Item, occurrence))
        }
        _ => return Ok(None),
    };
    let proven = ctx.static_type(input).is_some_and(|t| t.is_subtype_of(&target));
    Ok(proven.then(|| ctx.replace(id, input)))
}

#[cfg(test)]
mod tests {
    use common_config::RewriterConfig;
    use xylem_catalog::{annotate, FunctionCatalog};
    use xylem_core::ItemType;
    use xylem_ir::{ExprArena, StaticContext};

    use super::*;

    fn run(
        arena: &mut ExprArena,
        root: ExprId,
        hook: fn(&mut RewriteContext<'_>, ExprId) -> XylemResult<Option<ExprId>>,
    ) -> Option<ExprId> {
        let catalog = FunctionCatalog::builtin().unwrap();
        let sctx = StaticContext::default();
        let config = RewriterConfig::default();
        annotate(arena, root, &sctx, &catalog).unwrap();
        let mut ctx = RewriteContext::new(arena, &sctx, &catalog, &config);
        hook(&mut ctx, root).unwrap()
    }

    #[test]
    fn test_if_on_literal_condition() {
        let mut arena = ExprArena::new();
        let cond = arena.item(false);
        let a = arena.item(1i64);
        let b = arena.item(2i64);
        let root = arena.if_then_else(cond, a, b);
        assert_eq!(run(&mut arena, root, partial_eval), Some(b));
    }

    #[test]
    fn test_instance_of_decided() {
        let mut arena = ExprArena::new();
        let one = arena.item(1i64);
        let yes = arena.type_test(TypeOp::InstanceOf, one, SequenceType::one(ItemType::Numeric));
        let new = run(&mut arena, yes, partial_eval).unwrap();
        assert_eq!(arena.kind(new).as_literal().map(|s| s.to_vec()), Some(vec![Item::Boolean(true)]));

        let two = arena.item(2i64);
        let no = arena.type_test(TypeOp::InstanceOf, two, SequenceType::one(ItemType::String));
        let new = run(&mut arena, no, partial_eval).unwrap();
        assert_eq!(arena.kind(new).as_literal().map(|s| s.to_vec()), Some(vec![Item::Boolean(false)]));
    }

    #[test]
    fn test_false_where_empties_block() {
        let mut arena = ExprArena::new();
        let x = arena.new_var("x");
        let xs = arena.literal(vec![1i64.into(), 2i64.into()]);
        let cond = arena.item(false);
        let ret = arena.var_ref(x);
        let root = arena.flwor(
            vec![
                Clause::For {
                    var: x,
                    position: None,
                    domain: xs,
                },
                Clause::Where(cond),
            ],
            ret,
        );
        let new = run(&mut arena, root, partial_eval).unwrap();
        assert_eq!(arena.kind(new).as_literal().map(|s| s.len()), Some(0));
    }

    #[test]
    fn test_singleton_for_becomes_let() {
        let mut arena = ExprArena::new();
        let x = arena.new_var("x");
        let pos = arena.new_var("i");
        let one = arena.item(7i64);
        let ret = arena.var_ref(pos);
        let root = arena.flwor(
            vec![Clause::For {
                var: x,
                position: Some(pos),
                domain: one,
            }],
            ret,
        );
        run(&mut arena, root, partial_eval).unwrap();
        let f = arena.kind(root).as_flwor().unwrap();
        assert_eq!(f.clauses.len(), 2);
        assert!(f.clauses.iter().all(|c| matches!(c, Clause::Let { .. })));
    }

    #[test]
    fn test_redundant_checks_removed() {
        let mut arena = ExprArena::new();
        let one = arena.item(1i64);
        let check = arena.call_fn("exactly-one", vec![one]);
        assert_eq!(run(&mut arena, check, eliminate_type_enforcing), Some(one));

        let xs = arena.literal(vec![1i64.into(), 2i64.into()]);
        let check = arena.call_fn("zero-or-one", vec![xs]);
        assert_eq!(run(&mut arena, check, eliminate_type_enforcing), None);

        let s = arena.item("a");
        let treat = arena.type_test(TypeOp::Treat, s, SequenceType::one(ItemType::AnyAtomic));
        assert_eq!(run(&mut arena, treat, eliminate_type_enforcing), Some(s));
    }
}
