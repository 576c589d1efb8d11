//! Hash joins for equality-filtered nested loops.
//!
//! ```text
//! for $x in X  for $y in Y  where $x/k eq $y/k  return ...
//! ```
//!
//! becomes a probe of a hash index built once over `Y`:
//!
//! ```text
//! for $x in X  for $y in index(Y, $b/k) probe $x/k  return ...
//! ```

use std::collections::{BTreeSet, HashMap};

use common_error::XylemResult;
use log::debug;
use xylem_core::ItemType;
use xylem_ir::{Clause, ExprId, ExprKind, Flwor, IndexProbe, VarId};

use crate::context::RewriteContext;
use crate::rule::RewriteRule;

pub(crate) fn rule() -> RewriteRule {
    RewriteRule::post("IndexJoin", index_join)
}

/// Key families whose value equality matches hash-key equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Integer,
    Double,
    Text,
    Boolean,
}

fn key_family(ctx: &RewriteContext<'_>, key: ExprId) -> Option<KeyFamily> {
    let ty = ctx.static_type(key)?;
    if ty.is_empty() || !ty.is_singleton_or_empty() {
        return None;
    }
    match ty.item {
        ItemType::Integer => Some(KeyFamily::Integer),
        ItemType::Double => Some(KeyFamily::Double),
        ItemType::String | ItemType::Untyped => Some(KeyFamily::Text),
        ItemType::Boolean => Some(KeyFamily::Boolean),
        _ => None,
    }
}

/// Operands of an equality comparison usable as a join condition.
fn equality(ctx: &RewriteContext<'_>, cond: ExprId) -> Option<(ExprId, ExprId)> {
    let (name, args) = ctx.arena.kind(cond).as_call()?;
    let is_eq = name.prefix == "op" && (name.local == "value-equal" || name.local == "equal");
    match args {
        [a, b] if is_eq => Some((*a, *b)),
        _ => None,
    }
}

/// A matched join: the loop clause, its `where` clause and both keys.
struct JoinSite {
    loop_at: usize,
    where_at: usize,
    inner_key: ExprId,
    outer_key: ExprId,
}

fn match_site(ctx: &RewriteContext<'_>, clauses: &[Clause], loop_at: usize) -> Option<JoinSite> {
    let Clause::For {
        var,
        position: None,
        domain,
    } = clauses[loop_at]
    else {
        return None;
    };
    if !clauses[..loop_at].iter().any(Clause::is_for) {
        return None;
    }
    if !ctx.is_pure(domain) || !ctx.free_vars(domain).is_empty() {
        return None;
    }

    // Vars the outer key may not use: the loop variable and everything
    // bound after it.
    let mut later: BTreeSet<VarId> = BTreeSet::from([var]);
    let mut where_at = None;
    for (k, clause) in clauses.iter().enumerate().skip(loop_at + 1) {
        match clause {
            Clause::Where(_) => {
                where_at = Some(k);
                break;
            }
            Clause::For { .. } | Clause::Let { .. } => later.extend(clause.bound_vars()),
            Clause::OrderBy(_) => return None,
        }
    }
    let where_at = where_at?;
    let Clause::Where(cond) = clauses[where_at] else {
        return None;
    };
    let (a, b) = equality(ctx, cond)?;

    let only_loop_var = |e: ExprId| ctx.free_vars(e) == BTreeSet::from([var]);
    let outside = |e: ExprId| ctx.free_vars(e).is_disjoint(&later);
    let (inner_key, outer_key) = if only_loop_var(a) && outside(b) {
        (a, b)
    } else if only_loop_var(b) && outside(a) {
        (b, a)
    } else {
        return None;
    };

    let family = key_family(ctx, inner_key)?;
    if key_family(ctx, outer_key)? != family || !ctx.is_pure(inner_key) || !ctx.is_pure(outer_key) {
        return None;
    }
    Some(JoinSite {
        loop_at,
        where_at,
        inner_key,
        outer_key,
    })
}

fn index_join(ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
    let Some(Flwor { mut clauses, ret }) = ctx.arena.kind(id).as_flwor().cloned() else {
        return Ok(None);
    };
    let Some(site) = (0..clauses.len()).find_map(|j| match_site(ctx, &clauses, j)) else {
        return Ok(None);
    };
    let Clause::For { var, domain, .. } = clauses[site.loop_at] else {
        return Ok(None);
    };

    let build_var = ctx.arena.new_var("build");
    let mut renames = HashMap::from([(var, build_var)]);
    let build_key = ctx.arena.deep_clone(site.inner_key, &mut renames);
    let probe = ctx.arena.alloc(ExprKind::IndexProbe(IndexProbe {
        build: domain,
        build_var,
        build_key,
        probe_key: site.outer_key,
    }));
    debug!("IndexJoin: loop at clause {} now probes a hash index", site.loop_at);

    clauses.remove(site.where_at);
    clauses[site.loop_at] = Clause::For {
        var,
        position: None,
        domain: probe,
    };
    *ctx.arena.kind_mut(id) = ExprKind::Flwor(Flwor { clauses, ret });
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use common_config::RewriterConfig;
    use xylem_catalog::{annotate, FunctionCatalog};
    use xylem_ir::{ExprArena, StaticContext};

    use super::*;

    fn join(arena: &mut ExprArena, op: &str, inner: Vec<xylem_core::Item>) -> ExprId {
        let x = arena.new_var("x");
        let y = arena.new_var("y");
        let xs = arena.literal(vec![1i64.into(), 2i64.into(), 3i64.into()]);
        let ys = arena.literal(inner);
        let xr = arena.var_ref(x);
        let yr = arena.var_ref(y);
        let cond = arena.call_op(op, vec![yr, xr]);
        let rx = arena.var_ref(x);
        let ry = arena.var_ref(y);
        let ret = arena.call_op("concatenate", vec![rx, ry]);
        arena.flwor(
            vec![
                Clause::For {
                    var: x,
                    position: None,
                    domain: xs,
                },
                Clause::For {
                    var: y,
                    position: None,
                    domain: ys,
                },
                Clause::Where(cond),
            ],
            ret,
        )
    }

    fn run(arena: &mut ExprArena, root: ExprId) -> Option<ExprId> {
        let catalog = FunctionCatalog::builtin().unwrap();
        let sctx = StaticContext::default();
        let config = RewriterConfig::default();
        annotate(arena, root, &sctx, &catalog).unwrap();
        let mut ctx = RewriteContext::new(arena, &sctx, &catalog, &config);
        index_join(&mut ctx, root).unwrap()
    }

    #[test]
    fn test_equality_join_rewritten() {
        let mut arena = ExprArena::new();
        let root = join(&mut arena, "value-equal", vec![2i64.into(), 3i64.into(), 4i64.into()]);
        assert_eq!(run(&mut arena, root), Some(root));

        let f = arena.kind(root).as_flwor().unwrap();
        assert_eq!(f.clauses.len(), 2);
        let Clause::For { domain, .. } = f.clauses[1] else {
            panic!("expected a for clause");
        };
        assert!(matches!(arena.kind(domain), ExprKind::IndexProbe(_)));
    }

    #[test]
    fn test_mixed_key_families_rejected() {
        let mut arena = ExprArena::new();
        let root = join(&mut arena, "equal", vec!["2".into(), "3".into()]);
        assert_eq!(run(&mut arena, root), None);
    }

    #[test]
    fn test_integer_and_double_keys_rejected() {
        let mut arena = ExprArena::new();
        let root = join(&mut arena, "value-equal", vec![2.0f64.into(), 3.0f64.into()]);
        assert_eq!(run(&mut arena, root), None);
    }

    #[test]
    fn test_other_comparisons_rejected() {
        let mut arena = ExprArena::new();
        let root = join(&mut arena, "value-less-than", vec![2i64.into()]);
        assert_eq!(run(&mut arena, root), None);
    }
}
