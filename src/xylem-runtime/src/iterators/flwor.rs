//! Binding iterators: FLWOR blocks, predicates and quantifiers.

use std::cmp::Ordering;
use std::sync::Arc;

use common_error::{dynamic_err, XylemError, XylemResult};
use xylem_core::{Item, Quantifier};

use super::Evaluator;
use crate::functions::{atomize, compare_atomic, effective_boolean_value};
use crate::plan::{PlanClause, PlanNodeId, VarSlot};
use crate::state::{NodeState, PlanState};

type SortKey = Vec<Option<Item>>;

impl Evaluator<'_> {
    pub(super) fn next_flwor(
        &self,
        clauses: &[PlanClause],
        ret: PlanNodeId,
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        if let Some(PlanClause::OrderBy(keys)) = clauses.iter().find(|c| matches!(c, PlanClause::OrderBy(_))) {
            return self.next_ordered(clauses, keys, ret, offset, state);
        }

        loop {
            let NodeState::Flwor { ret_active, .. } = *state.data_mut(offset) else {
                return Ok(None);
            };
            if ret_active {
                if let Some(item) = self.next(ret, state)? {
                    return Ok(Some(item));
                }
                set_ret_active(state, offset, false);
            }
            if !self.next_tuple(clauses, offset, state)? {
                return Ok(None);
            }
            self.reset(ret, state)?;
            set_ret_active(state, offset, true);
        }
    }

    /// Bind the next tuple of the clause list. Returns `false` once every
    /// tuple has been produced.
    fn next_tuple(&self, clauses: &[PlanClause], offset: usize, state: &mut PlanState) -> XylemResult<bool> {
        let started = match state.data_mut(offset) {
            NodeState::Flwor { started, .. } => std::mem::replace(started, true),
            _ => return Ok(false),
        };
        let n = clauses.len();
        // Position of the clause to advance. A fresh clause is entered
        // moving forward, a stale one is re-entered by backtracking.
        let mut i = if started { n.checked_sub(1) } else { Some(0) };
        if !started {
            if n == 0 {
                return Ok(true);
            }
            mark_fresh(state, offset, 0);
        }

        while let Some(current) = i {
            if current == n {
                return Ok(true);
            }
            let slot = offset + 1 + current;
            let (fresh, position) = match *state.data_mut(slot) {
                NodeState::Clause { fresh, position } => (fresh, position),
                _ => (true, 0),
            };
            let forward = match &clauses[current] {
                PlanClause::For {
                    var,
                    position: pos_var,
                    domain,
                } => {
                    if fresh {
                        self.reset(*domain, state)?;
                    }
                    self.ctx.check_cancelled()?;
                    match self.next(*domain, state)? {
                        Some(item) => {
                            let position = if fresh { 1 } else { position + 1 };
                            state.bind(*var, Arc::from(vec![item]));
                            if let Some(p) = pos_var {
                                state.bind(*p, Arc::from(vec![Item::Integer(position)]));
                            }
                            *state.data_mut(slot) = NodeState::Clause {
                                fresh: false,
                                position,
                            };
                            true
                        }
                        None => false,
                    }
                }
                PlanClause::Let { var, domain } => {
                    if fresh {
                        let items = self.rerun(*domain, state)?;
                        state.bind(*var, Arc::from(items));
                        set_stale(state, slot);
                    }
                    fresh
                }
                PlanClause::Where(cond) => {
                    let pass = fresh && effective_boolean_value(&self.rerun(*cond, state)?)?;
                    set_stale(state, slot);
                    pass
                }
                PlanClause::OrderBy(_) => {
                    set_stale(state, slot);
                    fresh
                }
            };

            i = if forward {
                if current + 1 < n {
                    mark_fresh(state, offset, current + 1);
                }
                Some(current + 1)
            } else {
                current.checked_sub(1)
            };
        }
        Ok(false)
    }

    /// Materialize every tuple with its sort keys, then stream the
    /// stably sorted return values.
    fn next_ordered(
        &self,
        clauses: &[PlanClause],
        keys: &[(PlanNodeId, bool)],
        ret: PlanNodeId,
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        if let NodeState::Flwor { started: false, .. } = state.data_mut(offset) {
            let mut rows: Vec<(SortKey, Vec<Item>)> = Vec::new();
            while self.next_tuple(clauses, offset, state)? {
                let mut key = Vec::with_capacity(keys.len());
                for (expr, _) in keys {
                    let values = self.rerun(*expr, state)?;
                    let mut atoms = atomize(&values, self.ctx.store.as_ref());
                    if atoms.len() > 1 {
                        dynamic_err!(XPTY0004, "order by key yields {} items", atoms.len());
                    }
                    key.push(atoms.pop());
                }
                rows.push((key, self.rerun(ret, state)?));
            }

            let descending: Vec<bool> = keys.iter().map(|(_, d)| *d).collect();
            let mut failure: Option<XylemError> = None;
            rows.sort_by(|(a, _), (b, _)| match compare_keys(a, b, &descending) {
                Ok(ordering) => ordering,
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            });
            if let Some(e) = failure {
                return Err(e);
            }

            let items: Vec<Item> = rows.into_iter().flat_map(|(_, items)| items).collect();
            *state.data_mut(offset) = NodeState::Buffer {
                items: Arc::from(items),
                pos: 0,
            };
        }
        Ok(super::basic::advance_buffer(state.data_mut(offset)))
    }

    pub(super) fn next_filter(
        &self,
        input: PlanNodeId,
        predicate: PlanNodeId,
        dot: VarSlot,
        position_var: Option<VarSlot>,
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        loop {
            self.ctx.check_cancelled()?;
            let Some(item) = self.next(input, state)? else {
                return Ok(None);
            };
            let position = match state.data_mut(offset) {
                NodeState::Filter { position } => {
                    *position += 1;
                    *position
                }
                _ => return Ok(None),
            };
            state.bind(dot, Arc::from(vec![item.clone()]));
            if let Some(p) = position_var {
                state.bind(p, Arc::from(vec![Item::Integer(position)]));
            }

            let result = self.rerun(predicate, state)?;
            let keep = match result.as_slice() {
                // A numeric predicate selects by position.
                [Item::Integer(n)] => *n == position,
                [Item::Double(d)] => *d == position as f64,
                _ => effective_boolean_value(&result)?,
            };
            if keep {
                return Ok(Some(item));
            }
        }
    }

    pub(super) fn eval_quantified(
        &self,
        quantifier: Quantifier,
        var: VarSlot,
        domain: PlanNodeId,
        test: PlanNodeId,
        state: &mut PlanState,
    ) -> XylemResult<Vec<Item>> {
        let wanted = quantifier == Quantifier::Some;
        while let Some(item) = self.next(domain, state)? {
            self.ctx.check_cancelled()?;
            state.bind(var, Arc::from(vec![item]));
            if effective_boolean_value(&self.rerun(test, state)?)? == wanted {
                return Ok(vec![Item::Boolean(wanted)]);
            }
        }
        Ok(vec![Item::Boolean(!wanted)])
    }
}

fn set_ret_active(state: &mut PlanState, offset: usize, active: bool) {
    if let NodeState::Flwor { ret_active, .. } = state.data_mut(offset) {
        *ret_active = active;
    }
}

fn mark_fresh(state: &mut PlanState, offset: usize, clause: usize) {
    *state.data_mut(offset + 1 + clause) = NodeState::Clause {
        fresh: true,
        position: 0,
    };
}

fn set_stale(state: &mut PlanState, slot: usize) {
    if let NodeState::Clause { fresh, .. } = state.data_mut(slot) {
        *fresh = false;
    }
}

/// Empty keys order first.
fn compare_keys(a: &SortKey, b: &SortKey, descending: &[bool]) -> XylemResult<Ordering> {
    for ((x, y), desc) in a.iter().zip(b).zip(descending) {
        let ordering = match (x, y) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_atomic(x, y)?.unwrap_or(Ordering::Equal),
        };
        let ordering = if *desc { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{ArithOp, CompareOp, ScalarOp};
    use crate::plan::{Plan, PlanBuilder, PlanKind};
    use crate::DynamicContext;

    fn lit(b: &mut PlanBuilder, items: Vec<Item>) -> PlanNodeId {
        b.add_node(PlanKind::Literal(Arc::from(items)))
    }

    fn ints(b: &mut PlanBuilder, values: &[i64]) -> PlanNodeId {
        lit(b, values.iter().map(|v| Item::Integer(*v)).collect())
    }

    fn run(plan: &Plan) -> Vec<Item> {
        let ctx = DynamicContext::default();
        let mut state = PlanState::new(plan);
        let ev = Evaluator::new(plan, &ctx);
        ev.open(plan.root(), &mut state).unwrap();
        let out = ev.drain(plan.root(), &mut state).unwrap();
        ev.close(plan.root(), &mut state);
        out
    }

    #[test]
    fn test_nested_for_produces_cross_product() {
        let mut b = PlanBuilder::new();
        let (x, y) = (b.new_var_slot(), b.new_var_slot());
        let a = ints(&mut b, &[1, 2]);
        let c = ints(&mut b, &[10, 20]);
        let vx = b.add_node(PlanKind::Var(x));
        let vy = b.add_node(PlanKind::Var(y));
        let add = b.add_node(PlanKind::Scalar {
            op: ScalarOp::Arith(ArithOp::Add),
            args: vec![vx, vy],
        });
        let root = b.add_node(PlanKind::Flwor {
            clauses: vec![
                PlanClause::For { var: x, position: None, domain: a },
                PlanClause::For { var: y, position: None, domain: c },
            ],
            ret: add,
        });
        let plan = b.finish(root).unwrap();

        assert_eq!(run(&plan), [11, 21, 12, 22].map(Item::Integer).to_vec());
    }

    #[test]
    fn test_let_where_and_positions() {
        let mut b = PlanBuilder::new();
        let (x, i, l) = (b.new_var_slot(), b.new_var_slot(), b.new_var_slot());
        let domain = ints(&mut b, &[5, 6, 7, 8]);
        let vi = b.add_node(PlanKind::Var(i));
        let two = ints(&mut b, &[2]);
        let rem = b.add_node(PlanKind::Scalar {
            op: ScalarOp::Arith(ArithOp::Mod),
            args: vec![vi, two],
        });
        let zero = ints(&mut b, &[0]);
        let even = b.add_node(PlanKind::Scalar {
            op: ScalarOp::ValueCompare(CompareOp::Eq),
            args: vec![rem, zero],
        });
        let vx = b.add_node(PlanKind::Var(x));
        let vl = b.add_node(PlanKind::Var(l));
        let root = b.add_node(PlanKind::Flwor {
            clauses: vec![
                PlanClause::For { var: x, position: Some(i), domain },
                PlanClause::Let { var: l, domain: vx },
                PlanClause::Where(even),
            ],
            ret: vl,
        });
        let plan = b.finish(root).unwrap();

        assert_eq!(run(&plan), vec![Item::Integer(6), Item::Integer(8)]);
    }

    #[test]
    fn test_order_by_descending_is_stable() {
        let mut b = PlanBuilder::new();
        let x = b.new_var_slot();
        let domain = ints(&mut b, &[3, 1, 2]);
        let vx = b.add_node(PlanKind::Var(x));
        let key = b.add_node(PlanKind::Var(x));
        let root = b.add_node(PlanKind::Flwor {
            clauses: vec![
                PlanClause::For { var: x, position: None, domain },
                PlanClause::OrderBy(vec![(key, true)]),
            ],
            ret: vx,
        });
        let plan = b.finish(root).unwrap();

        assert_eq!(run(&plan), [3, 2, 1].map(Item::Integer).to_vec());
    }

    #[test]
    fn test_empty_domain_yields_nothing() {
        let mut b = PlanBuilder::new();
        let x = b.new_var_slot();
        let domain = ints(&mut b, &[]);
        let vx = b.add_node(PlanKind::Var(x));
        let root = b.add_node(PlanKind::Flwor {
            clauses: vec![PlanClause::For { var: x, position: None, domain }],
            ret: vx,
        });
        assert!(run(&b.finish(root).unwrap()).is_empty());
    }

    #[test]
    fn test_positional_and_boolean_filters() {
        let mut b = PlanBuilder::new();
        let dot = b.new_var_slot();
        let input = ints(&mut b, &[10, 20, 30]);
        let pos = ints(&mut b, &[2]);
        let root = b.add_node(PlanKind::Filter {
            input,
            predicate: pos,
            dot,
            position: None,
        });
        assert_eq!(run(&b.finish(root).unwrap()), vec![Item::Integer(20)]);

        let mut b = PlanBuilder::new();
        let dot = b.new_var_slot();
        let input = ints(&mut b, &[10, 20, 30]);
        let vd = b.add_node(PlanKind::Var(dot));
        let bound = ints(&mut b, &[15]);
        let gt = b.add_node(PlanKind::Scalar {
            op: ScalarOp::ValueCompare(CompareOp::Gt),
            args: vec![vd, bound],
        });
        let root = b.add_node(PlanKind::Filter {
            input,
            predicate: gt,
            dot,
            position: None,
        });
        assert_eq!(run(&b.finish(root).unwrap()), vec![Item::Integer(20), Item::Integer(30)]);
    }

    #[test]
    fn test_quantifiers() {
        for (quantifier, expected) in [(Quantifier::Some, true), (Quantifier::Every, false)] {
            let mut b = PlanBuilder::new();
            let x = b.new_var_slot();
            let domain = ints(&mut b, &[1, 2, 3]);
            let vx = b.add_node(PlanKind::Var(x));
            let two = ints(&mut b, &[2]);
            let test = b.add_node(PlanKind::Scalar {
                op: ScalarOp::ValueCompare(CompareOp::Eq),
                args: vec![vx, two],
            });
            let root = b.add_node(PlanKind::Quantified {
                quantifier,
                var: x,
                domain,
                test,
            });
            assert_eq!(run(&b.finish(root).unwrap()), vec![Item::Boolean(expected)]);
        }
    }
}
