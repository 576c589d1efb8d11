//! Hash index probe produced by join rewriting.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use common_error::{dynamic_err, XylemResult};
use log::debug;
use xylem_core::Item;

use super::basic::optional_atomic;
use super::Evaluator;
use crate::plan::{PlanNodeId, VarSlot};
use crate::state::{IndexKey, NodeState, PlanState};

/// Hash key under value equality. Integers keep their exact value;
/// integral doubles share the integer key only when the conversion is
/// exact. `NaN` never matches anything.
fn index_key(item: &Item) -> XylemResult<Option<IndexKey>> {
    Ok(match item {
        Item::Integer(v) => Some(IndexKey::Int(*v)),
        Item::Double(d) if d.is_nan() => None,
        Item::Double(d) => Some(double_key(*d)),
        Item::String(s) | Item::Untyped(s) => Some(IndexKey::Text(s.clone())),
        Item::Boolean(b) => Some(IndexKey::Boolean(*b)),
        Item::Node(_) => dynamic_err!(XPTY0004, "join key must be atomic"),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn double_key(d: f64) -> IndexKey {
    if d == 0.0 {
        return IndexKey::Int(0);
    }
    if d.fract() == 0.0 && d >= i64::MIN as f64 && d < i64::MAX as f64 {
        let i = d as i64;
        if i as f64 == d {
            return IndexKey::Int(i);
        }
    }
    IndexKey::Number(d.to_bits())
}

impl Evaluator<'_> {
    /// Build the index once, then answer each probe with the build items
    /// whose key equals the probe key, in build order.
    pub(super) fn next_probe(
        &self,
        build: PlanNodeId,
        build_var: VarSlot,
        build_key: PlanNodeId,
        probe_key: PlanNodeId,
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        if matches!(state.data_mut(offset), NodeState::Index { table: None, .. }) {
            let table = self.build_index(build, build_var, build_key, state)?;
            if let NodeState::Index { table: slot, .. } = state.data_mut(offset) {
                *slot = Some(table);
            }
        }

        if matches!(state.data_mut(offset), NodeState::Index { matches: None, .. }) {
            let probe = self.drain(probe_key, state)?;
            let found: VecDeque<Item> = match optional_atomic(probe, "join key", self)? {
                Some(key) => match (index_key(&key)?, state.data_mut(offset)) {
                    (Some(key), NodeState::Index { table: Some(table), .. }) => {
                        table.get(&key).cloned().unwrap_or_default().into()
                    }
                    _ => VecDeque::new(),
                },
                None => VecDeque::new(),
            };
            if let NodeState::Index { matches, .. } = state.data_mut(offset) {
                *matches = Some(found);
            }
        }

        match state.data_mut(offset) {
            NodeState::Index {
                matches: Some(pending),
                ..
            } => Ok(pending.pop_front()),
            _ => Ok(None),
        }
    }

    fn build_index(
        &self,
        build: PlanNodeId,
        build_var: VarSlot,
        build_key: PlanNodeId,
        state: &mut PlanState,
    ) -> XylemResult<HashMap<IndexKey, Vec<Item>>> {
        let mut table: HashMap<IndexKey, Vec<Item>> = HashMap::new();
        let mut rows = 0usize;
        while let Some(item) = self.next(build, state)? {
            self.ctx.check_cancelled()?;
            state.bind(build_var, Arc::from(vec![item.clone()]));
            let key = self.rerun(build_key, state)?;
            if let Some(key) = optional_atomic(key, "join key", self)? {
                if let Some(key) = index_key(&key)? {
                    table.entry(key).or_default().push(item);
                }
            }
            rows += 1;
        }
        debug!("built join index over {rows} items with {} keys", table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanBuilder, PlanClause, PlanKind};
    use crate::DynamicContext;

    #[test]
    fn test_probe_matches_numbers_across_representations() {
        assert_eq!(
            index_key(&Item::Integer(2)).unwrap(),
            index_key(&Item::Double(2.0)).unwrap()
        );
        assert_eq!(index_key(&Item::Double(f64::NAN)).unwrap(), None);
        assert!(index_key(&Item::Node(xylem_core::NodeRef::new(0, 0))).is_err());
    }

    #[test]
    fn test_large_integer_keys_stay_distinct() {
        let big = 9_007_199_254_740_992_i64;
        assert_ne!(
            index_key(&Item::Integer(big + 1)).unwrap(),
            index_key(&Item::Integer(big)).unwrap()
        );
        assert_eq!(
            index_key(&Item::Integer(big)).unwrap(),
            index_key(&Item::Double(9_007_199_254_740_992.0)).unwrap()
        );
        assert_eq!(
            index_key(&Item::Double(-0.0)).unwrap(),
            index_key(&Item::Integer(0)).unwrap()
        );
        assert_eq!(
            index_key(&Item::Double(1e300)).unwrap(),
            Some(IndexKey::Number(1e300f64.to_bits()))
        );
    }

    #[test]
    fn test_index_survives_reset_across_outer_tuples() {
        // for $x in (1, 2, 3) for $y in probe(build (1, 2, 2, 9), key $b, probe $x) return $y
        let mut b = PlanBuilder::new();
        let (x, y, bv) = (b.new_var_slot(), b.new_var_slot(), b.new_var_slot());
        let outer = b.add_node(PlanKind::Literal(Arc::from(
            [1, 2, 3].map(Item::Integer).to_vec(),
        )));
        let build = b.add_node(PlanKind::Literal(Arc::from(
            [1, 2, 2, 9].map(Item::Integer).to_vec(),
        )));
        let build_key = b.add_node(PlanKind::Var(bv));
        let probe_key = b.add_node(PlanKind::Var(x));
        let probe = b.add_node(PlanKind::IndexProbe {
            build,
            build_var: bv,
            build_key,
            probe_key,
        });
        let ret = b.add_node(PlanKind::Var(y));
        let root = b.add_node(PlanKind::Flwor {
            clauses: vec![
                PlanClause::For { var: x, position: None, domain: outer },
                PlanClause::For { var: y, position: None, domain: probe },
            ],
            ret,
        });
        let plan = b.finish(root).unwrap();

        let ctx = DynamicContext::default();
        let mut state = PlanState::new(&plan);
        let ev = Evaluator::new(&plan, &ctx);
        ev.open(root, &mut state).unwrap();
        let out = ev.drain(root, &mut state).unwrap();
        assert_eq!(out, [1, 2, 2].map(Item::Integer).to_vec());

        ev.reset(root, &mut state).unwrap();
        assert!(matches!(
            state.record(plan.node(probe).state_offset).data,
            NodeState::Index { table: Some(_), matches: None }
        ));
        assert_eq!(ev.drain(root, &mut state).unwrap().len(), 3);
    }
}
