//! Sources, constructors and other iterators with simple control flow.

use common_error::{dynamic_err, XylemError, XylemResult};
use xylem_core::{Item, Sequence, SequenceType, TypeOp, UpdateKind};

use super::Evaluator;
use crate::functions::{atomize, canonical_string, effective_boolean_value, Numeric, ScalarOp};
use crate::plan::{PlanNodeId, VarSlot};
use crate::state::{NodeState, PlanState};
use crate::update::PendingUpdate;

pub(super) fn advance_buffer(data: &mut NodeState) -> Option<Item> {
    match data {
        NodeState::Buffer { items, pos } if *pos < items.len() => {
            *pos += 1;
            Some(items[*pos - 1].clone())
        }
        _ => None,
    }
}

pub(super) fn next_literal(items: &Sequence, offset: usize, state: &mut PlanState) -> Option<Item> {
    match state.data_mut(offset) {
        NodeState::Cursor(pos) if *pos < items.len() => {
            *pos += 1;
            Some(items[*pos - 1].clone())
        }
        _ => None,
    }
}

pub(super) fn next_var(slot: VarSlot, offset: usize, state: &mut PlanState) -> XylemResult<Option<Item>> {
    if matches!(state.data_mut(offset), NodeState::Empty) {
        let Some(items) = state.binding(slot) else {
            dynamic_err!(XPDY0002, "variable slot {} is not bound", slot.0);
        };
        *state.data_mut(offset) = NodeState::Buffer { items, pos: 0 };
    }
    Ok(advance_buffer(state.data_mut(offset)))
}

/// A single optional atomic value, as required of operands like URIs
/// and range bounds.
pub(super) fn optional_atomic(items: Vec<Item>, what: &str, ev: &Evaluator<'_>) -> XylemResult<Option<Item>> {
    let mut atoms = atomize(&items, ev.ctx.store.as_ref());
    if atoms.len() > 1 {
        dynamic_err!(XPTY0004, "{what} must be a single value, got {} items", atoms.len());
    }
    Ok(atoms.pop())
}

impl Evaluator<'_> {
    pub(super) fn next_concat(
        &self,
        children: &[PlanNodeId],
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        loop {
            let NodeState::Cursor(current) = *state.data_mut(offset) else {
                return Ok(None);
            };
            let Some(&child) = children.get(current) else {
                return Ok(None);
            };
            if let Some(item) = self.next(child, state)? {
                return Ok(Some(item));
            }
            *state.data_mut(offset) = NodeState::Cursor(current + 1);
        }
    }

    pub(super) fn eval_scalar(
        &self,
        op: ScalarOp,
        args: &[PlanNodeId],
        state: &mut PlanState,
    ) -> XylemResult<Vec<Item>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.drain(*arg, state)?);
        }
        op.eval(values, self.ctx)
    }

    pub(super) fn next_range(
        &self,
        low: PlanNodeId,
        high: PlanNodeId,
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        if matches!(state.data_mut(offset), NodeState::Empty) {
            let bounds = (self.range_bound(low, state)?, self.range_bound(high, state)?);
            *state.data_mut(offset) = match bounds {
                (Some(next), Some(last)) => NodeState::Range { next, last },
                _ => NodeState::Range { next: 1, last: 0 },
            };
        }

        self.ctx.check_cancelled()?;
        let NodeState::Range { next, last } = state.data_mut(offset) else {
            return Ok(None);
        };
        if *next > *last {
            return Ok(None);
        }
        let value = *next;
        if value == *last {
            // Avoids overflow at i64::MAX.
            *next = 1;
            *last = 0;
        } else {
            *next += 1;
        }
        Ok(Some(Item::Integer(value)))
    }

    fn range_bound(&self, id: PlanNodeId, state: &mut PlanState) -> XylemResult<Option<i64>> {
        let items = self.drain(id, state)?;
        match optional_atomic(items, "range bound", self)? {
            None => Ok(None),
            Some(item) => match Numeric::from_item(&item)? {
                Numeric::Int(v) => Ok(Some(v)),
                Numeric::Dbl(_) => dynamic_err!(XPTY0004, "range bound {item} is not an integer"),
            },
        }
    }

    pub(super) fn next_if(
        &self,
        cond: PlanNodeId,
        branches: [PlanNodeId; 2],
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        if matches!(state.data_mut(offset), NodeState::Empty) {
            let items = self.drain(cond, state)?;
            let chosen = if effective_boolean_value(&items)? { 0 } else { 1 };
            *state.data_mut(offset) = NodeState::Branch(chosen);
        }
        let NodeState::Branch(chosen) = *state.data_mut(offset) else {
            return Ok(None);
        };
        self.next(branches[chosen], state)
    }

    pub(super) fn eval_element(
        &self,
        name: &str,
        content: PlanNodeId,
        state: &mut PlanState,
    ) -> XylemResult<Vec<Item>> {
        let items = self.drain(content, state)?;
        let node = self.ctx.store.create_element(name, &items)?;
        Ok(vec![Item::Node(node)])
    }

    pub(super) fn eval_text(&self, content: PlanNodeId, state: &mut PlanState) -> XylemResult<Vec<Item>> {
        let items = self.drain(content, state)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let text = atomize(&items, self.ctx.store.as_ref())
            .iter()
            .map(canonical_string)
            .collect::<Vec<_>>()
            .join(" ");
        let node = self.ctx.store.create_text(&text)?;
        Ok(vec![Item::Node(node)])
    }

    pub(super) fn eval_type_test(
        &self,
        op: TypeOp,
        input: PlanNodeId,
        target: &SequenceType,
        state: &mut PlanState,
    ) -> XylemResult<Vec<Item>> {
        let items = self.drain(input, state)?;
        match op {
            TypeOp::InstanceOf => Ok(vec![Item::Boolean(target.matches(&items))]),
            TypeOp::Treat => {
                if !target.matches(&items) {
                    dynamic_err!(XPDY0050, "sequence cannot be treated as {target}");
                }
                Ok(items)
            }
            TypeOp::Coerce => super::coerce(items, target, self.ctx.store.as_ref()),
        }
    }

    pub(super) fn eval_update(
        &self,
        kind: UpdateKind,
        target: PlanNodeId,
        source: Option<PlanNodeId>,
        state: &mut PlanState,
    ) -> XylemResult<Vec<Item>> {
        let targets = self.drain(target, state)?;
        let node = match targets.as_slice() {
            [Item::Node(node)] => *node,
            _ => dynamic_err!(XPTY0004, "update target must be a single node, got {} items", targets.len()),
        };
        let source = match source {
            Some(id) => self.drain(id, state)?,
            None => Vec::new(),
        };
        if kind == UpdateKind::Rename && source.len() != 1 {
            dynamic_err!(XPTY0004, "rename requires exactly one new name");
        }
        state.push_update(PendingUpdate::new(kind, node, source));
        Ok(Vec::new())
    }

    pub(super) fn eval_doc(&self, uri: PlanNodeId, state: &mut PlanState) -> XylemResult<Vec<Item>> {
        let items = self.drain(uri, state)?;
        let Some(uri) = optional_atomic(items, "document URI", self)? else {
            return Ok(Vec::new());
        };
        self.ctx.check_cancelled()?;
        let uri = uri
            .as_str()
            .ok_or_else(|| XylemError::type_error(format!("document URI {uri} is not a string")))?
            .to_string();
        match self.ctx.store.document(&uri) {
            Some(node) => Ok(vec![Item::Node(node)]),
            None => dynamic_err!(FODC0002, "no document available at '{uri}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::plan::{PlanBuilder, PlanKind};
    use crate::store::{DocumentBuilder, MemoryNodeStore, NodeStore};
    use crate::DynamicContext;

    fn int(b: &mut PlanBuilder, v: i64) -> PlanNodeId {
        b.add_node(PlanKind::Literal(Arc::from(vec![Item::Integer(v)])))
    }

    fn run(b: PlanBuilder, root: PlanNodeId, ctx: &DynamicContext) -> XylemResult<Vec<Item>> {
        let plan = b.finish(root)?;
        let mut state = PlanState::new(&plan);
        let ev = Evaluator::new(&plan, ctx);
        ev.open(root, &mut state)?;
        let out = ev.drain(root, &mut state);
        ev.close(root, &mut state);
        out
    }

    #[test]
    fn test_range_is_inclusive() {
        let mut b = PlanBuilder::new();
        let (low, high) = (int(&mut b, 3), int(&mut b, 6));
        let root = b.add_node(PlanKind::Range { low, high });
        let out = run(b, root, &DynamicContext::default()).unwrap();
        assert_eq!(out, (3..=6).map(Item::Integer).collect::<Vec<_>>());
    }

    #[test]
    fn test_range_empty_when_inverted() {
        let mut b = PlanBuilder::new();
        let (low, high) = (int(&mut b, 5), int(&mut b, 1));
        let root = b.add_node(PlanKind::Range { low, high });
        assert!(run(b, root, &DynamicContext::default()).unwrap().is_empty());
    }

    #[test]
    fn test_range_observes_cancellation() {
        let (handle, rx) = crate::CancellationHandle::new();
        let ctx = DynamicContext::default().with_cancellation(rx);
        handle.cancel();

        let mut b = PlanBuilder::new();
        let (low, high) = (int(&mut b, 1), int(&mut b, i64::MAX));
        let root = b.add_node(PlanKind::Range { low, high });
        let err = run(b, root, &ctx).unwrap_err();
        assert!(matches!(err, XylemError::Cancelled(_)));
    }

    #[test]
    fn test_if_picks_branch_once() {
        let mut b = PlanBuilder::new();
        let cond = b.add_node(PlanKind::Literal(Arc::from(vec![Item::Boolean(false)])));
        let (t, e) = (int(&mut b, 1), int(&mut b, 2));
        let root = b.add_node(PlanKind::If {
            cond,
            then_branch: t,
            else_branch: e,
        });
        assert_eq!(run(b, root, &DynamicContext::default()).unwrap(), vec![Item::Integer(2)]);
    }

    #[test]
    fn test_doc_fetch_missing_document() {
        let mut b = PlanBuilder::new();
        let uri = b.add_node(PlanKind::Literal(Arc::from(vec![Item::from("missing.xml")])));
        let root = b.add_node(PlanKind::DocFetch { uri });
        let err = run(b, root, &DynamicContext::default()).unwrap_err();
        assert_eq!(err.code().map(|c| c.as_str()), Some("FODC0002"));
    }

    #[test]
    fn test_doc_fetch_and_element_constructor() {
        let store = Arc::new(MemoryNodeStore::new());
        let doc = store.load("books.xml", DocumentBuilder::new().leaf("title", "Dune"));
        let ctx = DynamicContext::new(store.clone());

        let mut b = PlanBuilder::new();
        let uri = b.add_node(PlanKind::Literal(Arc::from(vec![Item::from("books.xml")])));
        let fetch = b.add_node(PlanKind::DocFetch { uri });
        let root = b.add_node(PlanKind::ElementCtor {
            name: "copy".to_string(),
            content: fetch,
        });
        let out = run(b, root, &ctx).unwrap();

        let Some(Item::Node(copy)) = out.first().cloned() else {
            panic!("expected a node, got {out:?}");
        };
        assert_ne!(copy, doc);
        assert_eq!(store.string_value(copy), "Dune");
    }

    #[test]
    fn test_update_is_recorded_not_applied() {
        let store = Arc::new(MemoryNodeStore::new());
        let doc = store.load("d.xml", DocumentBuilder::new().leaf("a", "x"));
        let ctx = DynamicContext::new(store);

        let mut b = PlanBuilder::new();
        let target = b.add_node(PlanKind::Literal(Arc::from(vec![Item::Node(doc)])));
        let root = b.add_node(PlanKind::Update {
            kind: UpdateKind::Delete,
            target,
            source: None,
        });
        let plan = b.finish(root).unwrap();
        let mut state = PlanState::new(&plan);
        let ev = Evaluator::new(&plan, &ctx);
        ev.open(root, &mut state).unwrap();
        assert!(ev.drain(root, &mut state).unwrap().is_empty());

        assert_eq!(
            state.pending_updates(),
            &[PendingUpdate::new(UpdateKind::Delete, doc, Vec::new())]
        );
    }
}
