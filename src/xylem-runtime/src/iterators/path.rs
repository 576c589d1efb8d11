//! Path step navigation.

use common_error::{dynamic_err, XylemResult};
use xylem_core::{Axis, Item, NodeRef, NodeTest};

use super::Evaluator;
use crate::plan::PlanNodeId;
use crate::state::{NodeState, PlanState};
use crate::store::{NodeKind, NodeStore};

impl Evaluator<'_> {
    /// Navigate from each input node in turn. Output follows input order;
    /// document order across inputs is the job of an explicit sort.
    pub(super) fn next_path(
        &self,
        input: PlanNodeId,
        axis: Axis,
        test: &NodeTest,
        offset: usize,
        state: &mut PlanState,
    ) -> XylemResult<Option<Item>> {
        loop {
            if let NodeState::Path(pending) = state.data_mut(offset) {
                if let Some(item) = pending.pop_front() {
                    return Ok(Some(item));
                }
            }
            let Some(item) = self.next(input, state)? else {
                return Ok(None);
            };
            let Some(node) = item.as_node() else {
                dynamic_err!(XPTY0019, "path step applied to atomic value {item}");
            };
            let store = self.ctx.store.as_ref();
            let found = step(store, node, axis)
                .into_iter()
                .filter(|n| matches_test(store, *n, test))
                .map(Item::Node);
            if let NodeState::Path(pending) = state.data_mut(offset) {
                pending.extend(found);
            }
        }
    }
}

fn step(store: &dyn NodeStore, node: NodeRef, axis: Axis) -> Vec<NodeRef> {
    match axis {
        Axis::Child => store.children(node),
        Axis::Descendant => store.descendants(node),
        Axis::DescendantOrSelf => {
            let mut out = vec![node];
            out.extend(store.descendants(node));
            out
        }
        Axis::Parent => store.parent(node).into_iter().collect(),
        Axis::SelfAxis => vec![node],
    }
}

fn matches_test(store: &dyn NodeStore, node: NodeRef, test: &NodeTest) -> bool {
    match test {
        NodeTest::AnyNode => true,
        NodeTest::Text => store.kind(node) == Some(NodeKind::Text),
        NodeTest::Element(None) => store.kind(node) == Some(NodeKind::Element),
        NodeTest::Element(Some(name)) => {
            store.kind(node) == Some(NodeKind::Element) && store.name(node).as_deref() == Some(name)
        }
    }
}
