//! Execution driver.

use std::sync::Arc;

use common_error::{XylemError, XylemResult};
use log::{debug, trace};
use xylem_core::Item;

use crate::context::DynamicContext;
use crate::iterators::Evaluator;
use crate::plan::Plan;
use crate::state::PlanState;
use crate::update::PendingUpdate;

/// One execution of a shared plan.
///
/// Owns its [`PlanState`]; the plan is only read. Any error raised by
/// `open`, `next` or `reset` closes every iterator before it is returned,
/// and dropping the execution closes whatever is still open.
///
/// # Lifecycle
///
/// ```text
/// new → open → next* → (reset → next*)* → close
/// ```
pub struct Execution {
    plan: Arc<Plan>,
    ctx: DynamicContext,
    state: PlanState,
    opened: bool,
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("operators", &self.plan.operator_count())
            .field("opened", &self.opened)
            .finish_non_exhaustive()
    }
}

impl Execution {
    /// Allocate a fresh state for `plan`.
    pub fn new(plan: Arc<Plan>, ctx: DynamicContext) -> Self {
        let state = PlanState::new(&plan);
        Self {
            plan,
            ctx,
            state,
            opened: false,
        }
    }

    /// Drive `plan` with an externally allocated state. The state is
    /// cleared first, so a state left over from an earlier run is reusable.
    pub fn with_state(plan: Arc<Plan>, ctx: DynamicContext, mut state: PlanState) -> XylemResult<Self> {
        if !state.fits(&plan) {
            return Err(XylemError::internal(format!(
                "plan state of {} records does not fit a plan needing {}",
                state.len(),
                plan.state_size()
            )));
        }
        state.clear();
        Ok(Self {
            plan,
            ctx,
            state,
            opened: false,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn context(&self) -> &DynamicContext {
        &self.ctx
    }

    pub fn open(&mut self) -> XylemResult<()> {
        debug!(
            "opening plan with {} operators, {} state records",
            self.plan.operator_count(),
            self.plan.state_size()
        );
        self.opened = true;
        let result = Evaluator::new(&self.plan, &self.ctx).open(self.plan.root(), &mut self.state);
        self.close_on_error(result)
    }

    /// Next result item, `None` once exhausted.
    pub fn next(&mut self) -> XylemResult<Option<Item>> {
        let result = Evaluator::new(&self.plan, &self.ctx).next(self.plan.root(), &mut self.state);
        self.close_on_error(result)
    }

    /// Restart the result sequence from the beginning.
    pub fn reset(&mut self) -> XylemResult<()> {
        trace!("reset execution");
        let result = Evaluator::new(&self.plan, &self.ctx).reset(self.plan.root(), &mut self.state);
        self.close_on_error(result)
    }

    /// Release every iterator. Idempotent.
    pub fn close(&mut self) {
        if self.opened {
            Evaluator::new(&self.plan, &self.ctx).close(self.plan.root(), &mut self.state);
            self.opened = false;
        }
    }

    /// Open, pull every item and close.
    pub fn collect(mut self) -> XylemResult<Vec<Item>> {
        if !self.opened {
            self.open()?;
        }
        let mut items = Vec::new();
        while let Some(item) = self.next()? {
            items.push(item);
        }
        self.close();
        Ok(items)
    }

    pub fn pending_updates(&self) -> &[PendingUpdate] {
        self.state.pending_updates()
    }

    /// Take the pending update list, leaving it empty.
    pub fn take_pending_updates(&mut self) -> Vec<PendingUpdate> {
        self.state.take_pending_updates()
    }

    fn close_on_error<T>(&mut self, result: XylemResult<T>) -> XylemResult<T> {
        if let Err(e) = &result {
            debug!("execution failed, closing iterators: {e}");
            self.close();
        }
        result
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanBuilder, PlanKind};
    use crate::IterPhase;

    fn ints(values: &[i64]) -> PlanKind {
        PlanKind::Literal(values.iter().map(|v| Item::Integer(*v)).collect::<Vec<_>>().into())
    }

    #[test]
    fn test_collect() {
        let mut b = PlanBuilder::new();
        let root = b.add_node(ints(&[1, 2]));
        let plan = Arc::new(b.finish(root).unwrap());
        let out = Execution::new(plan, DynamicContext::default()).collect().unwrap();
        assert_eq!(out, vec![Item::Integer(1), Item::Integer(2)]);
    }

    #[test]
    fn test_error_closes_every_iterator() {
        let mut b = PlanBuilder::new();
        let ok = b.add_node(ints(&[1]));
        let bad = b.add_node(PlanKind::Literal(vec![Item::from("x")].into()));
        let sum = b.add_node(PlanKind::Scalar {
            op: crate::functions::ScalarOp::Sum,
            args: vec![bad],
        });
        let root = b.add_node(PlanKind::Concat(vec![ok, sum]));
        let plan = Arc::new(b.finish(root).unwrap());

        let mut exec = Execution::new(plan.clone(), DynamicContext::default());
        exec.open().unwrap();
        assert_eq!(exec.next().unwrap(), Some(Item::Integer(1)));
        assert!(exec.next().is_err());

        for node in plan.nodes() {
            assert_eq!(exec.state().phase(node.state_offset), Some(IterPhase::Closed));
        }
    }

    #[test]
    fn test_foreign_state_is_rejected() {
        let mut b = PlanBuilder::new();
        let root = b.add_node(ints(&[1]));
        let small = Arc::new(b.finish(root).unwrap());

        let mut b = PlanBuilder::new();
        let a = b.add_node(ints(&[1]));
        let c = b.add_node(ints(&[2]));
        let root = b.add_node(PlanKind::Concat(vec![a, c]));
        let large = b.finish(root).unwrap();

        let state = PlanState::new(&large);
        assert!(Execution::with_state(small, DynamicContext::default(), state).is_err());
    }

    #[test]
    fn test_reused_state_starts_unopened() {
        let mut b = PlanBuilder::new();
        let a = b.add_node(ints(&[1]));
        let c = b.add_node(ints(&[2]));
        let root = b.add_node(PlanKind::Concat(vec![a, c]));
        let plan = Arc::new(b.finish(root).unwrap());

        let mut state = PlanState::new(&plan);
        for node in plan.nodes() {
            state.record_mut(node.state_offset).phase = IterPhase::Open;
        }
        let exec = Execution::with_state(plan, DynamicContext::default(), state).unwrap();
        assert_eq!(exec.collect().unwrap(), vec![Item::Integer(1), Item::Integer(2)]);
    }
}
