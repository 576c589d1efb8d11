//! The plan iterator protocol.
//!
//! Iterator kinds form a closed enum, so the protocol is one dispatch
//! table per operation rather than a trait object per node. Every call
//! takes the execution's [`PlanState`] explicitly and reaches its own
//! record through the node's pre-assigned offset.
//!
//! # Lifecycle
//!
//! ```text
//! open → next* → (reset → next*)* → close
//! ```
//!
//! - `open` is valid on an unopened (or closed) iterator and opens the
//!   whole subtree
//! - `next` returns `Ok(None)` on exhaustion and keeps returning it until
//!   `reset`
//! - `reset` restarts the subtree without releasing what it has built
//! - `close` is valid in any phase and idempotent

mod basic;
mod call;
mod flwor;
mod join;
mod path;

use std::sync::Arc;

use common_error::{XylemError, XylemResult};
use log::trace;
use xylem_core::Item;

use crate::context::DynamicContext;
use crate::plan::{Plan, PlanKind, PlanNodeId};
use crate::state::{IterPhase, NodeState, PlanState};

pub use call::coerce;

/// Drives plan nodes against one execution state.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    plan: &'a Plan,
    ctx: &'a DynamicContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(plan: &'a Plan, ctx: &'a DynamicContext) -> Self {
        Self { plan, ctx }
    }

    pub fn plan(&self) -> &'a Plan {
        self.plan
    }

    pub fn context(&self) -> &'a DynamicContext {
        self.ctx
    }

    fn offset(&self, id: PlanNodeId) -> usize {
        self.plan.node(id).state_offset
    }

    fn kind(&self, id: PlanNodeId) -> &'a PlanKind {
        &self.plan.node(id).kind
    }

    /// Open `id` and its subtree.
    pub fn open(&self, id: PlanNodeId, state: &mut PlanState) -> XylemResult<()> {
        let kind = self.kind(id);
        let offset = self.offset(id);
        let phase = state.record(offset).phase;
        if !phase.needs_open() {
            return Err(XylemError::internal(format!(
                "{} at offset {offset} opened while {phase:?}",
                kind.name()
            )));
        }
        trace!("open {} @{offset}", kind.name());

        let record = state.record_mut(offset);
        record.phase = IterPhase::Open;
        record.data = initial_state(kind);
        self.init_clause_records(kind, offset, state, IterPhase::Open);

        for child in kind.children() {
            self.open(child, state)?;
        }
        Ok(())
    }

    /// Produce the next item of `id`.
    pub fn next(&self, id: PlanNodeId, state: &mut PlanState) -> XylemResult<Option<Item>> {
        let offset = self.offset(id);
        match state.record(offset).phase {
            IterPhase::Open => {}
            IterPhase::Exhausted => return Ok(None),
            phase => {
                return Err(XylemError::internal(format!(
                    "next on {} at offset {offset} while {phase:?}",
                    self.kind(id).name()
                )))
            }
        }

        let item = self.produce(id, offset, state)?;
        if item.is_none() {
            state.record_mut(offset).phase = IterPhase::Exhausted;
        }
        Ok(item)
    }

    /// Return `id` and its subtree to a fresh open state.
    pub fn reset(&self, id: PlanNodeId, state: &mut PlanState) -> XylemResult<()> {
        let kind = self.kind(id);
        let offset = self.offset(id);
        let phase = state.record(offset).phase;
        if !phase.can_produce() {
            return Err(XylemError::internal(format!(
                "reset on {} at offset {offset} while {phase:?}",
                kind.name()
            )));
        }

        for child in kind.children() {
            self.reset(child, state)?;
        }

        let record = state.record_mut(offset);
        record.phase = IterPhase::Open;
        record.data = match std::mem::take(&mut record.data) {
            // A built index depends only on closed inputs and survives reset.
            NodeState::Index { table, .. } => NodeState::Index {
                table,
                matches: None,
            },
            _ => initial_state(kind),
        };
        self.init_clause_records(kind, offset, state, IterPhase::Open);
        Ok(())
    }

    /// Release `id` and its subtree. Valid in any phase.
    pub fn close(&self, id: PlanNodeId, state: &mut PlanState) {
        let kind = self.kind(id);
        let offset = self.offset(id);
        for child in kind.children() {
            self.close(child, state);
        }
        if state.record(offset).phase != IterPhase::Closed {
            trace!("close {} @{offset}", kind.name());
        }
        let record = state.record_mut(offset);
        record.phase = IterPhase::Closed;
        record.data = NodeState::Empty;
        self.init_clause_records(kind, offset, state, IterPhase::Closed);
    }

    /// Pull every remaining item of `id`.
    pub(crate) fn drain(&self, id: PlanNodeId, state: &mut PlanState) -> XylemResult<Vec<Item>> {
        let mut out = Vec::new();
        while let Some(item) = self.next(id, state)? {
            out.push(item);
        }
        Ok(out)
    }

    /// Reset `id` and pull all of its items.
    pub(crate) fn rerun(&self, id: PlanNodeId, state: &mut PlanState) -> XylemResult<Vec<Item>> {
        self.reset(id, state)?;
        self.drain(id, state)
    }

    fn init_clause_records(&self, kind: &PlanKind, offset: usize, state: &mut PlanState, phase: IterPhase) {
        if let PlanKind::Flwor { clauses, .. } = kind {
            for i in 0..clauses.len() {
                let record = state.record_mut(offset + 1 + i);
                record.phase = phase;
                record.data = NodeState::Clause {
                    fresh: true,
                    position: 0,
                };
            }
        }
    }

    fn produce(&self, id: PlanNodeId, offset: usize, state: &mut PlanState) -> XylemResult<Option<Item>> {
        match self.kind(id) {
            PlanKind::Literal(items) => Ok(basic::next_literal(items, offset, state)),
            PlanKind::Var(slot) => basic::next_var(*slot, offset, state),
            PlanKind::Concat(children) => self.next_concat(children, offset, state),
            PlanKind::Scalar { op, args } => self.buffered(offset, state, |ev, st| ev.eval_scalar(*op, args, st)),
            PlanKind::Range { low, high } => self.next_range(*low, *high, offset, state),
            PlanKind::SortDistinct { input, mode } => self.buffered(offset, state, |ev, st| {
                let items = ev.drain(*input, st)?;
                mode.apply(items)
            }),
            PlanKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.next_if(*cond, [*then_branch, *else_branch], offset, state),
            PlanKind::Flwor { clauses, ret } => self.next_flwor(clauses, *ret, offset, state),
            PlanKind::Filter {
                input,
                predicate,
                dot,
                position,
            } => self.next_filter(*input, *predicate, *dot, *position, offset, state),
            PlanKind::Quantified {
                quantifier,
                var,
                domain,
                test,
            } => self.buffered(offset, state, |ev, st| {
                ev.eval_quantified(*quantifier, *var, *domain, *test, st)
            }),
            PlanKind::PathStep { input, axis, test } => self.next_path(*input, *axis, test, offset, state),
            PlanKind::ElementCtor { name, content } => {
                self.buffered(offset, state, |ev, st| ev.eval_element(name, *content, st))
            }
            PlanKind::TextCtor { content } => {
                self.buffered(offset, state, |ev, st| ev.eval_text(*content, st))
            }
            PlanKind::TypeTest { op, input, target } => self.buffered(offset, state, |ev, st| {
                ev.eval_type_test(*op, *input, target, st)
            }),
            PlanKind::Update {
                kind,
                target,
                source,
            } => self.buffered(offset, state, |ev, st| ev.eval_update(*kind, *target, *source, st)),
            PlanKind::DocFetch { uri } => self.buffered(offset, state, |ev, st| ev.eval_doc(*uri, st)),
            PlanKind::UserCall { function, args } => {
                self.buffered(offset, state, |ev, st| ev.eval_call(*function, args, st))
            }
            PlanKind::IndexProbe {
                build,
                build_var,
                build_key,
                probe_key,
            } => self.next_probe(*build, *build_var, *build_key, *probe_key, offset, state),
        }
    }

    /// Compute the full result on the first call, then stream it.
    fn buffered<F>(&self, offset: usize, state: &mut PlanState, compute: F) -> XylemResult<Option<Item>>
    where
        F: FnOnce(&Self, &mut PlanState) -> XylemResult<Vec<Item>>,
    {
        if matches!(state.data_mut(offset), NodeState::Empty) {
            let items = compute(self, state)?;
            *state.data_mut(offset) = NodeState::Buffer {
                items: Arc::from(items),
                pos: 0,
            };
        }
        Ok(basic::advance_buffer(state.data_mut(offset)))
    }
}

fn initial_state(kind: &PlanKind) -> NodeState {
    match kind {
        PlanKind::Literal(_) | PlanKind::Concat(_) => NodeState::Cursor(0),
        PlanKind::Flwor { .. } => NodeState::Flwor {
            started: false,
            ret_active: false,
        },
        PlanKind::Filter { .. } => NodeState::Filter { position: 0 },
        PlanKind::PathStep { .. } => NodeState::Path(Default::default()),
        PlanKind::IndexProbe { .. } => NodeState::Index {
            table: None,
            matches: None,
        },
        _ => NodeState::Empty,
    }
}
