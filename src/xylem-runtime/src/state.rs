//! Per-execution mutable state.
//!
//! A [`PlanState`] is an array of state records addressed by the integer
//! offsets a [`Plan`] assigned to its nodes, plus the variable bindings
//! and pending updates of one execution. The plan itself is never
//! mutated, so any number of states can drive the same plan at once.

use std::collections::{HashMap, VecDeque};

use xylem_core::{Item, Sequence};

use crate::plan::{Plan, VarSlot};
use crate::update::PendingUpdate;

/// Lifecycle of one iterator instance.
///
/// ```text
/// Unopened → Open ⇄ Exhausted → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterPhase {
    /// Not opened yet.
    #[default]
    Unopened,
    /// Open and able to produce items.
    Open,
    /// `next` signalled the end; further calls keep signalling it.
    Exhausted,
    /// Resources released.
    Closed,
}

impl IterPhase {
    /// Whether `next` may be called.
    pub fn can_produce(self) -> bool {
        matches!(self, Self::Open | Self::Exhausted)
    }

    /// Whether `open` may be called.
    pub fn needs_open(self) -> bool {
        matches!(self, Self::Unopened | Self::Closed)
    }
}

/// Hash key of an index probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum IndexKey {
    Int(i64),
    Number(u64),
    Text(String),
    Boolean(bool),
}

/// Iterator-specific data of a state record.
#[derive(Debug, Default)]
pub(crate) enum NodeState {
    #[default]
    Empty,
    Cursor(usize),
    Buffer {
        items: Sequence,
        pos: usize,
    },
    Range {
        next: i64,
        last: i64,
    },
    Branch(usize),
    Flwor {
        started: bool,
        ret_active: bool,
    },
    Clause {
        fresh: bool,
        position: i64,
    },
    Filter {
        position: i64,
    },
    Path(VecDeque<Item>),
    Index {
        table: Option<HashMap<IndexKey, Vec<Item>>>,
        matches: Option<VecDeque<Item>>,
    },
}

/// One state record.
#[derive(Debug, Default)]
pub struct StateRecord {
    pub phase: IterPhase,
    pub(crate) data: NodeState,
}

/// Mutable state of one execution of a plan.
#[derive(Debug)]
pub struct PlanState {
    records: Vec<StateRecord>,
    vars: Vec<Option<Sequence>>,
    pending: Vec<PendingUpdate>,
    depth: usize,
}

impl PlanState {
    /// Allocate a fresh state for `plan`.
    pub fn new(plan: &Plan) -> Self {
        Self::with_depth(plan, 0)
    }

    /// State of a function body called at the given depth.
    pub(crate) fn with_depth(plan: &Plan, depth: usize) -> Self {
        Self {
            records: (0..plan.state_size()).map(|_| StateRecord::default()).collect(),
            vars: vec![None; plan.var_slots()],
            pending: Vec::new(),
            depth,
        }
    }

    /// Number of state records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Phase of the iterator owning `offset`.
    pub fn phase(&self, offset: usize) -> Option<IterPhase> {
        self.records.get(offset).map(|r| r.phase)
    }

    /// Nesting depth of user function calls.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn pending_updates(&self) -> &[PendingUpdate] {
        &self.pending
    }

    pub fn take_pending_updates(&mut self) -> Vec<PendingUpdate> {
        std::mem::take(&mut self.pending)
    }

    /// Return every record to its unopened state and drop bindings and
    /// pending updates, keeping the allocation.
    pub fn clear(&mut self) {
        self.records.iter_mut().for_each(|r| *r = StateRecord::default());
        self.vars.iter_mut().for_each(|v| *v = None);
        self.pending.clear();
    }

    /// Whether this state was allocated for `plan`.
    pub fn fits(&self, plan: &Plan) -> bool {
        self.records.len() == plan.state_size() && self.vars.len() == plan.var_slots()
    }

    pub(crate) fn record(&self, offset: usize) -> &StateRecord {
        &self.records[offset]
    }

    pub(crate) fn record_mut(&mut self, offset: usize) -> &mut StateRecord {
        &mut self.records[offset]
    }

    pub(crate) fn data_mut(&mut self, offset: usize) -> &mut NodeState {
        &mut self.records[offset].data
    }

    pub(crate) fn bind(&mut self, slot: VarSlot, value: Sequence) {
        self.vars[slot.index()] = Some(value);
    }

    pub(crate) fn binding(&self, slot: VarSlot) -> Option<Sequence> {
        self.vars[slot.index()].clone()
    }

    pub(crate) fn push_update(&mut self, update: PendingUpdate) {
        self.pending.push(update);
    }

    pub(crate) fn extend_updates(&mut self, updates: Vec<PendingUpdate>) {
        self.pending.extend(updates);
    }
}
