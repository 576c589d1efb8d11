//! Immutable plan iterator trees.
//!
//! A [`Plan`] is built once per compiled query and shared read-only by
//! every execution. Each node is assigned a contiguous range of state
//! record offsets at construction time; executions address their
//! [`PlanState`](crate::PlanState) through those offsets only.

mod codec;
mod explain;

use common_error::{XylemError, XylemResult};
use serde::{Deserialize, Serialize};
use xylem_core::{Axis, NodeTest, Quantifier, Sequence, SequenceType, TypeOp, UpdateKind};

use crate::functions::{ScalarOp, SortDistinctMode};

pub use codec::{decode_plan, encode_plan, PLAN_SCHEMA_VERSION};
pub use explain::PlanView;

/// Index of a node in a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanNodeId(pub u32);

impl PlanNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Slot of a variable binding in the per-execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarSlot(pub u32);

impl VarSlot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One clause of a FLWOR iterator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanClause {
    For {
        var: VarSlot,
        position: Option<VarSlot>,
        domain: PlanNodeId,
    },
    Let {
        var: VarSlot,
        domain: PlanNodeId,
    },
    Where(PlanNodeId),
    /// Sort keys with their `descending` flags.
    OrderBy(Vec<(PlanNodeId, bool)>),
}

impl PlanClause {
    fn children(&self) -> Vec<PlanNodeId> {
        match self {
            Self::For { domain, .. } | Self::Let { domain, .. } => vec![*domain],
            Self::Where(c) => vec![*c],
            Self::OrderBy(keys) => keys.iter().map(|(k, _)| *k).collect(),
        }
    }

    fn slots(&self) -> Vec<VarSlot> {
        match self {
            Self::For { var, position, .. } => {
                let mut out = vec![*var];
                out.extend(position.iter().copied());
                out
            }
            Self::Let { var, .. } => vec![*var],
            Self::Where(_) | Self::OrderBy(_) => Vec::new(),
        }
    }
}

/// Iterator variants.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanKind {
    /// Source: a constant sequence.
    Literal(Sequence),
    /// Source: the current binding of a variable.
    Var(VarSlot),
    /// Children evaluated left to right.
    Concat(Vec<PlanNodeId>),
    Scalar {
        op: ScalarOp,
        args: Vec<PlanNodeId>,
    },
    /// Lazily generated integer range.
    Range {
        low: PlanNodeId,
        high: PlanNodeId,
    },
    SortDistinct {
        input: PlanNodeId,
        mode: SortDistinctMode,
    },
    If {
        cond: PlanNodeId,
        then_branch: PlanNodeId,
        else_branch: PlanNodeId,
    },
    Flwor {
        clauses: Vec<PlanClause>,
        ret: PlanNodeId,
    },
    Filter {
        input: PlanNodeId,
        predicate: PlanNodeId,
        dot: VarSlot,
        position: Option<VarSlot>,
    },
    Quantified {
        quantifier: Quantifier,
        var: VarSlot,
        domain: PlanNodeId,
        test: PlanNodeId,
    },
    PathStep {
        input: PlanNodeId,
        axis: Axis,
        test: NodeTest,
    },
    ElementCtor {
        name: String,
        content: PlanNodeId,
    },
    TextCtor {
        content: PlanNodeId,
    },
    TypeTest {
        op: TypeOp,
        input: PlanNodeId,
        target: SequenceType,
    },
    Update {
        kind: UpdateKind,
        target: PlanNodeId,
        source: Option<PlanNodeId>,
    },
    /// Source: fetch a document by URI.
    DocFetch {
        uri: PlanNodeId,
    },
    /// Call of a function plan; the body runs in a nested state.
    UserCall {
        function: u32,
        args: Vec<PlanNodeId>,
    },
    IndexProbe {
        build: PlanNodeId,
        build_var: VarSlot,
        build_key: PlanNodeId,
        probe_key: PlanNodeId,
    },
}

impl PlanKind {
    /// Number of state records the iterator needs.
    pub fn state_slots(&self) -> usize {
        match self {
            // One record for the block plus one cursor per clause.
            Self::Flwor { clauses, .. } => 1 + clauses.len(),
            _ => 1,
        }
    }

    /// Children in open/close order.
    pub fn children(&self) -> Vec<PlanNodeId> {
        match self {
            Self::Literal(_) | Self::Var(_) => Vec::new(),
            Self::Concat(children) => children.clone(),
            Self::Scalar { args, .. } | Self::UserCall { args, .. } => args.clone(),
            Self::Range { low, high } => vec![*low, *high],
            Self::SortDistinct { input, .. }
            | Self::PathStep { input, .. }
            | Self::TypeTest { input, .. } => vec![*input],
            Self::If {
                cond,
                then_branch,
                else_branch,
            } => vec![*cond, *then_branch, *else_branch],
            Self::Flwor { clauses, ret } => {
                let mut out: Vec<PlanNodeId> = clauses.iter().flat_map(PlanClause::children).collect();
                out.push(*ret);
                out
            }
            Self::Filter {
                input, predicate, ..
            } => vec![*input, *predicate],
            Self::Quantified { domain, test, .. } => vec![*domain, *test],
            Self::ElementCtor { content, .. } | Self::TextCtor { content } => vec![*content],
            Self::Update { target, source, .. } => {
                let mut out = vec![*target];
                out.extend(source.iter().copied());
                out
            }
            Self::DocFetch { uri } => vec![*uri],
            Self::IndexProbe {
                build,
                build_key,
                probe_key,
                ..
            } => vec![*build, *build_key, *probe_key],
        }
    }

    /// Variable slots written by the iterator.
    pub fn bound_slots(&self) -> Vec<VarSlot> {
        match self {
            Self::Flwor { clauses, .. } => clauses.iter().flat_map(PlanClause::slots).collect(),
            Self::Filter { dot, position, .. } => {
                let mut out = vec![*dot];
                out.extend(position.iter().copied());
                out
            }
            Self::Quantified { var, .. } => vec![*var],
            Self::IndexProbe { build_var, .. } => vec![*build_var],
            Self::Var(slot) => vec![*slot],
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "LiteralIter",
            Self::Var(_) => "VarIter",
            Self::Concat(_) => "ConcatIter",
            Self::Scalar { .. } => "ScalarIter",
            Self::Range { .. } => "RangeIter",
            Self::SortDistinct { .. } => "SortDistinctIter",
            Self::If { .. } => "IfIter",
            Self::Flwor { .. } => "FlworIter",
            Self::Filter { .. } => "FilterIter",
            Self::Quantified { .. } => "QuantifiedIter",
            Self::PathStep { .. } => "PathStepIter",
            Self::ElementCtor { .. } => "ElementIter",
            Self::TextCtor { .. } => "TextIter",
            Self::TypeTest { .. } => "TypeTestIter",
            Self::Update { .. } => "UpdateIter",
            Self::DocFetch { .. } => "DocIter",
            Self::UserCall { .. } => "UserCallIter",
            Self::IndexProbe { .. } => "IndexProbeIter",
        }
    }
}

/// Static metadata carried over from the rewritten expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub static_type: SequenceType,
    /// Result proven to be in document order.
    pub sorted: bool,
    /// Result proven free of duplicate nodes.
    pub distinct: bool,
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self {
            static_type: SequenceType::any(),
            sorted: false,
            distinct: false,
        }
    }
}

/// A node of the plan arena.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub kind: PlanKind,
    /// First state record owned by this node.
    pub state_offset: usize,
    pub meta: NodeMeta,
}

/// A declared function lowered to a shared sub-plan.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPlan {
    pub name: String,
    pub params: Vec<(VarSlot, SequenceType)>,
    pub return_type: SequenceType,
    pub body: PlanNodeId,
}

/// An immutable, shareable plan iterator tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    nodes: Vec<PlanNode>,
    root: PlanNodeId,
    functions: Vec<FunctionPlan>,
    state_size: usize,
    var_slots: usize,
}

impl Plan {
    pub fn root(&self) -> PlanNodeId {
        self.root
    }

    pub fn node(&self, id: PlanNodeId) -> &PlanNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn functions(&self) -> &[FunctionPlan] {
        &self.functions
    }

    pub fn function(&self, index: u32) -> Option<&FunctionPlan> {
        self.functions.get(index as usize)
    }

    /// Number of state records an execution allocates.
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn var_slots(&self) -> usize {
        self.var_slots
    }

    pub fn operator_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check child references, variable slots and state offsets.
    ///
    /// Offset ranges must be disjoint and inside `state_size`; anything
    /// else is an internal defect.
    pub fn validate(&self) -> XylemResult<()> {
        let len = self.nodes.len();
        let check = |id: PlanNodeId, what: &str| -> XylemResult<()> {
            if id.index() >= len {
                return Err(XylemError::internal(format!(
                    "{what} refers to missing plan node {}",
                    id.0
                )));
            }
            Ok(())
        };

        check(self.root, "root")?;
        for f in &self.functions {
            check(f.body, "function body")?;
            for (slot, _) in &f.params {
                self.check_slot(*slot)?;
            }
        }

        let mut ranges = Vec::with_capacity(len);
        for (i, node) in self.nodes.iter().enumerate() {
            for child in node.kind.children() {
                check(child, &format!("node {i}"))?;
            }
            for slot in node.kind.bound_slots() {
                self.check_slot(slot)?;
            }
            if let PlanKind::UserCall { function, .. } = &node.kind {
                if self.function(*function).is_none() {
                    return Err(XylemError::internal(format!(
                        "node {i} calls missing function {function}"
                    )));
                }
            }
            let end = node
                .state_offset
                .checked_add(node.kind.state_slots())
                .ok_or_else(|| XylemError::internal(format!("node {i} state offset overflows")))?;
            if end > self.state_size {
                return Err(XylemError::internal(format!(
                    "node {i} state range {}..{end} exceeds state size {}",
                    node.state_offset, self.state_size
                )));
            }
            ranges.push((node.state_offset, end, i));
        }

        let needed = self
            .nodes
            .iter()
            .try_fold(0usize, |acc, node| acc.checked_add(node.kind.state_slots()))
            .ok_or_else(|| XylemError::internal("state size overflows"))?;
        if self.state_size > needed {
            return Err(XylemError::internal(format!(
                "state size {} exceeds the {needed} records the plan needs",
                self.state_size
            )));
        }

        self.check_tree_shape()?;

        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            let ((_, end_a, a), (start_b, _, b)) = (pair[0], pair[1]);
            if start_b < end_a {
                return Err(XylemError::internal(format!(
                    "state offset collision between plan nodes {a} and {b}"
                )));
            }
        }
        Ok(())
    }

    /// Every node hangs below exactly one parent: no cycles, no sharing.
    fn check_tree_shape(&self) -> XylemResult<()> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<PlanNodeId> = std::iter::once(self.root)
            .chain(self.functions.iter().map(|f| f.body))
            .collect();
        while let Some(id) = stack.pop() {
            let visited = &mut seen[id.index()];
            if *visited {
                return Err(XylemError::internal(format!(
                    "plan node {} is reached more than once",
                    id.0
                )));
            }
            *visited = true;
            stack.extend(self.node(id).kind.children());
        }
        Ok(())
    }

    fn check_slot(&self, slot: VarSlot) -> XylemResult<()> {
        if slot.index() >= self.var_slots {
            return Err(XylemError::internal(format!(
                "variable slot {} out of range",
                slot.0
            )));
        }
        Ok(())
    }

    /// Render the plan for debugging.
    pub fn explain(&self) -> String {
        let mut out = common_display::DisplayTree::new(PlanView::new(self, self.root)).to_string();
        for (i, f) in self.functions.iter().enumerate() {
            out.push_str(&format!("function #{i} {}:\n", f.name));
            out.push_str(&common_display::DisplayTree::new(PlanView::new(self, f.body)).to_string());
        }
        out
    }
}

/// Assigns state offsets while a plan is assembled.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    nodes: Vec<PlanNode>,
    functions: Vec<FunctionPlan>,
    next_offset: usize,
    var_slots: usize,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, reserving its state records.
    pub fn add(&mut self, kind: PlanKind, meta: NodeMeta) -> PlanNodeId {
        let id = PlanNodeId(self.nodes.len() as u32);
        let state_offset = self.next_offset;
        self.next_offset += kind.state_slots();
        self.nodes.push(PlanNode {
            kind,
            state_offset,
            meta,
        });
        id
    }

    /// Append a node with default metadata.
    pub fn add_node(&mut self, kind: PlanKind) -> PlanNodeId {
        self.add(kind, NodeMeta::default())
    }

    pub fn meta(&self, id: PlanNodeId) -> Option<&NodeMeta> {
        self.nodes.get(id.index()).map(|n| &n.meta)
    }

    pub fn new_var_slot(&mut self) -> VarSlot {
        let slot = VarSlot(self.var_slots as u32);
        self.var_slots += 1;
        slot
    }

    /// Register a function. Its body may be set later, which allows
    /// recursive calls to refer to the function while it is lowered.
    pub fn add_function(&mut self, function: FunctionPlan) -> u32 {
        self.functions.push(function);
        (self.functions.len() - 1) as u32
    }

    pub fn set_function_body(&mut self, index: u32, body: PlanNodeId) -> XylemResult<()> {
        let f = self
            .functions
            .get_mut(index as usize)
            .ok_or_else(|| XylemError::internal(format!("unknown function plan {index}")))?;
        f.body = body;
        Ok(())
    }

    /// Seal the plan and validate it.
    pub fn finish(self, root: PlanNodeId) -> XylemResult<Plan> {
        let plan = Plan {
            nodes: self.nodes,
            root,
            functions: self.functions,
            state_size: self.next_offset,
            var_slots: self.var_slots,
        };
        plan.validate()?;
        Ok(plan)
    }
}

/// Parts of a plan, used by the codec.
pub(crate) struct PlanParts {
    pub nodes: Vec<PlanNode>,
    pub root: PlanNodeId,
    pub functions: Vec<FunctionPlan>,
    pub state_size: usize,
    pub var_slots: usize,
}

impl Plan {
    pub(crate) fn from_parts(parts: PlanParts) -> XylemResult<Self> {
        let plan = Self {
            nodes: parts.nodes,
            root: parts.root,
            functions: parts.functions,
            state_size: parts.state_size,
            var_slots: parts.var_slots,
        };
        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use xylem_core::Item;

    fn literal(b: &mut PlanBuilder, values: &[i64]) -> PlanNodeId {
        let items: Vec<Item> = values.iter().map(|v| Item::Integer(*v)).collect();
        b.add_node(PlanKind::Literal(Arc::from(items)))
    }

    #[test]
    fn test_offsets_are_assigned_sequentially() {
        let mut b = PlanBuilder::new();
        let x = b.new_var_slot();
        let domain = literal(&mut b, &[1, 2]);
        let ret = b.add_node(PlanKind::Var(x));
        let flwor = b.add_node(PlanKind::Flwor {
            clauses: vec![PlanClause::For {
                var: x,
                position: None,
                domain,
            }],
            ret,
        });
        let plan = b.finish(flwor).unwrap();

        assert_eq!(plan.node(domain).state_offset, 0);
        assert_eq!(plan.node(ret).state_offset, 1);
        assert_eq!(plan.node(flwor).state_offset, 2);
        assert_eq!(plan.state_size(), 4);
        assert_eq!(plan.var_slots(), 1);
    }

    #[test]
    fn test_offset_collision_is_rejected() {
        let mut b = PlanBuilder::new();
        let a = literal(&mut b, &[1]);
        let c = literal(&mut b, &[2]);
        let root = b.add_node(PlanKind::Concat(vec![a, c]));
        let mut plan = b.finish(root).unwrap();

        plan.nodes[c.index()].state_offset = 0;
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("collision"));
    }

    #[test]
    fn test_dangling_child_is_rejected() {
        let mut b = PlanBuilder::new();
        let root = b.add_node(PlanKind::Concat(vec![PlanNodeId(7)]));
        assert!(b.finish(root).is_err());
    }

    #[test]
    fn test_explain() {
        let mut b = PlanBuilder::new();
        let a = literal(&mut b, &[1, 2]);
        let c = literal(&mut b, &[3]);
        let root = b.add_node(PlanKind::Concat(vec![a, c]));
        let plan = b.finish(root).unwrap();

        let text = plan.explain();
        assert!(text.starts_with("ConcatIter [@2]"));
        assert!(text.contains("LiteralIter [@0] (1, 2)"));
    }
}
