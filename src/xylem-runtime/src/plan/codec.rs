//! Persisted plan format.
//!
//! Plans are written as a bincode envelope. The header carries a magic
//! tag and [`PLAN_SCHEMA_VERSION`]; a reader refuses any other version
//! rather than guessing at the layout. Scalar functions are stored by
//! their stable tag, never by enum position.

use common_error::{XylemError, XylemResult};
use serde::{Deserialize, Serialize};
use xylem_core::{Axis, NodeTest, Quantifier, Sequence, SequenceType, TypeOp, UpdateKind};

use super::{
    FunctionPlan, NodeMeta, Plan, PlanClause, PlanKind, PlanNode, PlanNodeId, PlanParts, VarSlot,
};
use crate::functions::{ScalarOp, SortDistinctMode};

/// Current persisted plan layout version.
pub const PLAN_SCHEMA_VERSION: u32 = 1;

const MAGIC: [u8; 4] = *b"XLPL";

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    header: Header,
    root: u32,
    state_size: u64,
    var_slots: u32,
    nodes: Vec<WireNode>,
    functions: Vec<WireFunction>,
}

#[derive(Serialize, Deserialize)]
struct WireNode {
    kind: WireKind,
    state_offset: u64,
    state_slots: u32,
    meta: NodeMeta,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    params: Vec<(u32, SequenceType)>,
    return_type: SequenceType,
    body: u32,
}

#[derive(Serialize, Deserialize)]
enum WireClause {
    For {
        var: u32,
        position: Option<u32>,
        domain: u32,
    },
    Let {
        var: u32,
        domain: u32,
    },
    Where(u32),
    OrderBy(Vec<(u32, bool)>),
}

#[derive(Serialize, Deserialize)]
enum WireKind {
    Literal(Sequence),
    Var(u32),
    Concat(Vec<u32>),
    Scalar { op: String, args: Vec<u32> },
    Range { low: u32, high: u32 },
    SortDistinct { input: u32, mode: SortDistinctMode },
    If { cond: u32, then_branch: u32, else_branch: u32 },
    Flwor { clauses: Vec<WireClause>, ret: u32 },
    Filter { input: u32, predicate: u32, dot: u32, position: Option<u32> },
    Quantified { quantifier: Quantifier, var: u32, domain: u32, test: u32 },
    PathStep { input: u32, axis: Axis, test: NodeTest },
    ElementCtor { name: String, content: u32 },
    TextCtor { content: u32 },
    TypeTest { op: TypeOp, input: u32, target: SequenceType },
    Update { kind: UpdateKind, target: u32, source: Option<u32> },
    DocFetch { uri: u32 },
    UserCall { function: u32, args: Vec<u32> },
    IndexProbe { build: u32, build_var: u32, build_key: u32, probe_key: u32 },
}

fn ids(ids: &[PlanNodeId]) -> Vec<u32> {
    ids.iter().map(|id| id.0).collect()
}

fn plan_ids(ids: &[u32]) -> Vec<PlanNodeId> {
    ids.iter().map(|id| PlanNodeId(*id)).collect()
}

impl From<&PlanClause> for WireClause {
    fn from(clause: &PlanClause) -> Self {
        match clause {
            PlanClause::For {
                var,
                position,
                domain,
            } => Self::For {
                var: var.0,
                position: position.map(|p| p.0),
                domain: domain.0,
            },
            PlanClause::Let { var, domain } => Self::Let {
                var: var.0,
                domain: domain.0,
            },
            PlanClause::Where(c) => Self::Where(c.0),
            PlanClause::OrderBy(keys) => Self::OrderBy(keys.iter().map(|(k, d)| (k.0, *d)).collect()),
        }
    }
}

impl From<WireClause> for PlanClause {
    fn from(clause: WireClause) -> Self {
        match clause {
            WireClause::For {
                var,
                position,
                domain,
            } => Self::For {
                var: VarSlot(var),
                position: position.map(VarSlot),
                domain: PlanNodeId(domain),
            },
            WireClause::Let { var, domain } => Self::Let {
                var: VarSlot(var),
                domain: PlanNodeId(domain),
            },
            WireClause::Where(c) => Self::Where(PlanNodeId(c)),
            WireClause::OrderBy(keys) => {
                Self::OrderBy(keys.into_iter().map(|(k, d)| (PlanNodeId(k), d)).collect())
            }
        }
    }
}

impl From<&PlanKind> for WireKind {
    fn from(kind: &PlanKind) -> Self {
        match kind {
            PlanKind::Literal(items) => Self::Literal(items.clone()),
            PlanKind::Var(slot) => Self::Var(slot.0),
            PlanKind::Concat(children) => Self::Concat(ids(children)),
            PlanKind::Scalar { op, args } => Self::Scalar {
                op: op.tag().to_string(),
                args: ids(args),
            },
            PlanKind::Range { low, high } => Self::Range {
                low: low.0,
                high: high.0,
            },
            PlanKind::SortDistinct { input, mode } => Self::SortDistinct {
                input: input.0,
                mode: *mode,
            },
            PlanKind::If {
                cond,
                then_branch,
                else_branch,
            } => Self::If {
                cond: cond.0,
                then_branch: then_branch.0,
                else_branch: else_branch.0,
            },
            PlanKind::Flwor { clauses, ret } => Self::Flwor {
                clauses: clauses.iter().map(WireClause::from).collect(),
                ret: ret.0,
            },
            PlanKind::Filter {
                input,
                predicate,
                dot,
                position,
            } => Self::Filter {
                input: input.0,
                predicate: predicate.0,
                dot: dot.0,
                position: position.map(|p| p.0),
            },
            PlanKind::Quantified {
                quantifier,
                var,
                domain,
                test,
            } => Self::Quantified {
                quantifier: *quantifier,
                var: var.0,
                domain: domain.0,
                test: test.0,
            },
            PlanKind::PathStep { input, axis, test } => Self::PathStep {
                input: input.0,
                axis: *axis,
                test: test.clone(),
            },
            PlanKind::ElementCtor { name, content } => Self::ElementCtor {
                name: name.clone(),
                content: content.0,
            },
            PlanKind::TextCtor { content } => Self::TextCtor { content: content.0 },
            PlanKind::TypeTest { op, input, target } => Self::TypeTest {
                op: *op,
                input: input.0,
                target: *target,
            },
            PlanKind::Update {
                kind,
                target,
                source,
            } => Self::Update {
                kind: *kind,
                target: target.0,
                source: source.map(|s| s.0),
            },
            PlanKind::DocFetch { uri } => Self::DocFetch { uri: uri.0 },
            PlanKind::UserCall { function, args } => Self::UserCall {
                function: *function,
                args: ids(args),
            },
            PlanKind::IndexProbe {
                build,
                build_var,
                build_key,
                probe_key,
            } => Self::IndexProbe {
                build: build.0,
                build_var: build_var.0,
                build_key: build_key.0,
                probe_key: probe_key.0,
            },
        }
    }
}

impl TryFrom<WireKind> for PlanKind {
    type Error = XylemError;

    fn try_from(kind: WireKind) -> XylemResult<Self> {
        Ok(match kind {
            WireKind::Literal(items) => Self::Literal(items),
            WireKind::Var(slot) => Self::Var(VarSlot(slot)),
            WireKind::Concat(children) => Self::Concat(plan_ids(&children)),
            WireKind::Scalar { op, args } => Self::Scalar {
                op: ScalarOp::from_tag(&op)
                    .ok_or_else(|| XylemError::codec(format!("unknown function tag '{op}'")))?,
                args: plan_ids(&args),
            },
            WireKind::Range { low, high } => Self::Range {
                low: PlanNodeId(low),
                high: PlanNodeId(high),
            },
            WireKind::SortDistinct { input, mode } => Self::SortDistinct {
                input: PlanNodeId(input),
                mode,
            },
            WireKind::If {
                cond,
                then_branch,
                else_branch,
            } => Self::If {
                cond: PlanNodeId(cond),
                then_branch: PlanNodeId(then_branch),
                else_branch: PlanNodeId(else_branch),
            },
            WireKind::Flwor { clauses, ret } => Self::Flwor {
                clauses: clauses.into_iter().map(PlanClause::from).collect(),
                ret: PlanNodeId(ret),
            },
            WireKind::Filter {
                input,
                predicate,
                dot,
                position,
            } => Self::Filter {
                input: PlanNodeId(input),
                predicate: PlanNodeId(predicate),
                dot: VarSlot(dot),
                position: position.map(VarSlot),
            },
            WireKind::Quantified {
                quantifier,
                var,
                domain,
                test,
            } => Self::Quantified {
                quantifier,
                var: VarSlot(var),
                domain: PlanNodeId(domain),
                test: PlanNodeId(test),
            },
            WireKind::PathStep { input, axis, test } => Self::PathStep {
                input: PlanNodeId(input),
                axis,
                test,
            },
            WireKind::ElementCtor { name, content } => Self::ElementCtor {
                name,
                content: PlanNodeId(content),
            },
            WireKind::TextCtor { content } => Self::TextCtor {
                content: PlanNodeId(content),
            },
            WireKind::TypeTest { op, input, target } => Self::TypeTest {
                op,
                input: PlanNodeId(input),
                target,
            },
            WireKind::Update {
                kind,
                target,
                source,
            } => Self::Update {
                kind,
                target: PlanNodeId(target),
                source: source.map(PlanNodeId),
            },
            WireKind::DocFetch { uri } => Self::DocFetch {
                uri: PlanNodeId(uri),
            },
            WireKind::UserCall { function, args } => Self::UserCall {
                function,
                args: plan_ids(&args),
            },
            WireKind::IndexProbe {
                build,
                build_var,
                build_key,
                probe_key,
            } => Self::IndexProbe {
                build: PlanNodeId(build),
                build_var: VarSlot(build_var),
                build_key: PlanNodeId(build_key),
                probe_key: PlanNodeId(probe_key),
            },
        })
    }
}

/// Serialize a plan with the current schema version.
pub fn encode_plan(plan: &Plan) -> XylemResult<Vec<u8>> {
    let envelope = Envelope {
        header: Header {
            magic: MAGIC,
            version: PLAN_SCHEMA_VERSION,
        },
        root: plan.root().0,
        state_size: plan.state_size() as u64,
        var_slots: plan.var_slots() as u32,
        nodes: plan
            .nodes()
            .iter()
            .map(|node| WireNode {
                kind: WireKind::from(&node.kind),
                state_offset: node.state_offset as u64,
                state_slots: node.kind.state_slots() as u32,
                meta: node.meta,
            })
            .collect(),
        functions: plan
            .functions()
            .iter()
            .map(|f| WireFunction {
                name: f.name.clone(),
                params: f.params.iter().map(|(slot, ty)| (slot.0, *ty)).collect(),
                return_type: f.return_type,
                body: f.body.0,
            })
            .collect(),
    };
    Ok(bincode::serialize(&envelope)?)
}

/// Restore a plan written by [`encode_plan`].
///
/// # Errors
///
/// A foreign or truncated buffer, a different schema version, or a plan
/// whose state layout does not validate yields `PlanCodecError`.
pub fn decode_plan(bytes: &[u8]) -> XylemResult<Plan> {
    let header: Header = bincode::deserialize(bytes)
        .map_err(|e| XylemError::codec(format!("unreadable plan header: {e}")))?;
    if header.magic != MAGIC {
        return Err(XylemError::codec("not a persisted plan"));
    }
    if header.version != PLAN_SCHEMA_VERSION {
        return Err(XylemError::codec(format!(
            "plan schema version {} is not supported (expected {PLAN_SCHEMA_VERSION})",
            header.version
        )));
    }

    let envelope: Envelope = bincode::deserialize(bytes)
        .map_err(|e| XylemError::codec(format!("corrupt plan body: {e}")))?;

    let mut nodes = Vec::with_capacity(envelope.nodes.len());
    for (i, wire) in envelope.nodes.into_iter().enumerate() {
        let kind = PlanKind::try_from(wire.kind)?;
        if kind.state_slots() != wire.state_slots as usize {
            return Err(XylemError::codec(format!(
                "node {i} records {} state slots, its iterator needs {}",
                wire.state_slots,
                kind.state_slots()
            )));
        }
        nodes.push(PlanNode {
            kind,
            state_offset: wire.state_offset as usize,
            meta: wire.meta,
        });
    }
    let functions = envelope
        .functions
        .into_iter()
        .map(|f| FunctionPlan {
            name: f.name,
            params: f.params.into_iter().map(|(s, ty)| (VarSlot(s), ty)).collect(),
            return_type: f.return_type,
            body: PlanNodeId(f.body),
        })
        .collect();

    Plan::from_parts(PlanParts {
        nodes,
        root: PlanNodeId(envelope.root),
        functions,
        state_size: envelope.state_size as usize,
        var_slots: envelope.var_slots as usize,
    })
    .map_err(|e| XylemError::codec(format!("invalid plan layout: {e}")))
}
