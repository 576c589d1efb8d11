//! Expression node kinds.

use std::fmt;

use xylem_core::{Axis, NodeTest, QName, Quantifier, Sequence, SequenceType, TypeOp, UpdateKind};

use crate::AnnotationHolder;

/// Index of a node in an [`ExprArena`](crate::ExprArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a variable. Unique per compiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Index of a declared function in the static context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One clause of a FLWOR block.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    For {
        var: VarId,
        position: Option<VarId>,
        domain: ExprId,
    },
    Let {
        var: VarId,
        domain: ExprId,
    },
    Where(ExprId),
    OrderBy(Vec<OrderSpec>),
}

impl Clause {
    /// Variables this clause binds for the clauses that follow it.
    pub fn bound_vars(&self) -> Vec<VarId> {
        match self {
            Self::For { var, position, .. } => {
                let mut vars = vec![*var];
                vars.extend(position.iter().copied());
                vars
            }
            Self::Let { var, .. } => vec![*var],
            Self::Where(_) | Self::OrderBy(_) => Vec::new(),
        }
    }

    pub fn exprs(&self) -> Vec<ExprId> {
        match self {
            Self::For { domain, .. } | Self::Let { domain, .. } => vec![*domain],
            Self::Where(e) => vec![*e],
            Self::OrderBy(specs) => specs.iter().map(|s| s.expr).collect(),
        }
    }

    fn exprs_mut(&mut self) -> Vec<&mut ExprId> {
        match self {
            Self::For { domain, .. } | Self::Let { domain, .. } => vec![domain],
            Self::Where(e) => vec![e],
            Self::OrderBy(specs) => specs.iter_mut().map(|s| &mut s.expr).collect(),
        }
    }

    pub fn is_for(&self) -> bool {
        matches!(self, Self::For { .. })
    }
}

/// Sort key of an `order by` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSpec {
    pub expr: ExprId,
    pub descending: bool,
}

/// `for`/`let`/`where`/`order by` clauses followed by a `return`.
#[derive(Debug, Clone, PartialEq)]
pub struct Flwor {
    pub clauses: Vec<Clause>,
    pub ret: ExprId,
}

impl Flwor {
    pub fn has_order_by(&self) -> bool {
        self.clauses.iter().any(|c| matches!(c, Clause::OrderBy(_)))
    }

    pub fn has_for(&self) -> bool {
        self.clauses.iter().any(Clause::is_for)
    }
}

/// Hash lookup produced by the index-join rewrite.
///
/// `build` is evaluated once per open; each item is keyed by `build_key`
/// with `build_var` bound to it. Every evaluation then returns the build
/// items whose key equals `probe_key`, in build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexProbe {
    pub build: ExprId,
    pub build_var: VarId,
    pub build_key: ExprId,
    pub probe_key: ExprId,
}

/// The kind of an expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A constant sequence, shared by reference count.
    Literal(Sequence),
    VarRef(VarId),
    /// Application of a catalog function or operator.
    Call { name: QName, args: Vec<ExprId> },
    /// Call of a function declared in the static context.
    UserCall { function: FunctionId, args: Vec<ExprId> },
    Flwor(Flwor),
    /// `input[predicate]` with the context item bound to `dot`.
    Filter {
        input: ExprId,
        predicate: ExprId,
        dot: VarId,
        position: Option<VarId>,
    },
    PathStep {
        input: ExprId,
        axis: Axis,
        test: NodeTest,
    },
    ElementCtor { name: String, content: ExprId },
    TextCtor { content: ExprId },
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    Quantified {
        quantifier: Quantifier,
        var: VarId,
        domain: ExprId,
        satisfies: ExprId,
    },
    TypeTest {
        op: TypeOp,
        input: ExprId,
        target: SequenceType,
    },
    Update {
        kind: UpdateKind,
        target: ExprId,
        source: Option<ExprId>,
    },
    IndexProbe(IndexProbe),
}

impl ExprKind {
    /// Children in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            Self::Literal(_) | Self::VarRef(_) => Vec::new(),
            Self::Call { args, .. } | Self::UserCall { args, .. } => args.clone(),
            Self::Flwor(f) => {
                let mut out: Vec<ExprId> = f.clauses.iter().flat_map(Clause::exprs).collect();
                out.push(f.ret);
                out
            }
            Self::Filter {
                input, predicate, ..
            } => vec![*input, *predicate],
            Self::PathStep { input, .. } | Self::TypeTest { input, .. } => vec![*input],
            Self::ElementCtor { content, .. } | Self::TextCtor { content } => vec![*content],
            Self::If {
                cond,
                then_branch,
                else_branch,
            } => vec![*cond, *then_branch, *else_branch],
            Self::Quantified {
                domain, satisfies, ..
            } => vec![*domain, *satisfies],
            Self::Update { target, source, .. } => {
                let mut out = vec![*target];
                out.extend(source.iter().copied());
                out
            }
            Self::IndexProbe(p) => vec![p.build, p.build_key, p.probe_key],
        }
    }

    /// Mutable child slots, in the same order as [`children`](Self::children).
    pub fn children_mut(&mut self) -> Vec<&mut ExprId> {
        match self {
            Self::Literal(_) | Self::VarRef(_) => Vec::new(),
            Self::Call { args, .. } | Self::UserCall { args, .. } => args.iter_mut().collect(),
            Self::Flwor(f) => {
                let mut out: Vec<&mut ExprId> =
                    f.clauses.iter_mut().flat_map(Clause::exprs_mut).collect();
                out.push(&mut f.ret);
                out
            }
            Self::Filter {
                input, predicate, ..
            } => vec![input, predicate],
            Self::PathStep { input, .. } | Self::TypeTest { input, .. } => vec![input],
            Self::ElementCtor { content, .. } | Self::TextCtor { content } => vec![content],
            Self::If {
                cond,
                then_branch,
                else_branch,
            } => vec![cond, then_branch, else_branch],
            Self::Quantified {
                domain, satisfies, ..
            } => vec![domain, satisfies],
            Self::Update { target, source, .. } => {
                let mut out = vec![target];
                out.extend(source.iter_mut());
                out
            }
            Self::IndexProbe(p) => vec![&mut p.build, &mut p.build_key, &mut p.probe_key],
        }
    }

    /// Short display name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "Literal",
            Self::VarRef(_) => "VarRef",
            Self::Call { .. } => "Call",
            Self::UserCall { .. } => "UserCall",
            Self::Flwor(_) => "Flwor",
            Self::Filter { .. } => "Filter",
            Self::PathStep { .. } => "PathStep",
            Self::ElementCtor { .. } => "ElementCtor",
            Self::TextCtor { .. } => "TextCtor",
            Self::If { .. } => "If",
            Self::Quantified { .. } => "Quantified",
            Self::TypeTest { .. } => "TypeTest",
            Self::Update { .. } => "Update",
            Self::IndexProbe(_) => "IndexProbe",
        }
    }

    pub fn as_literal(&self) -> Option<&Sequence> {
        match self {
            Self::Literal(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<(&QName, &[ExprId])> {
        match self {
            Self::Call { name, args } => Some((name, args)),
            _ => None,
        }
    }

    pub fn as_flwor(&self) -> Option<&Flwor> {
        match self {
            Self::Flwor(f) => Some(f),
            _ => None,
        }
    }
}

/// A node of the expression arena.
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub annotations: AnnotationHolder,
    /// Static type computed by the last annotation pass.
    pub static_type: Option<SequenceType>,
}

impl ExprNode {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            annotations: AnnotationHolder::new(),
            static_type: None,
        }
    }
}
