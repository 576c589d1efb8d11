//! Arena storage for expression trees.
//!
//! Nodes refer to each other by [`ExprId`]. Rewrites either mutate a node
//! in place or allocate a replacement and store its id in the parent's
//! child slot; detached nodes simply stay unreachable until the arena is
//! dropped with the compilation.

use std::collections::{BTreeSet, HashMap};

use common_display::DisplayTree;
use xylem_core::{Axis, Item, NodeTest, QName, Quantifier, Sequence, SequenceType, TypeOp, UpdateKind};

use crate::explain::ExprView;
use crate::expr::{Clause, ExprId, ExprKind, ExprNode, Flwor, FunctionId, VarId};

/// Metadata of a variable.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
}

/// Owner of every expression node and variable of one compilation.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    vars: Vec<VarInfo>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and return its id.
    pub fn alloc(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(ExprNode::new(kind));
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.index()].kind
    }

    pub fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        self.kind(id).children()
    }

    /// Declare a new variable.
    pub fn new_var<S: Into<String>>(&mut self, name: S) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo { name: name.into() });
        id
    }

    pub fn var_name(&self, var: VarId) -> &str {
        self.vars
            .get(var.0 as usize)
            .map_or("?", |info| info.name.as_str())
    }

    // ========== Constructors ==========

    pub fn literal<S: Into<Sequence>>(&mut self, items: S) -> ExprId {
        self.alloc(ExprKind::Literal(items.into()))
    }

    pub fn item<I: Into<Item>>(&mut self, item: I) -> ExprId {
        self.literal(vec![item.into()])
    }

    pub fn empty_sequence(&mut self) -> ExprId {
        self.literal(Vec::<Item>::new())
    }

    pub fn var_ref(&mut self, var: VarId) -> ExprId {
        self.alloc(ExprKind::VarRef(var))
    }

    pub fn call(&mut self, name: QName, args: Vec<ExprId>) -> ExprId {
        self.alloc(ExprKind::Call { name, args })
    }

    /// Call a function in the `fn` namespace.
    pub fn call_fn(&mut self, local: &str, args: Vec<ExprId>) -> ExprId {
        self.call(QName::func(local), args)
    }

    /// Call an operator in the `op` namespace.
    pub fn call_op(&mut self, local: &str, args: Vec<ExprId>) -> ExprId {
        self.call(QName::op(local), args)
    }

    pub fn user_call(&mut self, function: FunctionId, args: Vec<ExprId>) -> ExprId {
        self.alloc(ExprKind::UserCall { function, args })
    }

    pub fn flwor(&mut self, clauses: Vec<Clause>, ret: ExprId) -> ExprId {
        self.alloc(ExprKind::Flwor(Flwor { clauses, ret }))
    }

    pub fn filter(
        &mut self,
        input: ExprId,
        predicate: ExprId,
        dot: VarId,
        position: Option<VarId>,
    ) -> ExprId {
        self.alloc(ExprKind::Filter {
            input,
            predicate,
            dot,
            position,
        })
    }

    pub fn path_step(&mut self, input: ExprId, axis: Axis, test: NodeTest) -> ExprId {
        self.alloc(ExprKind::PathStep { input, axis, test })
    }

    pub fn element<S: Into<String>>(&mut self, name: S, content: ExprId) -> ExprId {
        self.alloc(ExprKind::ElementCtor {
            name: name.into(),
            content,
        })
    }

    pub fn text(&mut self, content: ExprId) -> ExprId {
        self.alloc(ExprKind::TextCtor { content })
    }

    pub fn if_then_else(&mut self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        self.alloc(ExprKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn quantified(
        &mut self,
        quantifier: Quantifier,
        var: VarId,
        domain: ExprId,
        satisfies: ExprId,
    ) -> ExprId {
        self.alloc(ExprKind::Quantified {
            quantifier,
            var,
            domain,
            satisfies,
        })
    }

    pub fn type_test(&mut self, op: TypeOp, input: ExprId, target: SequenceType) -> ExprId {
        self.alloc(ExprKind::TypeTest { op, input, target })
    }

    pub fn update(&mut self, kind: UpdateKind, target: ExprId, source: Option<ExprId>) -> ExprId {
        self.alloc(ExprKind::Update {
            kind,
            target,
            source,
        })
    }

    // ========== Queries ==========

    /// Free variables of `id`, given the free variables of each child.
    pub fn scoped_free_vars<F>(&self, id: ExprId, mut child: F) -> BTreeSet<VarId>
    where
        F: FnMut(ExprId) -> BTreeSet<VarId>,
    {
        let minus = |set: BTreeSet<VarId>, bound: &[VarId]| -> BTreeSet<VarId> {
            set.into_iter().filter(|v| !bound.contains(v)).collect()
        };

        match self.kind(id) {
            ExprKind::VarRef(v) => BTreeSet::from([*v]),
            ExprKind::Flwor(f) => {
                let mut bound = Vec::new();
                let mut out = BTreeSet::new();
                for clause in &f.clauses {
                    for e in clause.exprs() {
                        out.extend(minus(child(e), &bound));
                    }
                    bound.extend(clause.bound_vars());
                }
                out.extend(minus(child(f.ret), &bound));
                out
            }
            ExprKind::Filter {
                input,
                predicate,
                dot,
                position,
            } => {
                let mut bound = vec![*dot];
                bound.extend(position.iter().copied());
                let mut out = child(*input);
                out.extend(minus(child(*predicate), &bound));
                out
            }
            ExprKind::Quantified {
                var,
                domain,
                satisfies,
                ..
            } => {
                let mut out = child(*domain);
                out.extend(minus(child(*satisfies), &[*var]));
                out
            }
            ExprKind::IndexProbe(p) => {
                let mut out = child(p.build);
                out.extend(minus(child(p.build_key), &[p.build_var]));
                out.extend(child(p.probe_key));
                out
            }
            kind => kind.children().into_iter().flat_map(child).collect(),
        }
    }

    /// Free variables of the subtree rooted at `id`.
    pub fn free_vars(&self, id: ExprId) -> BTreeSet<VarId> {
        self.scoped_free_vars(id, |c| self.free_vars(c))
    }

    /// Number of references to `var` inside the subtree.
    pub fn count_var_refs(&self, root: ExprId, var: VarId) -> usize {
        self.descendants(root)
            .into_iter()
            .filter(|id| matches!(self.kind(*id), ExprKind::VarRef(v) if *v == var))
            .count()
    }

    /// All nodes of the subtree in pre-order, `root` first.
    pub fn descendants(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.children(id);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    pub fn subtree_size(&self, root: ExprId) -> usize {
        self.descendants(root).len()
    }

    /// Whether the subtree contains a node satisfying `pred`.
    pub fn any_node<F: Fn(&ExprKind) -> bool>(&self, root: ExprId, pred: F) -> bool {
        self.descendants(root)
            .into_iter()
            .any(|id| pred(self.kind(id)))
    }

    // ========== Transformations ==========

    /// Copy a subtree.
    ///
    /// Variables bound inside the copy get fresh ids; references to
    /// variables in `renames` are redirected.
    pub fn deep_clone(&mut self, id: ExprId, renames: &mut HashMap<VarId, VarId>) -> ExprId {
        let mut kind = self.kind(id).clone();
        for var in binders_mut(&mut kind) {
            let fresh = self.new_var(self.var_name(*var).to_string());
            renames.insert(*var, fresh);
            *var = fresh;
        }
        if let ExprKind::VarRef(v) = &mut kind {
            if let Some(renamed) = renames.get(v) {
                *v = *renamed;
            }
        }
        for slot in kind.children_mut() {
            *slot = self.deep_clone(*slot, renames);
        }
        self.alloc(kind)
    }

    /// Replace every reference to `var` inside `root` with `with`.
    ///
    /// The first reference takes `with` itself, later ones get copies.
    /// Returns the new root, which differs from `root` only if `root` was
    /// itself a reference to `var`.
    pub fn substitute_var(&mut self, root: ExprId, var: VarId, with: ExprId) -> ExprId {
        let mut first = true;
        self.substitute_inner(root, var, with, &mut first)
    }

    fn substitute_inner(&mut self, id: ExprId, var: VarId, with: ExprId, first: &mut bool) -> ExprId {
        if matches!(self.kind(id), ExprKind::VarRef(v) if *v == var) {
            if std::mem::take(first) {
                return with;
            }
            return self.deep_clone(with, &mut HashMap::new());
        }
        for (i, child) in self.children(id).into_iter().enumerate() {
            let new_child = self.substitute_inner(child, var, with, first);
            if new_child != child {
                *self.kind_mut(id).children_mut()[i] = new_child;
            }
        }
        id
    }

    /// Render the subtree for debugging and tracing.
    pub fn explain(&self, root: ExprId) -> String {
        DisplayTree::new(ExprView::new(self, root)).to_string()
    }
}

fn binders_mut(kind: &mut ExprKind) -> Vec<&mut VarId> {
    match kind {
        ExprKind::Flwor(f) => f
            .clauses
            .iter_mut()
            .flat_map(|c| match c {
                Clause::For { var, position, .. } => {
                    let mut out = vec![var];
                    out.extend(position.iter_mut());
                    out
                }
                Clause::Let { var, .. } => vec![var],
                Clause::Where(_) | Clause::OrderBy(_) => Vec::new(),
            })
            .collect(),
        ExprKind::Filter { dot, position, .. } => {
            let mut out = vec![dot];
            out.extend(position.iter_mut());
            out
        }
        ExprKind::Quantified { var, .. } => vec![var],
        ExprKind::IndexProbe(p) => vec![&mut p.build_var],
        _ => Vec::new(),
    }
}
