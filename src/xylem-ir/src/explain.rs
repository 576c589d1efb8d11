//! Tree rendering of expression subtrees.

use common_display::{truncate_string, TreeNode};
use xylem_core::{Quantifier, TypeOp};

use crate::expr::{Clause, ExprId, ExprKind};
use crate::ExprArena;

/// A displayable view of one arena node.
#[derive(Clone, Copy)]
pub struct ExprView<'a> {
    arena: &'a ExprArena,
    id: ExprId,
}

impl<'a> ExprView<'a> {
    pub fn new(arena: &'a ExprArena, id: ExprId) -> Self {
        Self { arena, id }
    }

    fn var(&self, v: crate::VarId) -> String {
        format!("${}", self.arena.var_name(v))
    }
}

impl TreeNode for ExprView<'_> {
    fn name(&self) -> String {
        self.arena.kind(self.id).name().to_string()
    }

    fn children(&self) -> Vec<Self> {
        self.arena
            .children(self.id)
            .into_iter()
            .map(|id| Self { id, ..*self })
            .collect()
    }

    fn details(&self) -> Option<String> {
        let text = match self.arena.kind(self.id) {
            ExprKind::Literal(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                truncate_string(&rendered.join(", "), 48)
            }
            ExprKind::VarRef(v) => self.var(*v),
            ExprKind::Call { name, .. } => name.to_string(),
            ExprKind::UserCall { function, .. } => format!("#{}", function.0),
            ExprKind::Flwor(f) => {
                let mut parts: Vec<String> = f
                    .clauses
                    .iter()
                    .map(|c| match c {
                        Clause::For {
                            var,
                            position: Some(p),
                            ..
                        } => format!("for {} at {}", self.var(*var), self.var(*p)),
                        Clause::For { var, .. } => format!("for {}", self.var(*var)),
                        Clause::Let { var, .. } => format!("let {}", self.var(*var)),
                        Clause::Where(_) => "where".to_string(),
                        Clause::OrderBy(_) => "order by".to_string(),
                    })
                    .collect();
                parts.push("return".to_string());
                parts.join(", ")
            }
            ExprKind::Filter { dot, .. } => format!("dot {}", self.var(*dot)),
            ExprKind::PathStep { axis, test, .. } => format!("{axis}::{test}"),
            ExprKind::ElementCtor { name, .. } => name.clone(),
            ExprKind::Quantified { quantifier, var, .. } => match quantifier {
                Quantifier::Some => format!("some {}", self.var(*var)),
                Quantifier::Every => format!("every {}", self.var(*var)),
            },
            ExprKind::TypeTest { op, target, .. } => match op {
                TypeOp::InstanceOf => format!("instance of {target}"),
                TypeOp::Treat => format!("treat as {target}"),
                TypeOp::Coerce => format!("coerce to {target}"),
            },
            ExprKind::Update { kind, .. } => format!("{kind:?}"),
            ExprKind::IndexProbe(p) => format!("build {}", self.var(p.build_var)),
            ExprKind::TextCtor { .. } | ExprKind::If { .. } => return None,
        };
        Some(text)
    }
}
