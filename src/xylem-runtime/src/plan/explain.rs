//! Tree rendering of plans.

use common_display::{truncate_string, TreeNode};
use xylem_core::{Quantifier, TypeOp};

use super::{Plan, PlanClause, PlanKind, PlanNodeId};

/// A displayable view of one plan node.
#[derive(Clone, Copy)]
pub struct PlanView<'a> {
    plan: &'a Plan,
    id: PlanNodeId,
}

impl<'a> PlanView<'a> {
    pub fn new(plan: &'a Plan, id: PlanNodeId) -> Self {
        Self { plan, id }
    }
}

impl TreeNode for PlanView<'_> {
    fn name(&self) -> String {
        let node = self.plan.node(self.id);
        format!("{} [@{}]", node.kind.name(), node.state_offset)
    }

    fn children(&self) -> Vec<Self> {
        self.plan
            .node(self.id)
            .kind
            .children()
            .into_iter()
            .map(|id| Self { id, ..*self })
            .collect()
    }

    fn details(&self) -> Option<String> {
        let text = match &self.plan.node(self.id).kind {
            PlanKind::Literal(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                truncate_string(&rendered.join(", "), 48)
            }
            PlanKind::Var(slot) => format!("slot {}", slot.0),
            PlanKind::Scalar { op, .. } => op.tag().to_string(),
            PlanKind::SortDistinct { mode, .. } => {
                let mut parts = Vec::new();
                if let Some(order) = mode.order {
                    parts.push(format!("{order:?}").to_lowercase());
                }
                if mode.distinct {
                    parts.push("distinct".to_string());
                }
                parts.join(", ")
            }
            PlanKind::Flwor { clauses, .. } => clauses
                .iter()
                .map(|c| match c {
                    PlanClause::For { var, .. } => format!("for {}", var.0),
                    PlanClause::Let { var, .. } => format!("let {}", var.0),
                    PlanClause::Where(_) => "where".to_string(),
                    PlanClause::OrderBy(keys) => format!("order by {}", keys.len()),
                })
                .collect::<Vec<_>>()
                .join(", "),
            PlanKind::PathStep { axis, test, .. } => format!("{axis}::{test}"),
            PlanKind::ElementCtor { name, .. } => name.clone(),
            PlanKind::Quantified { quantifier, .. } => match quantifier {
                Quantifier::Some => "some".to_string(),
                Quantifier::Every => "every".to_string(),
            },
            PlanKind::TypeTest { op, target, .. } => match op {
                TypeOp::InstanceOf => format!("instance of {target}"),
                TypeOp::Treat => format!("treat as {target}"),
                TypeOp::Coerce => format!("coerce to {target}"),
            },
            PlanKind::Update { kind, .. } => format!("{kind:?}"),
            PlanKind::UserCall { function, .. } => self
                .plan
                .function(*function)
                .map_or_else(|| format!("#{function}"), |f| f.name.clone()),
            _ => return None,
        };
        Some(text)
    }
}
