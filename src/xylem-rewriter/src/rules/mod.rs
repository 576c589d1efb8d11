//! Built-in rewrite rules and the name registry.
//!
//! # Rules
//!
//! - **RefactorPredFLWOR**: boolean filters become `for ... where` blocks
//! - **EliminateUnusedLetVars**: drops dead bindings, substitutes trivial ones
//! - **MergeFLWOR**: flattens nested blocks
//! - **PartialEval**: decides conditionals and type tests statically
//! - **EliminateTypeEnforcingOperations**: drops checks the static type proves
//! - **EliminateNodeOps**: removes or weakens node sort/distinct operators
//! - **FoldConst**: evaluates closed, pure subtrees at compile time
//! - **InlineFunctions**: replaces calls of small non-recursive functions
//! - **HoistExprsOutOfLoops**: moves loop-invariant work in front of a loop
//! - **IndexJoin**: turns an equality-filtered nested loop into a hash probe

mod eliminate_lets;
mod fold_const;
mod hoist;
mod index_join;
mod inline;
mod merge_flwor;
mod node_ops;
mod partial_eval;
mod refactor_pred;

use std::collections::BTreeMap;

use common_error::{XylemError, XylemResult};
use xylem_ir::{Clause, ExprId};

use crate::rule::RewriteRule;

pub use fold_const::is_foldable;

/// Named rules available to pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<&'static str, RewriteRule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in rule.
    pub fn builtin() -> Self {
        let rules = [
            refactor_pred::rule(),
            eliminate_lets::rule(),
            merge_flwor::rule(),
            partial_eval::rule(),
            partial_eval::type_enforcing_rule(),
            node_ops::rule(),
            fold_const::rule(),
            inline::rule(),
            hoist::rule(),
            index_join::rule(),
        ];
        Self {
            rules: rules.into_iter().map(|r| (r.name(), r)).collect(),
        }
    }

    /// Add a rule.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a rule of the same name exists.
    pub fn register(&mut self, rule: RewriteRule) -> XylemResult<()> {
        if self.rules.contains_key(rule.name()) {
            return Err(XylemError::invalid_config(format!(
                "rewrite rule '{}' is already registered",
                rule.name()
            )));
        }
        self.rules.insert(rule.name(), rule);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RewriteRule> {
        self.rules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.keys().copied()
    }

    /// Look up an ordered list of rule names.
    pub fn resolve(&self, names: &[String]) -> XylemResult<Vec<RewriteRule>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| XylemError::invalid_config(format!("unknown rewrite rule '{name}'")))
            })
            .collect()
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Mutable expression slots of a clause, in `Clause::exprs` order.
pub(crate) fn clause_exprs_mut(clause: &mut Clause) -> Vec<&mut ExprId> {
    match clause {
        Clause::For { domain, .. } | Clause::Let { domain, .. } => vec![domain],
        Clause::Where(cond) => vec![cond],
        Clause::OrderBy(specs) => specs.iter_mut().map(|s| &mut s.expr).collect(),
    }
}
