//! Rewrite rules and the records the driver keeps about them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use common_error::XylemResult;
use xylem_ir::ExprId;

use crate::context::RewriteContext;

/// A rewrite hook: returns the replacement node, or `None` for no change.
///
/// Declining is never an error; errors are reserved for static defects in
/// the query itself.
pub type RuleFn =
    Arc<dyn Fn(&mut RewriteContext<'_>, ExprId) -> XylemResult<Option<ExprId>> + Send + Sync>;

/// A named rule with optional pre-order and post-order hooks.
///
/// The pre hook runs before the node's children are visited and may prune
/// the subtree by replacing the node. The post hook runs after every child
/// has been rewritten.
#[derive(Clone)]
pub struct RewriteRule {
    name: &'static str,
    pre: Option<RuleFn>,
    post: Option<RuleFn>,
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteRule")
            .field("name", &self.name)
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

impl RewriteRule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pre: None,
            post: None,
        }
    }

    /// A rule with only a pre-order hook.
    pub fn pre<F>(name: &'static str, hook: F) -> Self
    where
        F: Fn(&mut RewriteContext<'_>, ExprId) -> XylemResult<Option<ExprId>> + Send + Sync + 'static,
    {
        Self::new(name).with_pre(hook)
    }

    /// A rule with only a post-order hook.
    pub fn post<F>(name: &'static str, hook: F) -> Self
    where
        F: Fn(&mut RewriteContext<'_>, ExprId) -> XylemResult<Option<ExprId>> + Send + Sync + 'static,
    {
        Self::new(name).with_post(hook)
    }

    #[must_use]
    pub fn with_pre<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RewriteContext<'_>, ExprId) -> XylemResult<Option<ExprId>> + Send + Sync + 'static,
    {
        self.pre = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_post<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RewriteContext<'_>, ExprId) -> XylemResult<Option<ExprId>> + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rewrite_pre(&self, ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
        match &self.pre {
            Some(hook) => hook(ctx, id),
            None => Ok(None),
        }
    }

    pub fn rewrite_post(&self, ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<Option<ExprId>> {
        match &self.post {
            Some(hook) => hook(ctx, id),
            None => Ok(None),
        }
    }
}

/// A trace entry for a single rule firing.
#[derive(Debug, Clone)]
pub struct RuleTrace {
    pub rule_name: String,
    pub stage: String,
    pub pass: usize,
    /// The rewritten subtree before the rule fired (as explain string).
    pub before: String,
    /// The replacement subtree.
    pub after: String,
}

/// What one pipeline stage did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub passes: usize,
    /// False when the pass ceiling stopped a fixpoint stage.
    pub reached_fixpoint: bool,
    /// Firings per rule name.
    pub rules_fired: BTreeMap<String, usize>,
}

impl StageReport {
    pub fn total_fired(&self) -> usize {
        self.rules_fired.values().sum()
    }
}

/// The result of a rewrite with optional trace information.
#[derive(Debug, Clone, Default)]
pub struct RewriteReport {
    pub stages: Vec<StageReport>,
    pub trace: Vec<RuleTrace>,
}

impl RewriteReport {
    /// Number of rule firings over all stages.
    pub fn rules_applied(&self) -> usize {
        self.stages.iter().map(StageReport::total_fired).sum()
    }

    /// Firings of one rule over all stages.
    pub fn fired(&self, rule: &str) -> usize {
        self.stages
            .iter()
            .filter_map(|s| s.rules_fired.get(rule))
            .sum()
    }

    /// Format the trace as a human-readable string.
    pub fn format_trace(&self) -> String {
        let mut output = format!(
            "Rewrite completed in {} stage(s), {} rules applied\n",
            self.stages.len(),
            self.rules_applied()
        );

        if self.trace.is_empty() {
            output.push_str("  (no trace available)\n");
        } else {
            for (i, entry) in self.trace.iter().enumerate() {
                output.push_str(&format!(
                    "\n--- Rule {} applied: {} ({} pass {}) ---\n",
                    i + 1,
                    entry.rule_name,
                    entry.stage,
                    entry.pass
                ));
                output.push_str("Before:\n");
                output.push_str(&entry.before);
                output.push_str("\nAfter:\n");
                output.push_str(&entry.after);
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_without_hooks_declines() {
        let rule = RewriteRule::new("Nothing");
        assert_eq!(rule.name(), "Nothing");
        assert!(format!("{rule:?}").contains("pre: false"));
    }

    #[test]
    fn test_report_totals() {
        let mut first = StageReport {
            name: "simplify".to_string(),
            passes: 2,
            reached_fixpoint: true,
            ..StageReport::default()
        };
        first.rules_fired.insert("FoldConst".to_string(), 3);
        let mut second = first.clone();
        second.rules_fired.insert("MergeFLWOR".to_string(), 1);

        let report = RewriteReport {
            stages: vec![first, second],
            trace: Vec::new(),
        };
        assert_eq!(report.rules_applied(), 7);
        assert_eq!(report.fired("FoldConst"), 6);
        assert!(report.format_trace().contains("(no trace available)"));
    }
}
