//! Rule-driven rewriting of the Xylem expression IR.
//!
//! A [`Rewriter`] runs the configured stages of named [`RewriteRule`]s over
//! a [`QueryModule`](xylem_ir::QueryModule). Rules read the annotations
//! computed by [`xylem_catalog::annotate`] through a [`RewriteContext`] and
//! return replacement nodes; the driver patches the tree, keeps the
//! per-stage counts and, when enabled, an explain trace of every firing.

mod context;
mod driver;
mod rule;
mod rules;

pub use context::RewriteContext;
pub use driver::Rewriter;
pub use rule::{RewriteReport, RewriteRule, RuleFn, RuleTrace, StageReport};
pub use rules::{is_foldable, RuleRegistry};

use common_error::XylemResult;
use xylem_catalog::FunctionCatalog;
use xylem_ir::QueryModule;

/// Rewrite a module with the default pipeline.
pub fn rewrite(module: &mut QueryModule, catalog: &FunctionCatalog) -> XylemResult<RewriteReport> {
    Rewriter::new(common_config::RewriterConfig::default())?.rewrite(module, catalog)
}
