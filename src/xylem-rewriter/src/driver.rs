//! The pass driver that applies rule stages to a query module.
//!
//! Each stage runs one or more passes. A pass recomputes annotations, then
//! walks every function body and the main expression once: pre hooks run
//! before a node's children are visited, post hooks after. A fixpoint stage
//! repeats until a pass fires no rule or the pass ceiling is reached.

use common_config::{RepeatPolicy, RewriterConfig};
use common_error::XylemResult;
use log::{debug, warn};
use xylem_catalog::{annotate_module, FunctionCatalog};
use xylem_ir::{ExprId, QueryModule};

use crate::context::RewriteContext;
use crate::rule::{RewriteReport, RewriteRule, RuleTrace, StageReport};
use crate::rules::RuleRegistry;

/// A stage with its rules resolved.
#[derive(Debug, Clone)]
struct Stage {
    name: String,
    rules: Vec<RewriteRule>,
    repeat: RepeatPolicy,
}

/// Rewrites query modules through the configured stages.
///
/// # Termination
///
/// A fixpoint stage stops after `max_passes` passes even if rules still
/// fire; the stage is then reported with `reached_fixpoint == false` and
/// the tree is left in its last (valid) state.
#[derive(Debug, Clone)]
pub struct Rewriter {
    stages: Vec<Stage>,
    config: RewriterConfig,
}

impl Rewriter {
    /// Create a rewriter over the built-in rules.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration is invalid or names an unknown rule.
    pub fn new(config: RewriterConfig) -> XylemResult<Self> {
        Self::with_registry(config, &RuleRegistry::builtin())
    }

    /// Create a rewriter resolving rule names in `registry`.
    pub fn with_registry(config: RewriterConfig, registry: &RuleRegistry) -> XylemResult<Self> {
        config.validate()?;
        let stages = config
            .stages
            .iter()
            .map(|stage| {
                Ok(Stage {
                    name: stage.name.clone(),
                    rules: registry.resolve(&stage.rules)?,
                    repeat: stage.repeat,
                })
            })
            .collect::<XylemResult<Vec<_>>>()?;
        Ok(Self { stages, config })
    }

    pub fn config(&self) -> &RewriterConfig {
        &self.config
    }

    /// Rewrite `module` in place.
    ///
    /// Annotations are current for the returned tree.
    pub fn rewrite(&self, module: &mut QueryModule, catalog: &FunctionCatalog) -> XylemResult<RewriteReport> {
        let mut report = RewriteReport::default();

        for stage in &self.stages {
            let ceiling = match stage.repeat {
                RepeatPolicy::Once => 1,
                RepeatPolicy::ToFixpoint => self.config.max_passes,
            };
            let mut stage_report = StageReport {
                name: stage.name.clone(),
                ..StageReport::default()
            };

            loop {
                if stage_report.passes >= ceiling {
                    if stage.repeat == RepeatPolicy::ToFixpoint {
                        warn!(
                            "Stage '{}' reached the pass ceiling ({}) before a fixpoint",
                            stage.name, ceiling
                        );
                    }
                    break;
                }
                stage_report.passes += 1;

                annotate_module(module, catalog)?;
                let fired = self.run_pass(stage, module, catalog, &mut stage_report, &mut report.trace)?;

                if fired == 0 {
                    debug!(
                        "Stage '{}': no changes in pass {}, reached fixpoint",
                        stage.name, stage_report.passes
                    );
                    stage_report.reached_fixpoint = true;
                    break;
                }
            }

            report.stages.push(stage_report);
        }

        annotate_module(module, catalog)?;
        Ok(report)
    }

    /// One walk over every function body and the main expression.
    fn run_pass(
        &self,
        stage: &Stage,
        module: &mut QueryModule,
        catalog: &FunctionCatalog,
        stage_report: &mut StageReport,
        trace: &mut Vec<RuleTrace>,
    ) -> XylemResult<usize> {
        let QueryModule {
            arena,
            root,
            context,
        } = module;
        let mut bodies: Vec<ExprId> = context.functions.iter().map(|f| f.body).collect();

        let mut pass = Pass {
            rules: &stage.rules,
            stage: &stage.name,
            number: stage_report.passes,
            tracing: self.config.enable_trace,
            fired: 0,
            report: stage_report,
            trace,
        };
        {
            let mut ctx = RewriteContext::new(arena, context, catalog, &self.config);
            for body in &mut bodies {
                *body = pass.visit(&mut ctx, *body)?;
            }
            *root = pass.visit(&mut ctx, *root)?;
        }

        for (function, body) in context.functions.iter_mut().zip(bodies) {
            function.body = body;
        }
        Ok(pass.fired)
    }
}

/// State of a single pass.
struct Pass<'p> {
    rules: &'p [RewriteRule],
    stage: &'p str,
    number: usize,
    tracing: bool,
    fired: usize,
    report: &'p mut StageReport,
    trace: &'p mut Vec<RuleTrace>,
}

impl Pass<'_> {
    /// Rewrite the subtree at `id` and return its (possibly new) root.
    fn visit(&mut self, ctx: &mut RewriteContext<'_>, id: ExprId) -> XylemResult<ExprId> {
        let mut id = id;

        for rule in self.rules {
            let before = self.snapshot(ctx, id);
            if let Some(new) = rule.rewrite_pre(ctx, id)? {
                id = self.record(ctx, rule, id, new, before);
            }
        }

        for (i, child) in ctx.arena.children(id).into_iter().enumerate() {
            let new = self.visit(ctx, child)?;
            if new != child {
                *ctx.arena.kind_mut(id).children_mut()[i] = new;
            }
        }

        for rule in self.rules {
            let before = self.snapshot(ctx, id);
            if let Some(new) = rule.rewrite_post(ctx, id)? {
                id = self.record(ctx, rule, id, new, before);
            }
        }

        Ok(id)
    }

    fn snapshot(&self, ctx: &RewriteContext<'_>, id: ExprId) -> Option<String> {
        self.tracing.then(|| ctx.arena.explain(id))
    }

    fn record(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        rule: &RewriteRule,
        old: ExprId,
        new: ExprId,
        before: Option<String>,
    ) -> ExprId {
        let new = ctx.replace(old, new);
        self.fired += 1;
        *self.report.rules_fired.entry(rule.name().to_string()).or_default() += 1;
        debug!(
            "Rule '{}' rewrote {} in pass {} of stage '{}'",
            rule.name(),
            ctx.arena.kind(old).name(),
            self.number,
            self.stage
        );

        if let Some(before) = before {
            self.trace.push(RuleTrace {
                rule_name: rule.name().to_string(),
                stage: self.stage.to_string(),
                pass: self.number,
                before,
                after: ctx.arena.explain(new),
            });
        }
        new
    }
}

#[cfg(test)]
mod tests {
    use xylem_core::Item;
    use xylem_ir::ExprArena;

    use super::*;

    fn add_module() -> QueryModule {
        let mut arena = ExprArena::new();
        let a = arena.item(1i64);
        let b = arena.item(2i64);
        let root = arena.call_op("add", vec![a, b]);
        QueryModule::main_only(arena, root)
    }

    #[test]
    fn test_fold_reaches_fixpoint() {
        let catalog = FunctionCatalog::builtin().unwrap();
        let mut module = add_module();
        let rewriter = Rewriter::new(RewriterConfig::single_stage(&["FoldConst"])).unwrap();
        let report = rewriter.rewrite(&mut module, &catalog).unwrap();

        assert_eq!(report.fired("FoldConst"), 1);
        assert_eq!(report.stages[0].passes, 2);
        assert!(report.stages[0].reached_fixpoint);
        assert_eq!(
            module.arena.kind(module.root).as_literal().map(|s| s.to_vec()),
            Some(vec![Item::Integer(3)])
        );
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let err = Rewriter::new(RewriterConfig::single_stage(&["Bogus"])).unwrap_err();
        assert!(err.to_string().contains("Bogus"));
    }

    #[test]
    fn test_pass_ceiling_stops_stage() {
        // A rule that always claims a change never reaches a fixpoint.
        let mut registry = RuleRegistry::new();
        registry
            .register(RewriteRule::post("Restless", |_, id| Ok(Some(id))))
            .unwrap();
        let config = RewriterConfig::single_stage(&["Restless"]).with_max_passes(3);
        let rewriter = Rewriter::with_registry(config, &registry).unwrap();

        let catalog = FunctionCatalog::builtin().unwrap();
        let mut module = add_module();
        let report = rewriter.rewrite(&mut module, &catalog).unwrap();
        assert_eq!(report.stages[0].passes, 3);
        assert!(!report.stages[0].reached_fixpoint);
    }

    #[test]
    fn test_trace_records_firings() {
        let catalog = FunctionCatalog::builtin().unwrap();
        let mut module = add_module();
        let config = RewriterConfig::single_stage(&["FoldConst"]).with_trace(true);
        let report = Rewriter::new(config).unwrap().rewrite(&mut module, &catalog).unwrap();

        assert_eq!(report.trace.len(), 1);
        assert_eq!(report.trace[0].rule_name, "FoldConst");
        assert!(report.format_trace().contains("FoldConst"));
    }
}
