//! Xylem - rule-based rewriting and pull-iterator execution for
//! XQuery-style queries.
//!
//! A name-resolved [`QueryModule`] goes through three steps:
//! 1. the [`Rewriter`] runs the configured rule stages over the IR
//! 2. codegen lowers the annotated tree into an immutable [`Plan`]
//! 3. any number of [`Execution`]s drive the plan, each with its own state
//!
//! [`Compiler`] bundles the first two steps; a [`CompiledQuery`] can be
//! executed, explained or persisted.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use log::debug;

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use xylem_catalog as catalog;
pub use xylem_core as core;
pub use xylem_ir as ir;
pub use xylem_rewriter as rewriter;
pub use xylem_runtime as runtime;


use common_config::XylemConfig;
use common_error::XylemResult;
use xylem_catalog::FunctionCatalog;
use xylem_core::Item;
use xylem_ir::QueryModule;
use xylem_rewriter::{RewriteReport, Rewriter};
use xylem_runtime::{decode_plan, encode_plan, DynamicContext, Execution, Plan};

/// Xylem version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compiles query modules against one catalog and configuration.
///
/// The compiler holds no per-query state; one instance may compile any
/// number of modules, from any number of threads.
#[derive(Debug, Clone)]
pub struct Compiler {
    catalog: Arc<FunctionCatalog>,
    config: XylemConfig,
    rewriter: Rewriter,
}

impl Compiler {
    /// A compiler over the built-in catalog with the default configuration.
    pub fn new() -> XylemResult<Self> {
        Self::with_config(Arc::new(FunctionCatalog::builtin()?), XylemConfig::default())
    }

    /// A compiler over an explicit catalog and configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration fails validation.
    pub fn with_config(catalog: Arc<FunctionCatalog>, config: XylemConfig) -> XylemResult<Self> {
        config.validate()?;
        let rewriter = Rewriter::new(config.rewriter.clone())?;
        Ok(Self {
            catalog,
            config,
            rewriter,
        })
    }

    pub fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &XylemConfig {
        &self.config
    }

    /// Rewrite and lower a module.
    ///
    /// Static errors (unbound variables, type errors, arity mismatches)
    /// abort compilation; no plan is produced.
    pub fn compile(&self, mut module: QueryModule) -> XylemResult<CompiledQuery> {
        let report = self.rewriter.rewrite(&mut module, &self.catalog)?;
        let plan = xylem_catalog::generate(&module, &self.catalog)?;
        debug!(
            "Compiled query: {} rule firing(s), {} plan node(s)",
            report.rules_applied(),
            plan.operator_count()
        );
        Ok(CompiledQuery {
            plan: Arc::new(plan),
            report,
            config: self.config.clone(),
        })
    }
}

/// A compiled query: the shared plan plus what the rewriter did.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    plan: Arc<Plan>,
    report: RewriteReport,
    config: XylemConfig,
}

impl CompiledQuery {
    /// Restore a persisted plan without rewriting.
    pub fn from_bytes(bytes: &[u8], config: XylemConfig) -> XylemResult<Self> {
        Ok(Self {
            plan: Arc::new(decode_plan(bytes)?),
            report: RewriteReport::default(),
            config,
        })
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    pub fn report(&self) -> &RewriteReport {
        &self.report
    }

    /// Start an execution with its own state.
    pub fn execution(&self, ctx: DynamicContext) -> Execution {
        Execution::new(Arc::clone(&self.plan), ctx.with_config(self.config.execution.clone()))
    }

    /// Run to completion and collect the result sequence.
    pub fn execute(&self, ctx: DynamicContext) -> XylemResult<Vec<Item>> {
        self.execution(ctx).collect()
    }

    pub fn explain(&self) -> String {
        self.plan.explain()
    }

    /// Persist the plan.
    pub fn to_bytes(&self) -> XylemResult<Vec<u8>> {
        encode_plan(&self.plan)
    }
}
