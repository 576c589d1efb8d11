//! Configuration management for Xylem.
//!
//! Provides the rewrite pipeline definition (ordered rule stages, pass
//! ceiling, folding knobs) and execution limits.

use common_error::{XylemError, XylemResult};
use serde::{Deserialize, Serialize};

/// Default ceiling on the number of passes a fixpoint stage may run.
pub const DEFAULT_MAX_PASSES: usize = 32;

/// Default nesting limit for user-function calls. Must fit a 2 MiB thread
/// stack in unoptimized builds.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Global Xylem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XylemConfig {
    /// Rewriter configuration.
    pub rewriter: RewriterConfig,
    /// Execution configuration.
    pub execution: ExecutionConfig,
}

impl XylemConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> XylemResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric knobs and pipeline shape.
    pub fn validate(&self) -> XylemResult<()> {
        self.rewriter.validate()?;
        if self.execution.max_call_depth == 0 {
            return Err(XylemError::invalid_config("max_call_depth must be positive"));
        }
        Ok(())
    }
}

/// How often a stage runs its rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatPolicy {
    /// Exactly one pass.
    Once,
    /// Passes repeat until one completes without modification, bounded by
    /// `max_passes`.
    #[default]
    ToFixpoint,
}

/// One stage of the rewrite pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, used in logs and reports.
    pub name: String,
    /// Rule names, applied in this order at every node.
    pub rules: Vec<String>,
    /// Repetition policy for the stage.
    #[serde(default)]
    pub repeat: RepeatPolicy,
}

impl StageConfig {
    /// Create a stage that runs to fixpoint.
    pub fn fixpoint<S: Into<String>>(name: S, rules: &[&str]) -> Self {
        Self {
            name: name.into(),
            rules: rules.iter().map(|r| (*r).to_string()).collect(),
            repeat: RepeatPolicy::ToFixpoint,
        }
    }

    /// Create a stage that runs a single pass.
    pub fn once<S: Into<String>>(name: S, rules: &[&str]) -> Self {
        Self {
            repeat: RepeatPolicy::Once,
            ..Self::fixpoint(name, rules)
        }
    }
}

/// Rewriter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriterConfig {
    /// Ordered pipeline stages.
    pub stages: Vec<StageConfig>,
    /// Pass ceiling for `ToFixpoint` stages.
    pub max_passes: usize,
    /// Whether constant folding may evaluate operations marked expensive.
    pub fold_expensive_ops: bool,
    /// Largest function body (in IR nodes) that may be inlined.
    pub inline_threshold: usize,
    /// Record an explain snapshot after every pass.
    pub enable_trace: bool,
}

const SIMPLIFY: &[&str] = &[
    "RefactorPredFLWOR",
    "EliminateUnusedLetVars",
    "MergeFLWOR",
    "PartialEval",
    "EliminateTypeEnforcingOperations",
    "EliminateNodeOps",
    "FoldConst",
];

/// Every rule except inlining.
const CLEANUP: &[&str] = &[
    "RefactorPredFLWOR",
    "EliminateUnusedLetVars",
    "MergeFLWOR",
    "PartialEval",
    "EliminateTypeEnforcingOperations",
    "EliminateNodeOps",
    "FoldConst",
    "HoistExprsOutOfLoops",
    "IndexJoin",
];

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig::fixpoint("simplify", SIMPLIFY),
                StageConfig::once("inline", &["InlineFunctions"]),
                StageConfig::fixpoint("simplify-inlined", SIMPLIFY),
                StageConfig::fixpoint("loops", &["HoistExprsOutOfLoops", "IndexJoin"]),
                StageConfig::fixpoint("cleanup", CLEANUP),
            ],
            max_passes: DEFAULT_MAX_PASSES,
            fold_expensive_ops: false,
            inline_threshold: 64,
            enable_trace: false,
        }
    }
}

impl RewriterConfig {
    /// A configuration with a single fixpoint stage over the given rules.
    pub fn single_stage(rules: &[&str]) -> Self {
        Self {
            stages: vec![StageConfig::fixpoint("main", rules)],
            ..Self::default()
        }
    }

    /// Set the pass ceiling.
    #[must_use]
    pub fn with_max_passes(mut self, max: usize) -> Self {
        self.max_passes = max;
        self
    }

    /// Allow or forbid folding of expensive operations.
    #[must_use]
    pub fn with_fold_expensive_ops(mut self, enable: bool) -> Self {
        self.fold_expensive_ops = enable;
        self
    }

    /// Set the inlining threshold.
    #[must_use]
    pub fn with_inline_threshold(mut self, nodes: usize) -> Self {
        self.inline_threshold = nodes;
        self
    }

    /// Enable or disable tracing.
    #[must_use]
    pub fn with_trace(mut self, enable: bool) -> Self {
        self.enable_trace = enable;
        self
    }

    /// Check the pass ceiling and stage list.
    pub fn validate(&self) -> XylemResult<()> {
        if self.max_passes == 0 {
            return Err(XylemError::invalid_config("max_passes must be positive"));
        }
        for stage in &self.stages {
            if stage.rules.is_empty() {
                return Err(XylemError::invalid_config(format!(
                    "stage '{}' has no rules",
                    stage.name
                )));
            }
        }
        Ok(())
    }
}

/// Execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum nesting of user-function calls.
    pub max_call_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
