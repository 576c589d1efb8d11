//! Unit tests for common-config crate

use common_config::{
    ExecutionConfig, RepeatPolicy, RewriterConfig, StageConfig, XylemConfig, DEFAULT_MAX_CALL_DEPTH,
    DEFAULT_MAX_PASSES,
};

#[test]
fn test_xylem_config_default() {
    let config = XylemConfig::default();

    assert_eq!(config.rewriter.max_passes, DEFAULT_MAX_PASSES);
    assert!(!config.rewriter.fold_expensive_ops);
    assert!(!config.rewriter.enable_trace);
    assert_eq!(config.execution.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_pipeline_shape() {
    let config = RewriterConfig::default();
    let names: Vec<_> = config.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["simplify", "inline", "simplify-inlined", "loops", "cleanup"]
    );
    assert_eq!(config.stages[1].repeat, RepeatPolicy::Once);
    assert_eq!(config.stages[0].repeat, RepeatPolicy::ToFixpoint);
    assert!(config.stages[0].rules.contains(&"FoldConst".to_string()));
}

#[test]
fn test_builder_methods() {
    let config = RewriterConfig::single_stage(&["FoldConst"])
        .with_max_passes(3)
        .with_fold_expensive_ops(true)
        .with_inline_threshold(8)
        .with_trace(true);

    assert_eq!(config.stages.len(), 1);
    assert_eq!(config.max_passes, 3);
    assert!(config.fold_expensive_ops);
    assert_eq!(config.inline_threshold, 8);
    assert!(config.enable_trace);
}

#[test]
fn test_zero_pass_ceiling_rejected() {
    let config = RewriterConfig::default().with_max_passes(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_stage_rejected() {
    let mut config = RewriterConfig::default();
    config.stages.push(StageConfig::once("empty", &[]));
    assert!(config.validate().is_err());
}

#[test]
fn test_execution_config_rejects_zero_depth() {
    let config = XylemConfig {
        execution: ExecutionConfig { max_call_depth: 0 },
        ..XylemConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_xylem_config_serialization() {
    let mut config = XylemConfig::default();
    config.rewriter.max_passes = 7;
    config.rewriter.fold_expensive_ops = true;
    config.execution.max_call_depth = 16;

    let json = serde_json::to_string(&config).unwrap();
    let parsed = XylemConfig::from_json(&json).unwrap();

    assert_eq!(parsed.rewriter, config.rewriter);
    assert_eq!(parsed.execution, config.execution);
}

#[test]
fn test_stage_repeat_defaults_when_missing() {
    let json = r#"{
        "rewriter": {
            "stages": [{ "name": "only", "rules": ["FoldConst"] }],
            "max_passes": 4,
            "fold_expensive_ops": false,
            "inline_threshold": 10,
            "enable_trace": false
        },
        "execution": { "max_call_depth": 8 }
    }"#;

    let config = XylemConfig::from_json(json).unwrap();
    assert_eq!(config.rewriter.stages[0].repeat, RepeatPolicy::ToFixpoint);
    assert_eq!(config.rewriter.max_passes, 4);
}
