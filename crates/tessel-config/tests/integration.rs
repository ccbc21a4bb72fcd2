//! Integration tests for tessel-config.
//!
//! These tests go through the file system and into the core engine.

use std::sync::Arc;

use tempfile::TempDir;
use tessel_config::{ConfigError, EngineConfig, FormatSetting};
use tessel_core::{
    EvaluationContext, FragmentInput, NodeCatalog, NodeCategory, NodeTypeInfo, ProgramLibrary,
    StageCollection, software_factory,
};

fn white(_: &FragmentInput<'_>) -> [f32; 4] {
    [1.0; 4]
}

/// Test that a saved configuration loads back unchanged.
#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("tessel.toml");

    let mut config = EngineConfig::default();
    config.evaluation.format = FormatSetting::Rgba16f;
    config.bake.max_passes_per_frame = 4;
    config.save(&path).expect("save should create parent directories");

    assert_eq!(EngineConfig::load(&path).unwrap(), config);
}

/// Test that a missing file reports its path.
#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = EngineConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

/// Test that the converted context settings size default targets.
#[test]
fn test_config_drives_context() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tessel.toml");
    std::fs::write(
        &path,
        "[evaluation]\ndefault_width = 6\ndefault_height = 3\nbatch_size = 1\n",
    )
    .unwrap();
    let config = EngineConfig::load(&path).unwrap();

    let mut programs = ProgramLibrary::new();
    programs.insert("white", white);
    let mut catalog = NodeCatalog::new();
    let white_type = catalog
        .register(NodeTypeInfo::new("white", NodeCategory::Generator).shader("white"))
        .unwrap();

    let mut graph = StageCollection::new(Arc::new(catalog));
    let a = graph.add_stage(white_type).unwrap();
    let b = graph.add_stage(white_type).unwrap();

    let factory = software_factory(Arc::new(programs));
    let mut ctx = EvaluationContext::new(factory(), config.to_context_config());

    // One stage per call with a batch size of one.
    let report = ctx.evaluate(&graph);
    assert_eq!(report.executed, vec![a]);
    assert!(!report.is_idle());
    ctx.evaluate(&graph);

    let px = ctx.read_pixels(b).unwrap().unwrap();
    assert_eq!((px.width, px.height), (6, 3));
    assert_eq!(px.get(5, 2), Some([1.0; 4]));
}
