//! Integration tests for tessel-cli.
//!
//! Runs the `tessel` binary built by cargo.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn tessel_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tessel"))
}

/// Runs with an explicit config so the user's own file is never read.
fn run_with_config(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("tessel.toml");
    if !config.exists() {
        std::fs::write(&config, "[bake]\nwidth = 16\nheight = 16\n").unwrap();
    }
    tessel_bin()
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("failed to run tessel")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ---------------------------------------------------------------------------
// `tessel nodes`
// ---------------------------------------------------------------------------

#[test]
fn cli_nodes_lists_every_category() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["nodes"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Available Nodes"));
    for name in ["noise", "checker", "blend", "pbr_material", "image_source", "output"] {
        assert!(text.contains(name), "listing should contain '{name}'");
    }
}

#[test]
fn cli_nodes_detail_shows_parameters() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["nodes", "blend"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Parameters"));
    assert!(text.contains("mode"));
    assert!(text.contains("add|multiply|mix"));
}

#[test]
fn cli_nodes_json_is_parseable() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["nodes", "--json"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let nodes = value.as_array().unwrap();
    assert_eq!(nodes.len(), 16);
    assert!(nodes.iter().any(|n| n["name"] == "accumulate"));
}

#[test]
fn cli_nodes_unknown_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["nodes", "nonexistent"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown node"));
}

// ---------------------------------------------------------------------------
// `tessel order`
// ---------------------------------------------------------------------------

#[test]
fn cli_order_prints_plan() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["order", "noise | invert | blur | output"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Evaluation order (4 stages)"));
    // A linear chain alternates between two targets.
    assert!(text.contains("Baking plan: 2 target(s)"), "got:\n{text}");
    let noise = text.find("noise").unwrap();
    let out = text.rfind("output").unwrap();
    assert!(noise < out);
}

#[test]
fn cli_order_reports_parse_errors() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["order", "blend(noise"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unclosed"));
}

// ---------------------------------------------------------------------------
// `tessel bake`
// ---------------------------------------------------------------------------

#[test]
fn cli_bake_writes_one_png_per_frame() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("frames");
    let output = run_with_config(
        dir.path(),
        &[
            "bake",
            "solid:color=1,0,0,1 | invert | output",
            "-o",
            out.to_str().unwrap(),
            "--frames",
            "0..3",
            "--size",
            "8x4",
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let mut files: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(
        files,
        ["output_2_0000.png", "output_2_0001.png", "output_2_0002.png"]
    );

    let img = image::open(out.join("output_2_0001.png")).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (8, 4));
    assert_eq!(img.get_pixel(0, 0).0, [0, 255, 255, 255]);
}

#[test]
fn cli_bake_unknown_node_fails() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("frames");
    let output = run_with_config(
        dir.path(),
        &["bake", "noise | sparkle", "-o", out.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown node 'sparkle'"));
}

// ---------------------------------------------------------------------------
// `tessel config`
// ---------------------------------------------------------------------------

#[test]
fn cli_config_prints_loaded_values() {
    let dir = TempDir::new().unwrap();
    let output = run_with_config(dir.path(), &["config"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("[bake]"));
    assert!(text.contains("width = 16"));
}

#[test]
fn cli_config_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("new.toml");
    let target_str = target.to_str().unwrap();

    let first = run_with_config(dir.path(), &["config", "--init", "--path", target_str]);
    assert!(first.status.success());
    assert!(std::fs::read_to_string(&target).unwrap().contains("[evaluation]"));

    let second = run_with_config(dir.path(), &["config", "--init", "--path", target_str]);
    assert!(!second.status.success());

    let forced = run_with_config(
        dir.path(),
        &["config", "--init", "--path", target_str, "--force"],
    );
    assert!(forced.status.success());
}
