// Snapshot tests: lock the liveness report format and the results for the
// demo programs.
//
// Uses the library API (run_pipeline → render) and snapshots the text output.
// Snapshots are managed by `insta` and stored under `compiler/tests/snapshots/`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use std::path::{Path, PathBuf};

use tlc::pass::PassId;
use tlc::pipeline::{run_pipeline, PipelineOptions};
use tlc::report;

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn read_demo(name: &str) -> String {
    let path = project_root().join("demos").join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

fn liveness_text(source: &str) -> String {
    let analysis = run_pipeline(source, &PipelineOptions::default()).expect("pipeline failed");
    let func = analysis.function().unwrap();
    report::render_text(&analysis.entry, func, &analysis.program.vars, &analysis.result)
}

fn snapshot_demo(name: &str) {
    let output = liveness_text(&read_demo(name));
    assert!(!output.is_empty(), "empty report for {}", name);
    let snap_name = format!("liveness_{}", name.replace('.', "_"));
    insta::assert_snapshot!(snap_name, output);
}

#[test]
fn snapshot_straight() {
    snapshot_demo("straight.tlc");
}

#[test]
fn snapshot_branch() {
    snapshot_demo("branch.tlc");
}

#[test]
fn snapshot_conflict() {
    snapshot_demo("conflict.tlc");
}

#[test]
fn snapshot_tuple_closure() {
    snapshot_demo("tuple_closure.tlc");
}

#[test]
fn snapshot_nested_call() {
    snapshot_demo("nested_call.tlc");
}

#[test]
fn snapshot_identities_tuple_closure() {
    let options = PipelineOptions {
        terminal: PassId::Forward,
        ..PipelineOptions::default()
    };
    let analysis = run_pipeline(&read_demo("tuple_closure.tlc"), &options).unwrap();
    let output = report::render_identities(&analysis.entry, &analysis.program.vars, &analysis.result);
    insta::assert_snapshot!("identities_tuple_closure_tlc", output);
}

#[test]
fn snapshot_ir_branch() {
    let analysis = run_pipeline(&read_demo("branch.tlc"), &PipelineOptions::default()).unwrap();
    let output = analysis
        .program
        .display_function(&analysis.entry)
        .unwrap()
        .to_string();
    insta::assert_snapshot!("ir_branch_tlc", output);
}
