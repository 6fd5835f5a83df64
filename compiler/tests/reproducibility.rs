// CLI tests: byte-identical output for identical input, and exit codes.
//
// Runs the `tlc` binary on the demo programs under `demos/`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn tlc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tlc"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demo(name: &str) -> String {
    project_root()
        .join("demos")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn run_tlc_raw(args: &[&str]) -> Output {
    Command::new(tlc_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tlc")
}

fn run_tlc(args: &[&str]) -> String {
    let output = run_tlc_raw(args);
    assert!(
        output.status.success(),
        "tlc failed with args {:?}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("non-UTF8 output")
}

// ── Reproducibility ─────────────────────────────────────────────────────────

#[test]
fn same_source_identical_liveness_text() {
    let src = demo("branch.tlc");
    let first = run_tlc(&[&src]);
    let second = run_tlc(&[&src]);
    assert_eq!(first, second, "text output should be byte-identical across runs");
    assert!(first.starts_with("liveness @main: valid"));
}

#[test]
fn same_source_identical_json() {
    let src = demo("tuple_closure.tlc");
    let first = run_tlc(&["--emit", "json", &src]);
    let second = run_tlc(&["--emit", "json", &src]);
    assert_eq!(first, second);
    let value: serde_json::Value = serde_json::from_str(&first).expect("invalid JSON");
    assert_eq!(value["status"], "valid");
    assert_eq!(value["function"], "main");
}

#[test]
fn build_info_is_stable_and_well_formed() {
    let src = demo("straight.tlc");
    let first = run_tlc(&["--emit", "build-info", &src]);
    let second = run_tlc(&["--emit", "build-info", &src]);
    assert_eq!(first, second);
    let value: serde_json::Value = serde_json::from_str(&first).expect("invalid JSON");
    let hash = value["source_hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(value["tool_version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn different_demos_have_different_fingerprints() {
    let a = run_tlc(&["--emit", "build-info", &demo("straight.tlc")]);
    let b = run_tlc(&["--emit", "build-info", &demo("branch.tlc")]);
    let a: serde_json::Value = serde_json::from_str(&a).unwrap();
    let b: serde_json::Value = serde_json::from_str(&b).unwrap();
    assert_ne!(a["result_fingerprint"], b["result_fingerprint"]);
}

#[test]
fn output_file_matches_stdout() {
    let src = demo("straight.tlc");
    let stdout = run_tlc(&[&src]);
    let path = std::env::temp_dir().join(format!("tlc-output-{}.txt", std::process::id()));
    let path_str = path.to_str().unwrap().to_string();
    let printed = run_tlc(&[&src, "-o", &path_str]);
    assert!(printed.is_empty());
    let written = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(written, stdout);
}

// ── Exit codes ──────────────────────────────────────────────────────────────

#[test]
fn aliasing_conflict_exits_one_with_report() {
    let output = run_tlc_raw(&[&demo("conflict.tlc")]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("error[E0200]"), "stdout: {}", stdout);
}

#[test]
fn unsupported_form_exits_one() {
    let output = run_tlc_raw(&["--emit", "json", &demo("nested_call.tlc")]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0101"), "stderr: {}", stderr);
}

#[test]
fn identities_stop_before_liveness() {
    let out = run_tlc(&["--emit", "identities", &demo("conflict.tlc")]);
    assert!(out.starts_with("identities @main: partial"), "{}", out);
}

#[test]
fn ir_emit_prints_the_entry_function() {
    let out = run_tlc(&["--emit", "ir", &demo("straight.tlc")]);
    assert!(out.starts_with("fn @main(%x: Tensor, %w: Tensor) {"), "{}", out);
}

#[test]
fn missing_entry_exits_one() {
    let output = run_tlc_raw(&["--entry", "nope", &demo("straight.tlc")]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0004"), "stderr: {}", stderr);
}

#[test]
fn missing_source_exits_two() {
    let output = run_tlc_raw(&["/nonexistent/never/there.tlc"]);
    assert_eq!(output.status.code(), Some(2));
}
