//! End-to-end tests for the `jobline` binary.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rstest::rstest;
use tempfile::TempDir;

fn jobline(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jobline"))
        .args(args)
        .env("JOBLINE_LOG", "warn")
        .output()
        .expect("failed to run jobline")
}

fn write_manifest(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("jobs.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

const ORDERED: &str = r#"
[scheduler]
max_threads = 2

[[pipelines]]
id = "etl"

[[pipelines.groups]]
jobs = [
    { name = "extract-a", command = ["sh", "-c", "echo a >> log.txt"] },
    { name = "extract-b", command = ["sh", "-c", "echo b >> log.txt"] },
]

[[pipelines.groups]]
jobs = [{ name = "load", command = ["sh", "-c", "echo load >> log.txt"] }]
"#;

#[test]
fn test_run_executes_groups_in_order() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir, ORDERED);

    let output = jobline(&["run", path_arg(&manifest)]);
    assert!(output.status.success(), "{output:?}");

    let log = fs::read_to_string(dir.path().join("log.txt")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], "load");
}

#[test]
fn test_json_report() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir, ORDERED);

    let output = jobline(&["run", path_arg(&manifest), "--format", "json"]);
    assert!(output.status.success(), "{output:?}");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["state"], "completed");
    assert_eq!(report["succeeded"], 3);
    assert_eq!(report["jobs"].as_array().unwrap().len(), 3);
    assert_eq!(report["jobs"][2]["state"], "succeeded");
}

#[test]
fn test_failing_job_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        &dir,
        r#"
[[pipelines]]
id = "broken"

[[pipelines.groups]]
jobs = [{ name = "fails", command = ["sh", "-c", "exit 3"] }]

[[pipelines.groups]]
jobs = [{ name = "never", command = ["sh", "-c", "touch never.txt"] }]
"#,
    );

    let output = jobline(&["run", path_arg(&manifest), "--format", "json"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("never.txt").exists());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["state"], "failed");
    assert_eq!(report["failed_job"], "fails");
    assert_eq!(report["jobs"][0]["error"], "'sh' exited with status 3");
}

#[test]
fn test_jobs_see_run_environment() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        &dir,
        r#"
[[pipelines]]
id = "env"

[[pipelines.groups]]
jobs = [{ name = "probe", command = ["sh", "-c", "echo $JOBLINE_PIPELINE/$JOBLINE_JOB/$JOBLINE_USE_CACHE/$EXTRA > env.txt"], env = { EXTRA = "x" } }]
"#,
    );

    let output = jobline(&["run", path_arg(&manifest), "--no-cache"]);
    assert!(output.status.success(), "{output:?}");
    let env = fs::read_to_string(dir.path().join("env.txt")).unwrap();
    assert_eq!(env.trim(), "env/probe/0/x");
}

#[test]
fn test_validate_accepts_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir, ORDERED);

    let output = jobline(&["validate", path_arg(&manifest), "--format", "json"]);
    assert!(output.status.success(), "{output:?}");

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["pipeline"], "etl");
    assert_eq!(rows[0]["groups"], 2);
    assert_eq!(rows[0]["max_width"], 2);
    assert!(!dir.path().join("log.txt").exists());
}

#[rstest]
#[case::empty_group("[[pipelines]]\nid = \"x\"\n[[pipelines.groups]]\njobs = []\n")]
#[case::bad_id("[[pipelines]]\nid = \"a b\"\n")]
#[case::unknown_key("[scheduler]\nthreads = 2\n")]
#[case::no_pipelines("")]
fn test_invalid_manifest_exits_with_one(#[case] contents: &str) {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(&dir, contents);

    let output = jobline(&["validate", path_arg(&manifest)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}
