//! End-to-end tests for the `logscope` binary.
//!
//! Each test runs the compiled binary inside a temporary working directory
//! so that `./logscope.toml` discovery never picks up a stray file.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

const DB_TIMEOUT_RULE: &str = r#"
id: db_timeouts
title: Database timeouts
condition:
  level: ERROR
  pattern:
    modifier: contains
    value: db timeout
threshold_count: 3
window_secs: 60
cooldown_secs: 300
"#;

fn logscope(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_logscope"));
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .args(["--log-level", "error"]);
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    logscope(dir).args(args).output().expect("binary should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_app_log(dir: &Path) {
    let mut lines: Vec<String> = (0..5)
        .map(|i| format!("2024-03-01 10:00:{:02} ERROR db timeout id={i}", i * 10))
        .collect();
    lines.push("2024-03-01 10:00:55 INFO recovered".to_owned());
    fs::write(dir.join("app.log"), lines.join("\n") + "\n").expect("should write log");
}

#[test]
fn analyze_text_report_shows_top_error_template() {
    let dir = TempDir::new().expect("should create temp dir");
    write_app_log(dir.path());

    let output = run(dir.path(), &["analyze", "app.log"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("app.log"));
    assert!(text.contains("Top errors"));
    assert!(text.contains("db timeout id=<NUM>"));
}

#[test]
fn analyze_json_report_with_rules_contains_alert() {
    let dir = TempDir::new().expect("should create temp dir");
    write_app_log(dir.path());
    fs::create_dir(dir.path().join("rules")).unwrap();
    fs::write(dir.path().join("rules/db.yml"), DB_TIMEOUT_RULE).unwrap();

    let output = run(
        dir.path(),
        &["--output", "json", "analyze", "app.log", "--rules", "rules"],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    let source = &report["sources"][0];
    assert_eq!(source["source_id"].as_str(), Some("app.log"));
    assert_eq!(source["summary"]["total_entries"].as_u64(), Some(6));
    let alerts = source["alerts"].as_array().expect("alerts array");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["rule_id"].as_str(), Some("db_timeouts"));
}

#[test]
fn analyze_links_shared_request_ids_across_files() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(
        dir.path().join("api.log"),
        "2024-03-01 10:00:00 ERROR upstream failed request_id=abc\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("db.log"),
        "2024-03-01 10:05:00 ERROR query failed request_id=abc\n",
    )
    .unwrap();

    let output = run(dir.path(), &["--output", "json", "analyze", "api.log", "db.log"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let links = report["links"].as_array().expect("links array");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["relation_type"].as_str(), Some("SHARED_IDENTIFIER"));
    assert_eq!(links[0]["detail"].as_str(), Some("request_id=abc"));
}

#[test]
fn analyze_truncates_over_long_lines() {
    let dir = TempDir::new().expect("should create temp dir");
    let huge = "z".repeat(1_000_000);
    fs::write(
        dir.path().join("wide.log"),
        format!("2024-03-01 10:00:00 ERROR payload {huge}\n2024-03-01 10:00:01 INFO ok\n"),
    )
    .unwrap();

    let output = logscope(dir.path())
        .env("LOGSCOPE_ANALYSIS_MAX_LINE_LENGTH", "256")
        .args(["--output", "json", "analyze", "wide.log"])
        .output()
        .expect("binary should run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let source = &report["sources"][0];
    assert_eq!(source["summary"]["total_entries"].as_u64(), Some(2));
    let warnings = source["warnings"].as_array().expect("warnings array");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["stage"].as_str(), Some("tokenizer"));
}

#[test]
fn analyze_missing_file_exits_with_io_code() {
    let dir = TempDir::new().expect("should create temp dir");
    let output = run(dir.path(), &["analyze", "missing.log"]);
    assert_eq!(output.status.code(), Some(10));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.log"));
}

#[test]
fn invalid_config_file_exits_with_config_code() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(
        dir.path().join("logscope.toml"),
        "[analysis]\nwindow_size_secs = 0\n",
    )
    .unwrap();

    let output = run(dir.path(), &["config", "validate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).contains("INVALID"));

    write_app_log(dir.path());
    let output = run(dir.path(), &["analyze", "app.log"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn config_show_reads_discovered_file() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(
        dir.path().join("logscope.toml"),
        "[analysis]\ntop_n = 3\n",
    )
    .unwrap();

    let output = run(dir.path(), &["--output", "json", "config", "show", "--section", "analysis"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["source"].as_str(), Some("logscope.toml"));
    assert_eq!(report["config"]["top_n"].as_u64(), Some(3));
}

#[test]
fn rules_validate_reports_invalid_file() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(dir.path().join("db.yml"), DB_TIMEOUT_RULE).unwrap();

    let output = run(dir.path(), &["rules", "validate", "."]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    fs::write(dir.path().join("broken.yaml"), "id: [unclosed").unwrap();
    let output = run(dir.path(), &["rules", "validate", "."]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("broken.yaml"));
}

#[test]
fn tail_streams_alerts_and_closes_with_summary() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(dir.path().join("db.yml"), DB_TIMEOUT_RULE).unwrap();

    let mut child = logscope(dir.path())
        .args(["tail", "--rules", "."])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("binary should start");

    {
        let mut stdin = child.stdin.take().expect("stdin is piped");
        for i in 0..3 {
            writeln!(stdin, "2024-03-01 10:00:{:02} ERROR db timeout id={i}", i * 10).unwrap();
        }
        writeln!(stdin, "2024-03-01 10:00:40 INFO recovered").unwrap();
    }

    let output = child.wait_with_output().expect("binary should exit");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("ALERT"));
    assert!(text.contains("[db_timeouts]"));
    assert!(text.contains("-- stdin: 4 lines, 4 entries, 1 alerts"));
}
