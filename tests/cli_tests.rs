//! Binary-level tests: replay an event stream through the cronista CLI

use assert_cmd::Command;
use cronista::record::{parse_line, AnyRecord};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn write_events(dir: &Path, source: &Path) -> std::path::PathBuf {
    let events = dir.join("events.jsonl");
    let source_text = source.display();
    let content = format!(
        concat!(
            "{{\"kind\":\"line\",\"path\":\"{0}\",\"line\":1}}\n",
            "{{\"kind\":\"call\",\"path\":\"{0}\",\"line\":1,\"method\":\"greet\"}}\n",
            "{{\"kind\":\"return\",\"path\":\"{0}\",\"line\":1,\"method\":\"greet\",",
            "\"return_value\":{{\"repr\":\"\\\"hi\\\"\",\"type_label\":\"String\"}}}}\n",
        ),
        source_text
    );
    std::fs::write(&events, content).unwrap();
    events
}

#[test]
fn test_replays_event_file_into_trace_log() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("main.rb");
    std::fs::write(&source, "greet\n").unwrap();
    let events = write_events(dir.path(), &source);
    let output = dir.path().join("trace.jsonl");

    Command::cargo_bin("cronista")
        .unwrap()
        .arg("-o")
        .arg(&output)
        .arg("--app-root")
        .arg(dir.path())
        .arg(&events)
        .assert()
        .success()
        .stderr(predicate::str::contains("trace written to"));

    let content = std::fs::read_to_string(&output).unwrap();
    let records: Vec<AnyRecord> = content
        .lines()
        .map(|line| parse_line(line).unwrap())
        .collect();
    assert_eq!(records.len(), 4);
    assert!(matches!(records.last().unwrap(), AnyRecord::Summary(_)));
}

#[test]
fn test_reads_events_from_stdin() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("main.rb");
    std::fs::write(&source, "x = 1\n").unwrap();
    let output = dir.path().join("trace.jsonl");

    Command::cargo_bin("cronista")
        .unwrap()
        .arg("-o")
        .arg(&output)
        .arg("--app-root")
        .arg(dir.path())
        .write_stdin(format!(
            "{{\"kind\":\"line\",\"path\":\"{}\",\"line\":1}}\n",
            source.display()
        ))
        .assert()
        .success();

    assert!(output.exists());
    assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 2);
}

#[test]
fn test_malformed_events_are_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("trace.jsonl");

    Command::cargo_bin("cronista")
        .unwrap()
        .arg("-o")
        .arg(&output)
        .write_stdin("this is not json\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("1 malformed events skipped"));

    // Stream still closes with a summary
    let content = std::fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 1);
}

#[test]
fn test_existing_output_destination_is_fatal() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("trace.jsonl");
    std::fs::write(&output, "occupied").unwrap();

    Command::cargo_bin("cronista")
        .unwrap()
        .arg("-o")
        .arg(&output)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open trace destination"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("cronista")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cronista"));
}
