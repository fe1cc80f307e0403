//! Integration tests for the `courier` binary.
//!
//! Each test works inside its own temporary directory with a small roster
//! and unpaced delays, so sessions finish immediately.

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const ROSTER: &str = "id,name\n1,Alice\n2,Bob\nabc,Mallory\n-4,Dana\n";

fn write_workspace(dir: &Path, extra_config: &str) -> Result<()> {
    let config = format!(
        r#"
roster_file: roster.csv
message_file: message.txt
min_delay: 0
random_delay: 0
max_retries: 2
max_time: -1
{extra_config}
"#
    );
    fs::write(dir.join("courier.yml"), config)?;
    fs::write(dir.join("roster.csv"), ROSTER)?;
    fs::write(dir.join("message.txt"), "Hi {name}")?;
    Ok(())
}

fn courier(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_courier"))
        .args(args)
        .arg("--no-log-file")
        .arg("--color")
        .arg("never")
        .current_dir(dir)
        .output()?;
    Ok(output)
}

fn read_stats(dir: &Path) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&fs::read_to_string(
        dir.join("stats.json"),
    )?)?)
}

#[test]
fn test_dry_run_sends_every_valid_record() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(temp_path, "dry_run: true")?;

    let output = courier(temp_path, &["run"])?;

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Session stopped: No more records to message"));
    assert!(stdout.contains("Sent Message Statistics"));

    let stats = read_stats(temp_path)?;
    assert_eq!(stats["messages_sent"], 3);
    assert_eq!(stats["messages_failed"], 0);
    assert_eq!(stats["current_position"], 4);

    // The non-numeric id is reported; the negative one is repaired.
    let repairs: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp_path.join("modified.json"))?)?;
    assert_eq!(repairs.as_array().map(Vec::len), Some(2));

    Ok(())
}

#[test]
fn test_command_submitter_receives_rendered_messages() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(
        temp_path,
        r#"submitter:
  command: sh
  args: ["-c", "cat >> outbox.txt; echo \" ($COURIER_RECORD_ID)\" >> outbox.txt"]"#,
    )?;

    let output = courier(temp_path, &["run"])?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let outbox = fs::read_to_string(temp_path.join("outbox.txt"))?;
    let lines: Vec<&str> = outbox.lines().collect();
    assert_eq!(lines, vec!["Hi Alice (1)", "Hi Bob (2)", "Hi Dana (4)"]);

    Ok(())
}

#[test]
fn test_failing_command_counts_failed_records() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(temp_path, "submitter:\n  command: \"false\"")?;

    let output = courier(temp_path, &["run"])?;
    assert!(output.status.success());

    let stats = read_stats(temp_path)?;
    assert_eq!(stats["messages_sent"], 0);
    assert_eq!(stats["messages_failed"], 3);
    // Two attempts per record.
    assert_eq!(stats["times_failed"], 6);

    Ok(())
}

#[test]
fn test_max_messages_flag_and_resume() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(temp_path, "dry_run: true")?;

    let output = courier(temp_path, &["run", "--max-messages", "1"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Max messages sent (1)"));
    assert_eq!(read_stats(temp_path)?["current_position"], 1);

    // A second run picks up after the first record.
    let output = courier(temp_path, &["run"])?;
    assert!(output.status.success());
    let stats = read_stats(temp_path)?;
    assert_eq!(stats["messages_sent"], 3);
    assert_eq!(stats["current_position"], 4);

    Ok(())
}

#[test]
fn test_record_events_writes_jsonl() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(temp_path, "dry_run: true")?;

    let output = courier(temp_path, &["run", "--record-events", "events.jsonl"])?;
    assert!(output.status.success());

    let recording = fs::read_to_string(temp_path.join("events.jsonl"))?;
    let events: Vec<serde_json::Value> = recording
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(events[0]["event"], "_meta.session");
    assert_eq!(events[1]["event"], "session.started");
    assert_eq!(
        events.last().map(|e| e["event"].clone()),
        Some(serde_json::json!("session.stopped"))
    );
    let finished = events
        .iter()
        .filter(|e| e["event"] == "record.finished")
        .count();
    assert_eq!(finished, 3);

    Ok(())
}

#[test]
fn test_run_without_command_fails_validation() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(temp_path, "")?;

    let output = courier(temp_path, &["run"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration validation failed"), "{stderr}");
    assert!(!temp_path.join("stats.json").exists());

    Ok(())
}

#[test]
fn test_stats_and_backup() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();
    write_workspace(temp_path, "dry_run: true")?;

    let output = courier(temp_path, &["stats"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No statistics snapshot"));

    assert!(courier(temp_path, &["run"])?.status.success());

    let output = courier(temp_path, &["stats"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Messages Sent:"));
    assert!(stdout.contains("Roster Position:"));

    let output = courier(temp_path, &["backup"])?;
    assert!(output.status.success());
    assert!(temp_path.join("stats_backup_4.json").exists());
    assert!(temp_path.join("stats.json").exists());

    Ok(())
}

#[test]
fn test_init_writes_defaults_once() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path();

    let output = courier(temp_path, &["init"])?;
    assert!(output.status.success());

    let config = fs::read_to_string(temp_path.join("courier.yml"))?;
    assert!(config.contains("roster_file"));
    assert!(temp_path.join("message.txt").exists());

    fs::write(temp_path.join("message.txt"), "Keep me")?;
    let output = courier(temp_path, &["init"])?;
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(temp_path.join("message.txt"))?, "Keep me");

    Ok(())
}
