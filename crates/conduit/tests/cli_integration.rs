//! CLI integration tests for the Conduit command-line interface.
//!
//! These tests use config files with no providers (or providers that are
//! never started), so they need no external tool servers.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A scratch directory holding the config file and the log directory.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("conduit.toml"), config).unwrap();
        Self { dir }
    }

    fn empty() -> Self {
        Self::new("")
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("conduit.toml")
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// A command for the conduit binary using this sandbox's config.
    fn conduit(&self) -> Command {
        let mut cmd = Command::cargo_bin("conduit").unwrap();
        cmd.env("CONDUIT_CONFIG_DIR", self.dir.path())
            .env_remove("CONDUIT_CONFIG")
            .arg("--config")
            .arg(self.config_path());
        cmd
    }
}

fn conduit() -> Command {
    Command::cargo_bin("conduit").unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    conduit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conduit"))
        .stdout(predicate::str::contains("tool-call orchestration"));
}

#[test]
fn test_version_displays() {
    conduit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("conduit"));
}

#[test]
fn test_help_lists_subcommands() {
    conduit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("providers"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("replay"));
}

#[test]
fn test_tools_format_rejects_unknown_value() {
    conduit()
        .args(["tools", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_providers_empty() {
    let sandbox = Sandbox::empty();
    sandbox
        .conduit()
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("No providers configured."));
}

#[test]
fn test_providers_lists_groups() {
    let sandbox = Sandbox::new(
        r#"
[providers.preregistered.clock]
command = "sh"
args = ["-c", "exit 0"]

[providers.user.remote]
transport = "http"
url = "http://localhost:9/mcp"

[providers.user.off]
command = "sh"
enabled = false
"#,
    );

    sandbox
        .conduit()
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("clock"))
        .stdout(predicate::str::contains("providers.preregistered"))
        .stdout(predicate::str::contains("http://localhost:9/mcp"))
        .stdout(predicate::str::contains("off").not());
}

#[test]
fn test_providers_json() {
    let sandbox = Sandbox::new(
        r#"
[providers.user.clock]
command = "sh"
timeout_secs = 5
"#,
    );

    let output = sandbox
        .conduit()
        .args(["--json", "providers"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["providers"][0]["name"], "clock");
    assert_eq!(value["providers"][0]["transport"], "stdio");
    assert_eq!(value["providers"][0]["timeout_secs"], 5);
}

#[test]
fn test_duplicate_provider_rejected() {
    let sandbox = Sandbox::new(
        r#"
[providers.preregistered.search]
command = "sh"

[providers.user.search]
command = "sh"
"#,
    );

    sandbox
        .conduit()
        .arg("providers")
        .assert()
        .failure()
        .stderr(predicate::str::contains("search"));
}

#[test]
fn test_missing_config_file_fails() {
    let sandbox = Sandbox::empty();
    let mut cmd = Command::cargo_bin("conduit").unwrap();
    cmd.env("CONDUIT_CONFIG_DIR", sandbox.dir.path())
        .args(["--config", "/nonexistent/conduit.toml", "providers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/conduit.toml"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools and Call
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_tools_empty_catalog() {
    let sandbox = Sandbox::empty();
    sandbox
        .conduit()
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tools available."));
}

#[test]
fn test_tools_openai_format_empty() {
    let sandbox = Sandbox::empty();
    sandbox
        .conduit()
        .args(["tools", "--format", "openai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_call_unknown_tool() {
    let sandbox = Sandbox::empty();
    sandbox
        .conduit()
        .args(["call", "weather", r#"{"city": "Oslo"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Tool 'weather' is not available."));
}

#[test]
fn test_call_unknown_tool_json() {
    let sandbox = Sandbox::empty();
    sandbox
        .conduit()
        .args(["--json", "call", "weather"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"failure\""))
        .stdout(predicate::str::contains("invocation_failed"));
}

#[test]
fn test_call_rejects_non_object_arguments() {
    let sandbox = Sandbox::empty();
    sandbox
        .conduit()
        .args(["call", "echo", "[1, 2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("arguments must be a JSON object"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Replay
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_replay_text_and_unknown_tool() {
    let sandbox = Sandbox::empty();
    let events = sandbox.write(
        "events.jsonl",
        r#"{"content": "Let me compute. "}
{"tool_call_delta": {"index": 0, "name": "calculate_bmi", "arguments": "{\"w\":70,"}}
{"tool_call_delta": {"index": 0, "arguments": "\"h\":1.75}"}}
{"content": ""}
"#,
    );

    sandbox
        .conduit()
        .arg("replay")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("Let me compute. "))
        .stdout(predicate::str::contains("[calculate_bmi call_0 error]"))
        .stdout(predicate::str::contains(
            "Error: Tool 'calculate_bmi' is not available.",
        ));
}

#[test]
fn test_replay_json_output() {
    let sandbox = Sandbox::empty();
    let events = sandbox.write(
        "events.jsonl",
        r#"{"content": "hello"}
{"tool_call_delta": {"index": 0, "id": "toolu_1", "name": "missing"}}
"#,
    );

    let output = sandbox
        .conduit()
        .arg("--json")
        .arg("replay")
        .arg(&events)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], serde_json::json!({"text": "hello"}));
    assert_eq!(lines[1]["tool_result"]["call_id"], "toolu_1");
    assert_eq!(lines[1]["tool_result"]["kind"], "invocation_failed");
}

#[test]
fn test_replay_embedded_json_flag() {
    let sandbox = Sandbox::empty();
    let events = sandbox.write(
        "events.jsonl",
        r#"{"content": "Checking {\"tool\": \"lookup\", \"q\": \"x\"} now"}
"#,
    );

    sandbox
        .conduit()
        .args(["replay", "--embedded-json"])
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("Checking "))
        .stdout(predicate::str::contains("[lookup call_"))
        .stdout(predicate::str::contains("Error: Tool 'lookup' is not available."))
        .stdout(predicate::str::contains(" now"))
        .stdout(predicate::str::contains("\"tool\"").not());
}

#[test]
fn test_replay_invalid_event() {
    let sandbox = Sandbox::empty();
    let events = sandbox.write("events.jsonl", "{\"content\": \"ok\"}\n{\"bogus\": 1}\n");

    sandbox
        .conduit()
        .arg("replay")
        .arg(&events)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}
