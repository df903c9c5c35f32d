#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const RELAY_VARS: &[&str] = &[
    "RELAY_CONFIG",
    "RELAY_WEBHOOK_SECRET",
    "RELAY_API_TOKEN",
    "RELAY_API_URL",
    "RELAY_REPOS_DIR",
    "RELAY_STATE_DIR",
    "RELAY_ENV",
    "RELAY_MENTION",
    "RELAY_PORT",
];

/// `relay` with a clean environment and its state under `dir`.
fn relay(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    for var in RELAY_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(dir.path())
        .env("RELAY_STATE_DIR", dir.path())
        .env("RELAY_REPOS_DIR", dir.path());
    cmd
}

fn seed_sessions(dir: &TempDir) {
    std::fs::write(
        dir.path().join("resume-sessions.json"),
        r#"{"sess-1": "conv-a", "sess-2": "conv-b"}"#,
    )
    .unwrap();
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("config"));
}

// ---------------------------------------------------------------------------
// relay config
// ---------------------------------------------------------------------------

#[test]
fn config_check_fails_without_secrets() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] webhook secret is not set"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_check_passes_with_env_settings() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("relay.yaml");
    std::fs::write(&config, "agent:\n  executable: sh\n").unwrap();

    relay(&dir)
        .env("RELAY_CONFIG", &config)
        .env("RELAY_WEBHOOK_SECRET", "s3cret")
        .env("RELAY_API_TOKEN", "lin_api_x")
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_check_warns_about_missing_executable() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("relay.yaml");
    std::fs::write(&config, "agent:\n  executable: no-such-agent-binary-xyz\n").unwrap();

    let output = relay(&dir)
        .env("RELAY_CONFIG", &config)
        .env("RELAY_WEBHOOK_SECRET", "s3cret")
        .env("RELAY_API_TOKEN", "lin_api_x")
        .args(["config", "check", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["level"], "warning");
    assert!(warnings[0]["message"]
        .as_str()
        .unwrap()
        .contains("no-such-agent-binary-xyz"));
}

#[test]
fn config_show_redacts_secrets() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .env("RELAY_WEBHOOK_SECRET", "very-secret-value")
        .env("RELAY_MENTION", "@bot")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("webhook_secret:  <set>"))
        .stdout(predicate::str::contains("api_token:       <unset>"))
        .stdout(predicate::str::contains("mention_token:   @bot"))
        .stdout(predicate::str::contains("very-secret-value").not());
}

#[test]
fn unknown_environment_is_rejected() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["--env", "staging", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .env("RELAY_CONFIG", dir.path().join("absent.yaml"))
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

// ---------------------------------------------------------------------------
// relay sessions
// ---------------------------------------------------------------------------

#[test]
fn sessions_list_empty() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No resumable sessions."));
}

#[test]
fn sessions_list_shows_entries() {
    let dir = TempDir::new().unwrap();
    seed_sessions(&dir);
    relay(&dir)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SESSION"))
        .stdout(predicate::str::contains("sess-1"))
        .stdout(predicate::str::contains("conv-b"));
}

#[test]
fn sessions_forget_removes_one_entry() {
    let dir = TempDir::new().unwrap();
    seed_sessions(&dir);

    relay(&dir)
        .args(["sessions", "forget", "sess-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Forgot session sess-1."));

    let output = relay(&dir)
        .args(["sessions", "list", "--json"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{ "session_id": "sess-2", "conversation_id": "conv-b" }])
    );

    relay(&dir)
        .args(["sessions", "forget", "sess-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No entry for session sess-1."));
}

#[test]
fn sessions_clear_empties_the_file() {
    let dir = TempDir::new().unwrap();
    seed_sessions(&dir);
    relay(&dir)
        .args(["sessions", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 session(s)."));

    let data = std::fs::read_to_string(dir.path().join("resume-sessions.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(value, serde_json::json!({}));
}

// ---------------------------------------------------------------------------
// relay serve
// ---------------------------------------------------------------------------

#[test]
fn serve_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["serve", "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to start"));
}
