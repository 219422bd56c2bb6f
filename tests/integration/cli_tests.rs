//! Integration tests for the CLI binary.
//!
//! Runs `idreg` against a snapshot in a temporary directory.
//!
//! This test is registered as a [[test]] in the identity-registry-cli crate
//! so that CARGO_BIN_EXE_idreg is available.

use std::path::Path;
use std::process::{Command, Output, Stdio};

const USER1: &str = "ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG";
const USER2: &str = "ST2JHG361ZXG51QTKY2NQCVBPPRRE2KZB1HR05NNC";

/// Get a Command pointing to the `idreg` binary, isolated from the
/// caller's environment.
fn idreg_binary(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_idreg"));
    cmd.env("IDREG_HOME", home)
        .env_remove("IDREG_CALLER")
        .env_remove("IDREG_CONTRACT")
        .env_remove("IDREG_MAX_PAYLOAD");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    idreg_binary(home)
        .args(args)
        .output()
        .expect("failed to execute idreg")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn cli_responds_to_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);

    assert!(
        output.status.success(),
        "idreg --help should exit with success, stderr: {}",
        stderr(&output)
    );
    let out = stdout(&output);
    assert!(
        out.contains("idreg") || out.contains("Usage"),
        "idreg --help output should contain usage information, got: {out}"
    );
}

#[test]
fn cli_responds_to_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("idreg"));
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--nonexistent-flag"]);
    assert!(!output.status.success());
}

#[test]
fn cli_register_requires_exactly_one_payload_source() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--caller", USER1, "register"]);
    assert!(!output.status.success());

    let output = run(
        dir.path(),
        &["--caller", USER1, "register", "--data", "a", "--base64", "YQ=="],
    );
    assert!(!output.status.success());
}

#[test]
fn cli_register_requires_caller() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["register", "--data", "x"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--caller"));
}

#[test]
fn cli_full_lifecycle_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path();
    let sample = r#"{"name":"John Doe","dob":"1990-01-01"}"#;

    // Register.
    let output = run(home, &["--caller", USER1, "register", "--data", sample]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(home.join("registry.json").exists());

    // Duplicate registration.
    let output = run(home, &["--caller", USER1, "register", "--data", sample]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("error 409"), "stderr: {}", stderr(&output));

    // Anyone can read.
    let output = run(home, &["get", USER1]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), sample);

    let output = run(home, &["get", USER1, "--base64"]);
    assert_eq!(
        stdout(&output).trim(),
        "eyJuYW1lIjoiSm9obiBEb2UiLCJkb2IiOiIxOTkwLTAxLTAxIn0="
    );

    // Update via base64 ("updated").
    let output = run(home, &["--caller", USER1, "update", "--base64", "dXBkYXRlZA=="]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let output = run(home, &["get", USER1]);
    assert_eq!(stdout(&output).trim(), "updated");

    // Non-owner deactivation.
    let output = run(home, &["--caller", USER2, "deactivate", USER1]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("error 401"));

    let output = run(home, &["active", USER1]);
    assert_eq!(stdout(&output).trim(), "true");

    // Owner deactivation.
    let output = run(home, &["--caller", USER1, "deactivate", USER1]);
    assert!(output.status.success());
    let output = run(home, &["active", USER1]);
    assert_eq!(stdout(&output).trim(), "false");

    // Unknown target.
    let output = run(home, &["--caller", USER2, "deactivate", "ST3NEVER"]);
    assert!(stderr(&output).contains("error 404"));
    let output = run(home, &["get", "ST3NEVER"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("error 404"));

    // Listing and detail.
    let output = run(home, &["list"]);
    let out = stdout(&output);
    assert!(out.contains(USER1));
    assert!(out.contains("inactive"));
    assert!(out.contains("1 identities"));

    let output = run(home, &["show", USER1]);
    let out = stdout(&output);
    assert!(out.contains("Active:      false"));
    assert!(out.contains("Deactivated:"));
}

#[test]
fn cli_explicit_store_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("custom").join("ids.json");
    let store_arg = store.to_str().unwrap();

    let output = run(
        dir.path(),
        &["--store", store_arg, "--caller", USER1, "register", "--data", "x"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(store.exists());
    assert!(!dir.path().join("registry.json").exists());
}

#[test]
fn cli_contract_override_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let output = idreg_binary(dir.path())
        .env("IDREG_CONTRACT", "identity-registry")
        .args(["--contract", "identity-registry", "--caller", USER1, "register", "--data", "x"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let output = run(dir.path(), &["list"]);
    assert!(stdout(&output).contains(USER1));
}

#[test]
fn cli_concurrent_registers_have_one_winner() {
    for round in 0..5 {
        let dir = tempfile::tempdir().unwrap();

        let children: Vec<_> = (0..8)
            .map(|i| {
                idreg_binary(dir.path())
                    .args(["--caller", "ST1RACE", "register", "--data"])
                    .arg(format!("writer-{i}"))
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .expect("failed to spawn idreg")
            })
            .collect();

        let outputs: Vec<Output> = children
            .into_iter()
            .map(|child| child.wait_with_output().unwrap())
            .collect();

        let winners = outputs.iter().filter(|o| o.status.success()).count();
        assert_eq!(winners, 1, "round {round}: expected exactly one winner");
        for loser in outputs.iter().filter(|o| !o.status.success()) {
            assert!(stderr(loser).contains("error 409"), "{}", stderr(loser));
        }

        let winner = outputs.iter().find(|o| o.status.success()).unwrap();
        assert!(stdout(winner).contains("Registered identity for ST1RACE"));

        let output = run(dir.path(), &["get", "ST1RACE"]);
        assert!(output.status.success());
        assert!(stdout(&output).trim().starts_with("writer-"));

        let output = run(dir.path(), &["list"]);
        assert!(stdout(&output).contains("1 identities"));
    }
}
