//! CLI surface smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_version_flag() {
    Command::cargo_bin("agentfox")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("agentfox"));
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("agentfox")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("uninstall"));
}

#[test]
fn test_unknown_subcommand_exits_nonzero() {
    Command::cargo_bin("agentfox")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn test_setup_rejects_relative_relay_path() {
    Command::cargo_bin("agentfox")
        .unwrap()
        .args(["setup", "--relay-path", "relative/agentfox-relay"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absolute"));
}
