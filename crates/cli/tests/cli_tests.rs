use assert_cmd::Command;
use predicates::prelude::*;

#[test]
#[expect(clippy::unwrap_used, reason = "test code")]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("followup").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Follow-up scheduling and execution engine"));
}

#[test]
#[expect(clippy::unwrap_used, reason = "test code")]
fn test_cli_schedule_help() {
    let mut cmd = Command::cargo_bin("followup").unwrap();
    cmd.args(["schedule", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("in-minutes"))
        .stdout(predicate::str::contains("abandonment"));
}

#[test]
#[expect(clippy::unwrap_used, reason = "test code")]
fn test_cli_cancel_requires_target() {
    let mut cmd = Command::cargo_bin("followup").unwrap();
    cmd.arg("cancel").assert().failure();
}

#[test]
#[expect(clippy::unwrap_used, reason = "test code")]
fn test_cli_stats_requires_database() {
    let mut cmd = Command::cargo_bin("followup").unwrap();
    cmd.arg("stats")
        .env_remove("DATABASE_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL must be set"));
}
