use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;

use pickcam_service::ServiceConfig;

#[test]
fn write_default_config_produces_a_loadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    Command::cargo_bin("pickcam-service")
        .unwrap()
        .args(["--write-default-config", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote default configuration"));

    let raw = std::fs::read_to_string(&path).unwrap();
    let config: ServiceConfig = serde_json::from_str(&raw).unwrap();
    assert_eq!(config.stream.port, 9999);
    assert_eq!(config.command.port, 65432);
    assert_eq!(config.relay.secret, "1234");
}

#[test]
fn service_exits_cleanly_when_stdin_closes() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("pickcam-service")
        .unwrap()
        .current_dir(dir.path())
        .args([
            "--config",
            "absent.json",
            "--stream-addr",
            "127.0.0.1:0",
            "--command-addr",
            "127.0.0.1:0",
            "--no-relay",
        ])
        .write_stdin("")
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
}

#[test]
fn quit_on_stdin_stops_the_service() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("pickcam-service")
        .unwrap()
        .current_dir(dir.path())
        .args([
            "--config",
            "absent.json",
            "--stream-addr",
            "127.0.0.1:0",
            "--command-addr",
            "127.0.0.1:0",
            "--no-relay",
        ])
        .write_stdin("quit\n")
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
}

#[test]
fn help_lists_the_endpoint_overrides() {
    Command::cargo_bin("pickcam-service")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--stream-addr")
                .and(predicate::str::contains("--command-addr"))
                .and(predicate::str::contains("--no-relay")),
        );
}
