//! Integration tests for the command-line clients.
//!
//! These tests cover the paths that never reach the daemon, so they run
//! without a CDEmu daemon or a desktop session.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the cdemu binary
fn cdemu() -> Command {
    let mut cmd = Command::cargo_bin("cdemu").unwrap();
    // Nothing may be listening here; keeps connection attempts deterministic.
    cmd.env("DBUS_SESSION_BUS_ADDRESS", "unix:path=/nonexistent/cdemu-test/bus");
    cmd
}

fn gcdemu() -> Command {
    Command::cargo_bin("gcdemu").unwrap()
}

#[test]
fn test_help_command() {
    cdemu()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "Usage: cdemu [options] <command> <command parameters>",
        ))
        .stdout(predicate::str::contains("  load                      loads the device"))
        .stdout(predicate::str::contains("device-mapping"))
        .stdout(predicate::str::contains("-b, --bus"));
}

#[test]
fn test_version_command() {
    cdemu()
        .arg("-v")
        .assert()
        .success()
        .stdout(format!("cdemu {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_arguments_fails_with_usage() {
    cdemu()
        .assert()
        .failure()
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_command_help_does_not_connect() {
    cdemu()
        .args(["-h", "status"])
        .assert()
        .success()
        .stdout("Usage: cdemu status\n");

    cdemu()
        .args(["--help", "load"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: cdemu load <device> <image file>"));
}

#[test]
fn test_unknown_command() {
    cdemu()
        .args(["mount", "0"])
        .assert()
        .failure()
        .stdout(predicate::str::starts_with("ERROR: Unknown command: mount\n"));
}

#[test]
fn test_unknown_option() {
    cdemu()
        .arg("--frobnicate")
        .assert()
        .failure()
        .stdout(predicate::str::starts_with("ERROR: Unknown option\n"));
}

#[test]
fn test_wrong_parameter_count() {
    cdemu()
        .arg("unload")
        .assert()
        .failure()
        .stdout(
            "ERROR: Invalid number of parameters for command 'unload'!\nUsage: cdemu unload <device>\n",
        );
}

#[test]
fn test_invalid_device_number() {
    cdemu()
        .args(["tr-emulation", "first", "1"])
        .assert()
        .failure()
        .stdout("ERROR: Invalid device number 'first'!\n");
}

#[test]
fn test_invalid_mask_value() {
    cdemu()
        .args(["daemon-debug-mask", "0", "0xZZ"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("0xZZ"));
}

#[test]
fn test_unreachable_bus_reports_failure() {
    cdemu()
        .args(["--bus", "session", "status"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "ERROR: Failed to connect to daemon (bus: 'session')!",
        ));
}

#[test]
fn test_gcdemu_help() {
    gcdemu()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("properties"))
        .stdout(predicate::str::contains("--bus"));
}

#[test]
fn test_gcdemu_unknown_bus_is_not_fatal() {
    let home = tempfile::TempDir::new().unwrap();
    gcdemu()
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("DBUS_SESSION_BUS_ADDRESS", "unix:path=/nonexistent/cdemu-test/bus")
        .env_remove("RUST_LOG")
        .args(["--bus", "tram", "properties", "0"])
        .assert()
        .stderr(predicate::str::contains(
            "Invalid bus parameter 'tram', using default!",
        ))
        .stderr(predicate::str::contains("invalid value").not());
}
