//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("i2cisp");
    cmd.env_remove("I2CISP_DEVICE")
        .env_remove("I2CISP_ADDRESS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("i2cisp"))
        .stdout(predicate::str::contains("flash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("i2cisp"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_bash_exits_zero() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("i2cisp"));
}

#[test]
fn info_shows_chunk_layout() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("fw.bin");
    fs::write(&image, vec![0x5Au8; 5000]).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("info")
        .arg(&image)
        .assert()
        .success()
        .stderr(predicate::str::contains("5000 bytes"))
        .stderr(predicate::str::contains("0x00001000"));
}

#[test]
fn info_json_is_valid_json_on_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("fw.bin");
    fs::write(&image, vec![0x5Au8; 5000]).expect("write image");

    let mut cmd = cli_cmd();
    let output = cmd
        .current_dir(dir.path())
        .args(["info", "--json"])
        .arg(&image)
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["size"], 5000);
    assert_eq!(parsed["data"]["chunk_count"], 2);
    assert_eq!(parsed["data"]["chunks"][1]["len"], 904);
    assert_eq!(parsed["data"]["chunks"][1]["address"]["offset"], 16);
}

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("not_exists.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("info")
        .arg("--json")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn dry_run_flash_succeeds() {
    let dir = tempdir().expect("tempdir should be created");
    let driver = dir.path().join("driver.bin");
    let firmware = dir.path().join("firmware.bin");
    fs::write(&driver, vec![0x11u8; 700]).expect("write driver");
    fs::write(&firmware, vec![0x22u8; 9000]).expect("write firmware");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--dry-run")
        .arg("flash")
        .arg(&driver)
        .arg(&firmware)
        .assert()
        .success()
        .stderr(predicate::str::contains("Flashed"));
}

#[test]
fn dry_run_write_logs_transactions() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("fw.bin");
    let log = dir.path().join("bus.csv");
    fs::write(&image, vec![0x33u8; 5000]).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--dry-run")
        .arg("--log-transactions")
        .arg(&log)
        .arg("write")
        .arg(&image)
        .assert()
        .success();

    let text = fs::read_to_string(&log).expect("log written");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "W/R,I2C_Msg");
    // priming, chunk, status read; twice
    assert_eq!(lines.len(), 1 + 2 * 3);
    assert_eq!(lines[1], "W,51 85 C2 00 00 03 10 E3");
    assert!(lines[5].starts_with("W,00 00 10 00 00 00 03 88"));
}

#[test]
fn dry_run_command_reset_succeeds() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--dry-run", "command", "reset"])
        .assert()
        .success()
        .stderr(predicate::str::contains("hard reset"));
}

#[test]
fn flash_missing_image_fails() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir.path().join("firmware.bin");
    fs::write(&firmware, vec![0x22u8; 10]).expect("write firmware");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--dry-run")
        .arg("flash")
        .arg(dir.path().join("missing.bin"))
        .arg(&firmware)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing.bin"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_missing_required_arg() {
    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("DRIVER"));
}

#[test]
fn exit_code_two_for_completions_without_shell() {
    let mut cmd = cli_cmd();
    cmd.arg("completions")
        .env("SHELL", "/bin/bash")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exit_code_two_for_invalid_address() {
    let mut cmd = cli_cmd();
    cmd.args(["--address", "0x99", "--dry-run", "command", "reset"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_bad_chunk_size() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("fw.bin");
    fs::write(&image, vec![0x33u8; 100]).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--dry-run", "write", "--chunk-size", "5000"])
        .arg(&image)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("chunk size"));
}

#[test]
fn exit_code_two_for_broken_explicit_config() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir.path().join("custom.toml");
    fs::write(&config, "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--dry-run", "command", "reset"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn broken_local_config_only_warns() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("i2cisp.toml"), "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--dry-run", "command", "reset"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn quiet_mode_suppresses_status_lines() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--dry-run", "-q", "command", "irom"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}
