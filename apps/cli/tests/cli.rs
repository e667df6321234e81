//! 命令行端到端测试（Mock 后端）

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[queue]
strict = true
max_idle_ms = 20

[servo]
write_frequency_hz = 50

[[servos]]
pins = { signal = "P9_14", power = "P9_5", ground = "P9_1" }
duty_cycle = { min = 0.044, max = 0.135 }

[[servos]]
pins = { signal = "P8_13" }
duty_cycle = { min = 0.05, max = 0.1 }

[[temperature_sensors]]
pins = { signal = "P9_40" }
"#;

fn config_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    file
}

fn cli(config: &NamedTempFile) -> Command {
    let mut cmd = Command::cargo_bin("bbplay-cli").unwrap();
    cmd.arg("--config").arg(config.path()).env("RUST_LOG", "off");
    cmd
}

#[test]
fn servo_list_prints_each_servo() {
    let config = config_file();
    cli(&config)
        .args(["servo", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""signal":"P9_14""#))
        .stdout(predicate::str::contains(r#""signal":"P8_13""#));
}

#[test]
fn servo_set_reports_committed_position() {
    let config = config_file();
    cli(&config)
        .args(["servo", "set", "1", "0.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""position":0.5"#))
        .stdout(predicate::str::contains(r#""id":1"#));
}

#[test]
fn servo_set_clamps_out_of_range() {
    let config = config_file();
    cli(&config)
        .args(["servo", "set", "0", "-3"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""position":0.0"#));
}

#[test]
fn servo_get_before_any_write_has_no_position() {
    let config = config_file();
    cli(&config)
        .args(["servo", "get", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""position":null"#));
}

#[test]
fn unknown_servo_fails() {
    let config = config_file();
    cli(&config)
        .args(["servo", "get", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("9"));
}

#[test]
fn temperature_reads_all_sensors() {
    let config = config_file();
    cli(&config)
        .arg("temperature")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""celsius""#))
        .stdout(predicate::str::contains(r#""fahrenheit""#));
}

#[test]
fn config_show_round_trips_servos() {
    let config = config_file();
    cli(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("P8_13"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let config = config_file();
    cli(&config)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn config_init_writes_loadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("hardware.toml");

    Command::cargo_bin("bbplay-cli")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();

    Command::cargo_bin("bbplay-cli")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 个舵机"));
}

#[test]
fn invalid_config_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"servos = []\n").unwrap();

    Command::cargo_bin("bbplay-cli")
        .unwrap()
        .arg("--config")
        .arg(file.path())
        .args(["servo", "list"])
        .assert()
        .failure();
}
