#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::json;
use tempfile::TempDir;

fn write_bundle(dir: &Path) -> PathBuf {
    let bundle = json!({
        "type": "bundle",
        "id": "bundle--0001",
        "objects": [
            {"type": "identity", "id": "identity--0001", "name": "ACME"},
            {"type": "attack-pattern", "id": "attack-pattern--0001", "name": "Phishing",
             "created_by_ref": "identity--0001"},
            {"type": "relationship", "id": "relationship--0001", "relationship_type": "uses",
             "source_ref": "identity--0001", "target_ref": "attack-pattern--0001"}
        ]
    });
    let path = dir.join("bundle.json");
    fs::write(&path, bundle.to_string()).expect("write bundle");
    path
}

fn settings_path(dir: &Path) -> PathBuf {
    dir.join("settings").join("config.toml")
}

#[test]
fn transform_writes_statements_to_file() {
    let dir = TempDir::new().expect("tempdir");
    let bundle = write_bundle(dir.path());
    let output = dir.path().join("out.tql");

    let stdout = cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(settings_path(dir.path()))
        .args(["--theme", "plain", "transform"])
        .arg(&bundle)
        .arg("--output")
        .arg(&output)
        .args(["--batch-size", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&stdout);
    assert!(stdout.contains("objects: 3"), "{stdout}");
    assert!(stdout.contains("transformed 3 objects"), "{stdout}");

    let text = fs::read_to_string(&output).expect("read output");
    assert!(text.starts_with("# batch 1 (2 statements)\n"), "{text}");
    let identity = text.find("isa identity").expect("identity statement");
    let relation = text.find("isa uses").expect("relation statement");
    let embedded = text.find("isa created-by-ref").expect("embedded statement");
    assert!(identity < relation && relation < embedded);
}

#[test]
fn transform_streams_statements_to_stdout() {
    let dir = TempDir::new().expect("tempdir");
    let bundle = write_bundle(dir.path());

    let assert = cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(settings_path(dir.path()))
        .args(["--quiet", "transform"])
        .arg(&bundle)
        .assert()
        .success();
    let output = assert.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("insert\n$v0 isa attack-pattern"), "{stdout}");
    assert!(!stdout.contains("transformed"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("transformed 3 objects"), "{stderr}");
}

#[test]
fn missing_bundle_fails() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(settings_path(dir.path()))
        .args(["--quiet", "transform"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("error: [ParsingError]"), "{stderr}");
}

#[test]
fn check_mapping_reports_builtin_counts() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(settings_path(dir.path()))
        .args(["--theme", "plain", "check-mapping"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&output);
    assert!(stdout.contains("source: built-in"), "{stdout}");
    assert!(stdout.contains("mapping is valid"), "{stdout}");
}

#[test]
fn check_mapping_rejects_a_broken_directory() {
    let dir = TempDir::new().expect("tempdir");
    let mapping_dir = dir.path().join("mapping");
    fs::create_dir_all(&mapping_dir).expect("mapping dir");
    cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(settings_path(dir.path()))
        .arg("check-mapping")
        .arg("--mapping")
        .arg(&mapping_dir)
        .assert()
        .failure();
}

#[test]
fn config_init_then_path() {
    let dir = TempDir::new().expect("tempdir");
    let settings = settings_path(dir.path());

    cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&settings)
        .args(["--quiet", "config", "init"])
        .assert()
        .success();
    let written = fs::read_to_string(&settings).expect("settings written");
    assert!(written.contains("batch_size = 200"), "{written}");

    cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&settings)
        .args(["config", "init"])
        .assert()
        .failure();

    let output = cargo_bin_cmd!("stixgraph")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&settings)
        .args(["config", "path"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8_lossy(&output).trim(),
        settings.display().to_string()
    );
}
