use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn demo_dirs() -> Vec<PathBuf> {
    let demos_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos");
    let mut directories = fs::read_dir(&demos_root)
        .expect("demos root must exist")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    directories.sort();
    assert!(!directories.is_empty(), "expected demo script directories");
    directories
}

fn qs(args: &[&str], directory: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qs"))
        .args(args)
        .arg("--scripts-dir")
        .arg(directory)
        .output()
        .expect("cli should execute")
}

fn assert_ok(output: &Output, directory: &Path) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
        panic!(
            "demo {} failed\nstdout:\n{}\nstderr:\n{}",
            directory.display(),
            stdout,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    assert!(
        stdout.contains("RESULT:OK"),
        "stdout missing RESULT:OK for {}",
        directory.display()
    );
    stdout
}

#[test]
fn run_completes_every_demo() {
    for directory in demo_dirs() {
        let output = qs(&["run", "--seed", "11"], &directory);
        let stdout = assert_ok(&output, &directory);
        assert!(
            stdout.contains("OUTPUT:"),
            "stdout missing OUTPUT for {}",
            directory.display()
        );
        assert!(
            stdout.contains("SCRIPT_ERRORS:0"),
            "demo {} reported script errors:\n{}",
            directory.display(),
            stdout
        );
    }
}

#[test]
fn check_accepts_every_demo() {
    for directory in demo_dirs() {
        let output = qs(&["check"], &directory);
        let stdout = assert_ok(&output, &directory);
        assert!(!stdout.contains("DIAGNOSTIC:"), "{}", stdout);
    }
}

#[test]
fn dump_queues_prints_json_snapshots() {
    let directory = demo_dirs()
        .into_iter()
        .find(|path| path.ends_with("handoff"))
        .expect("handoff demo");
    let output = qs(&["run", "--dump-queues"], &directory);
    let stdout = assert_ok(&output, &directory);
    let snapshot = stdout
        .lines()
        .filter_map(|line| line.strip_prefix("QUEUES_JSON:"))
        .map(|json| serde_json::from_str::<serde_json::Value>(json).expect("valid json"))
        .find(|value| value["queues"].as_array().is_some_and(|queues| queues.len() > 1))
        .expect("a tick with several active queues");
    assert!(snapshot["queues"][0]["id"].is_string());
    assert!(snapshot["clockMs"].is_u64());
}

#[test]
fn missing_scripts_dir_prints_error_block() {
    let missing = std::env::temp_dir().join("queuescript-rs-smoke-missing-dir");
    let output = qs(&["run"], &missing);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("RESULT:ERROR"));
    assert!(stdout.contains("ERROR_CODE:CLI_SOURCE_NOT_FOUND"));
}
