use crate::cli_test_support::*;
use crate::run_cli_from_args;

fn run(args: &[&str]) -> i32 {
    let mut argv = vec!["qs"];
    argv.extend_from_slice(args);
    run_cli_from_args(argv)
}

const MAIN: &str = "main:
  script:
  - define who world
  - narrate \"hello <who>\"
  - wait 100ms
  - run helper
  on complete:
  - narrate done
";

const HELPER: &str = "helper:
  speed: 1t
  script:
  - narrate helping
  - narrate helped
";

#[test]
fn run_ticks_a_scripts_dir_until_idle() {
    let root = scripts_dir("run-ok", &[("main.qs", MAIN), ("lib/helper.qs", HELPER)]);
    let dir = root.to_string_lossy().to_string();
    assert_eq!(run(&["run", "--scripts-dir", &dir]), 0);
    assert_eq!(run(&["run", "--scripts-dir", &dir, "--dump-queues", "--seed", "3"]), 0);
    assert_eq!(
        run(&["run", "--scripts-dir", &dir, "--entry-script", "helper", "--tick-ms", "10"]),
        0
    );
}

#[test]
fn run_reports_missing_inputs_as_errors() {
    let missing = temp_path("missing").to_string_lossy().to_string();
    assert_eq!(run(&["run", "--scripts-dir", &missing]), 1);

    let root = scripts_dir("no-main", &[("lib/helper.qs", HELPER)]);
    let dir = root.to_string_lossy().to_string();
    assert_eq!(run(&["run", "--scripts-dir", &dir]), 1);
    assert_eq!(run(&["run", "--scripts-dir", &dir, "--entry-script", "nope"]), 1);
    assert_eq!(run(&["run", "--scripts-dir", &dir, "--entry-script", "helper"]), 0);
}

#[test]
fn run_fails_when_queues_outlive_max_ticks() {
    let root = scripts_dir(
        "slow",
        &[("main.qs", "main:\n  script:\n  - wait 10s\n  - narrate late\n")],
    );
    let dir = root.to_string_lossy().to_string();
    assert_eq!(run(&["run", "--scripts-dir", &dir, "--max-ticks", "3"]), 1);
    assert_eq!(run(&["run", "--scripts-dir", &dir, "--tick-ms", "5000"]), 0);
}

#[test]
fn run_strict_refuses_broken_scripts() {
    let root = scripts_dir(
        "strict",
        &[
            ("main.qs", "main:\n  script:\n  - narrate fine\n"),
            ("broken.qs", "broken:\n  script:\n  - explode now\n"),
        ],
    );
    let dir = root.to_string_lossy().to_string();
    assert_eq!(run(&["run", "--scripts-dir", &dir]), 0);
    assert_eq!(run(&["run", "--scripts-dir", &dir, "--strict"]), 1);
}

#[test]
fn check_reports_diagnostics() {
    let good = scripts_dir("check-good", &[("main.qs", MAIN), ("helper.qs", HELPER)]);
    assert_eq!(
        run(&["check", "--scripts-dir", good.to_string_lossy().as_ref()]),
        0
    );

    let bad = scripts_dir(
        "check-bad",
        &[("main.qs", "main:\n  script:\n  - explode now\n")],
    );
    assert_eq!(
        run(&["check", "--scripts-dir", bad.to_string_lossy().as_ref()]),
        1
    );
}

#[test]
fn invalid_arguments_use_clap_exit_code() {
    assert_eq!(run(&["launch"]), 2);
    assert_eq!(run(&["run"]), 2);
    assert_eq!(run(&["run", "--scripts-dir", "x", "--max-ticks", "many"]), 2);
}
