use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn run_wt(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wt"))
        .env_remove("WORKTRAIL_ROOT")
        .env("WORKTRAIL_LOG", "off")
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("wt command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "expected failure but command succeeded.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn parse_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn work_and_artifact_commands_round_trip_through_json() {
    let root = unique_workspace("worktrail-cli-dispatch");

    let created = run_wt(
        &root,
        &["--json", "work", "new", "Fix login bug", "-s", "now", "-t", "auth"],
    );
    assert_success(&created);
    let work = parse_json(&created);
    let work_id = work["id"].as_str().expect("id should be a string").to_string();
    assert_eq!(work["schedule"], "now");

    let plan = run_wt(
        &root,
        &["--json", "artifact", "new", "plan", "Rework sessions", "--work", &work_id],
    );
    assert_success(&plan);
    let plan = parse_json(&plan);
    assert_eq!(plan["work_refs"][0], work_id.as_str());

    let listed = run_wt(&root, &["--json", "work", "ls"]);
    assert_success(&listed);
    assert_eq!(parse_json(&listed).as_array().map(Vec::len), Some(1));

    let done = run_wt(&root, &["--json", "work", "done", &work_id]);
    assert_success(&done);
    assert_eq!(parse_json(&done)["schedule"], "closed");

    let update = run_wt(&root, &["update", "add", &work_id, "Wrapped up", "--progress", "100"]);
    assert_success(&update);

    let missing = run_wt(&root, &["work", "start", "work-nope"]);
    assert_failure(&missing);
    assert!(String::from_utf8_lossy(&missing.stderr).contains("not found"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let root = unique_workspace("worktrail-cli-config");

    assert_success(&run_wt(&root, &["config", "init"]));
    assert!(root.join("worktrail.toml").exists());
    assert_failure(&run_wt(&root, &["config", "init"]));
    assert_success(&run_wt(&root, &["config", "init", "--force"]));

    let shown = run_wt(&root, &["--json", "config", "show"]);
    assert_success(&shown);
    assert_eq!(parse_json(&shown)["hooks"]["max_concurrency"], 4);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn decay_and_cleanup_run_on_an_empty_root() {
    let root = unique_workspace("worktrail-cli-decay");

    let decay = run_wt(&root, &["--json", "decay"]);
    assert_success(&decay);
    assert_eq!(parse_json(&decay)["summary"]["health_score"], 1.0);

    let cleanup = run_wt(&root, &["--json", "cleanup"]);
    assert_success(&cleanup);
    assert_eq!(parse_json(&cleanup)["attempted"], 0);

    let _ = std::fs::remove_dir_all(root);
}
