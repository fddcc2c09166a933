//! Tests of the sesh binary: argument handling, output formats and exit
//! codes. Every run uses the `none` backend.

mod common;

use common::{PROJECT, TestEnv};
use predicates::prelude::*;

fn clone_widget(env: &TestEnv, branches: &[&str]) {
    let remote = env.make_remote("widget", branches);
    env.sesh()
        .args(["clone", remote.to_str().unwrap(), "--name", PROJECT])
        .assert()
        .success();
}

#[test]
fn test_version_flag() {
    TestEnv::new()
        .sesh()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sesh"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    TestEnv::new()
        .sesh()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("switch"))
        .stdout(predicate::str::contains("clean"));
}

#[test]
fn test_invalid_command() {
    TestEnv::new()
        .sesh()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_clone_outputs_json() {
    let env = TestEnv::new();
    let remote = env.make_remote("widget", &[]);
    let output = env
        .sesh()
        .args(["clone", remote.to_str().unwrap(), "--name", PROJECT])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["project"], PROJECT);
    assert_eq!(json["default_branch"], "main");
    assert!(env.worktree_path(PROJECT, "main").is_dir());
}

#[test]
fn test_clone_twice_fails() {
    let env = TestEnv::new();
    clone_widget(&env, &[]);
    let remote = env.remotes.join("widget");
    env.sesh()
        .args(["-H", "clone", remote.to_str().unwrap(), "--name", PROJECT])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: Already exists"));
}

#[test]
fn test_clone_rejects_url_without_org() {
    let env = TestEnv::new();
    env.sesh()
        .args(["clone", "https://github.com/repo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""error""#));
}

#[test]
fn test_list_human_and_json() {
    let env = TestEnv::new();
    clone_widget(&env, &[]);

    env.sesh()
        .args(["list", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("widget-main"));

    let output = env.sesh().args(["list"]).output().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // the none backend lists no sessions
    assert_eq!(json["sessions_known"], true);
    assert_eq!(json["worktrees"][0]["branch"], "main");
    assert_eq!(json["worktrees"][0]["session_exists"], false);

    env.sesh()
        .args(["list", "--projects", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains(PROJECT));
}

#[test]
fn test_list_filters() {
    let env = TestEnv::new();
    clone_widget(&env, &[]);

    env.sesh()
        .args(["list", "--plain"])
        .assert()
        .success()
        .stdout("widget-main\n");

    env.sesh()
        .current_dir(env.worktree_path(PROJECT, "main"))
        .args(["-H", "list", "--current-project"])
        .assert()
        .success()
        .stdout(predicate::str::contains("widget-main"));

    env.sesh()
        .args(["-H", "list", "--current-project"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no project contains"));

    env.sesh()
        .args(["-H", "list", "--running"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No session backend available"));

    env.sesh()
        .args(["list", "--projects", "--plain"])
        .assert()
        .failure();
}

#[test]
fn test_info_for_worktree_and_remote_branch() {
    let env = TestEnv::new();
    clone_widget(&env, &["feature"]);

    env.sesh()
        .args(["-H", "info", "widget-main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Branch:      main"))
        .stdout(predicate::str::contains("Status:      stopped"))
        .stdout(predicate::str::contains("Git status:  clean"))
        .stdout(predicate::str::contains("Last commit:"));

    let output = env
        .sesh()
        .args(["info", "feature", "-p", "widget"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["session"], "widget-feature");
    assert_eq!(json["path"], serde_json::Value::Null);
    assert!(json["last_commit"]["hash"].is_string());

    env.sesh()
        .args(["-H", "info", "other-main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_switch_with_none_backend_fails_after_creating_worktree() {
    let env = TestEnv::new();
    clone_widget(&env, &["feature"]);
    env.sesh()
        .args(["-H", "switch", "feature", "--project", "widget"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No session backend available"));
    assert!(env.worktree_path(PROJECT, "feature").is_dir());
}

#[test]
fn test_switch_outside_project_is_not_found() {
    let env = TestEnv::new();
    env.sesh()
        .args(["-H", "switch", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_delete_worktree_from_inside_project() {
    let env = TestEnv::new();
    clone_widget(&env, &["feature"]);
    let _ = env.sesh().args(["switch", "feature", "-p", PROJECT]).output();

    env.sesh()
        .current_dir(env.worktree_path(PROJECT, "main"))
        .args(["-H", "delete", "feature"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed worktree"));
    assert!(!env.worktree_path(PROJECT, "feature").exists());
}

#[test]
fn test_fetch_all_reports_counts_and_exit_code() {
    let env = TestEnv::new();
    for name in ["one", "two"] {
        let remote = env.make_remote(name, &[]);
        env.sesh()
            .args([
                "clone",
                remote.to_str().unwrap(),
                "--name",
                &format!("example.com/team/{}", name),
            ])
            .assert()
            .success();
    }

    env.sesh()
        .args(["-H", "fetch", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetched 2 project(s), 0 failed"));

    std::fs::remove_dir_all(env.remotes.join("one")).unwrap();
    let output = env.sesh().args(["fetch", "--all"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["succeeded"], 1);
    assert_eq!(json["failed"], 1);
}

#[test]
fn test_branches_streams_in_human_mode() {
    let env = TestEnv::new();
    clone_widget(&env, &["feature"]);
    env.sesh()
        .args(["-H", "branches", "-p", PROJECT])
        .assert()
        .success()
        .stdout(predicate::str::diff("feature\nmain\n"));
}

#[test]
fn test_clean_orphaned_needs_listing_backend() {
    let env = TestEnv::new();
    clone_widget(&env, &[]);
    env.sesh()
        .args(["-H", "clean", "--orphaned", "-p", PROJECT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No session backend available"));
}

#[test]
fn test_pop_without_history() {
    let env = TestEnv::new();
    env.sesh()
        .args(["-H", "pop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no previous session"));
}

#[test]
fn test_status_reports_config_sources() {
    let env = TestEnv::new();
    let output = env.sesh().arg("status").output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["backend"]["name"], "none");
    assert_eq!(json["config"]["session_backend"]["source"], "env:SESH_SESSION_BACKEND");
    assert_eq!(json["config"]["workspace_dir"]["source"], "env:SESH_WORKSPACE");
    assert_eq!(json["config"]["command_timeout"]["value"], 600);
}

#[test]
fn test_backend_flag_overrides_env() {
    let env = TestEnv::new();
    env.sesh()
        .args(["-H", "--backend", "code:open", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("code:open (cli)"));
}

#[test]
fn test_config_file_is_read() {
    let env = TestEnv::new();
    std::fs::write(
        env.config.join("config.kdl"),
        "command-timeout 30\nstartup-command \"make dev\"\n",
    )
    .unwrap();
    env.sesh()
        .args(["-H", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("command-timeout = 30s (config)"))
        .stdout(predicate::str::contains("startup-command = make dev (config)"));
}

#[test]
fn test_invalid_config_file_is_an_error() {
    let env = TestEnv::new();
    std::fs::write(env.config.join("config.kdl"), "session-backend \"emacs\"").unwrap();
    env.sesh()
        .env_remove("SESH_SESSION_BACKEND")
        .args(["-H", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
