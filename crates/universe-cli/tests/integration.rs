#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn universe(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("universe").unwrap();
    cmd.current_dir(dir.path())
        .env("UNIVERSE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

// ---------------------------------------------------------------------------
// universe init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_and_apps() {
    let dir = TempDir::new().unwrap();
    universe(&dir).arg("init").assert().success();

    assert!(dir.path().join("universe.yaml").exists());
    assert!(dir.path().join("apps/mailomailer/definition.json").exists());
    assert!(dir.path().join("apps/taskpad/definition.json").exists());
    assert!(dir
        .path()
        .join("apps/autobooker_calendar/definition.json")
        .exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    universe(&dir).arg("init").assert().success();
    universe(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  universe.yaml"));
}

// ---------------------------------------------------------------------------
// universe apps
// ---------------------------------------------------------------------------

#[test]
fn apps_list_shows_builtin_apps_without_init() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["apps", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MailoMailer"))
        .stdout(predicate::str::contains("TaskPad"))
        .stdout(predicate::str::contains("AutoBooker Calendar"));
}

#[test]
fn apps_list_filters_by_category() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["apps", "list", "--category", "email"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MailoMailer"))
        .stdout(predicate::str::contains("TaskPad").not());
}

#[test]
fn apps_list_rejects_unknown_category() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["apps", "list", "--category", "gaming"])
        .assert()
        .failure();
}

#[test]
fn apps_show_json() {
    let dir = TempDir::new().unwrap();
    let json = stdout_json(universe(&dir).args(["--json", "apps", "show", "TaskPad"]));
    assert_eq!(json["metadata"]["name"], "TaskPad");
    assert_eq!(json["metadata"]["category"], "productivity");
    assert_eq!(json["rate_limits"]["requests_per_min"], 120);
}

#[test]
fn apps_show_unknown_fails() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["apps", "show", "SheetForge"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("app not found: SheetForge"));
}

#[test]
fn apps_are_loaded_from_disk_after_init() {
    let dir = TempDir::new().unwrap();
    universe(&dir).arg("init").assert().success();
    std::fs::remove_dir_all(dir.path().join("apps/taskpad")).unwrap();

    universe(&dir)
        .args(["apps", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MailoMailer"))
        .stdout(predicate::str::contains("TaskPad").not());
}

// ---------------------------------------------------------------------------
// universe exec
// ---------------------------------------------------------------------------

#[test]
fn exec_send_email_succeeds_without_chaos() {
    let dir = TempDir::new().unwrap();
    let json = stdout_json(universe(&dir).args([
        "--json",
        "exec",
        "MailoMailer",
        "send_email",
        "--chaos",
        "0",
        "--input",
        r#"{"to":"user@example.com","subject":"Hi","body":"Hello"}"#,
    ]));
    assert_eq!(json["success"], true);
    assert_eq!(json["result"]["status"], "success");
    assert!(json["result"]["id"].is_string());
    let latency = json["latency_ms"].as_u64().unwrap();
    assert!((50..=400).contains(&latency));
    assert!(json["error"].is_null());
}

#[test]
fn exec_schema_violation_fails() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args([
            "exec",
            "MailoMailer",
            "send_email",
            "--chaos",
            "0",
            "--input",
            r#"{"to":"user@example.com"}"#,
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error [schema_error]"));
}

#[test]
fn exec_unknown_action_fails() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["exec", "TaskPad", "fly_away"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "Action 'fly_away' not found in app 'TaskPad'",
        ));
}

#[test]
fn exec_invalid_input_json_fails() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["exec", "TaskPad", "create_task", "--input", "{nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input is not valid JSON"));
}

#[test]
fn exec_repeat_hits_burst_limit() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("universe.yaml"),
        "apps:\n  TaskPad:\n    rate_limits:\n      requests_per_min: 100\n      burst_limit: 3\n",
    )
    .unwrap();

    let json = stdout_json(universe(&dir).args([
        "--json",
        "exec",
        "TaskPad",
        "create_task",
        "--chaos",
        "0",
        "--repeat",
        "3",
        "--input",
        r#"{"title":"t"}"#,
    ]));
    let calls = json.as_array().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0]["success"], true);
    assert_eq!(calls[1]["success"], true);
    assert_eq!(calls[2]["error"]["type"], "rate_limit");
    assert!(calls[2]["error"]["retry_after"].is_u64());
}

#[test]
fn exec_honours_auth_override() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("universe.yaml"),
        "apps:\n  MailoMailer:\n    authenticated: false\n",
    )
    .unwrap();

    universe(&dir)
        .args(["exec", "MailoMailer", "list_emails", "--chaos", "0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error [auth_expired]"));
}

// ---------------------------------------------------------------------------
// universe demo
// ---------------------------------------------------------------------------

#[test]
fn demo_runs_clean_without_chaos() {
    let dir = TempDir::new().unwrap();
    let json = stdout_json(universe(&dir).args(["--json", "demo", "--chaos", "0", "--seed", "7"]));
    let steps = json["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 6);
    for step in steps {
        assert_eq!(step["envelope"]["success"], true, "{step}");
    }
    assert_eq!(steps[3]["action"], "update_task");
    assert_eq!(steps[3]["envelope"]["result"]["status"], "in_progress");
    assert_eq!(json["tasks_created"], 1);
    assert_eq!(json["webhook"]["delivered"]["received"]["event"], "booking.confirmed");
}

// ---------------------------------------------------------------------------
// universe config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_defaults_are_clean() {
    let dir = TempDir::new().unwrap();
    universe(&dir).arg("init").assert().success();
    universe(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("universe.yaml"),
        "chaos:\n  level: 5.0\n",
    )
    .unwrap();
    universe(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] chaos.level"));
}

#[test]
fn config_show_json_includes_baseline() {
    let dir = TempDir::new().unwrap();
    let json = stdout_json(universe(&dir).args(["--json", "config", "show"]));
    assert_eq!(json["version"], 1);
    assert_eq!(json["chaos"]["level"], 1.0);
    assert_eq!(json["chaos"]["profile"]["invalid_input"], 0.1);
}

#[test]
fn exec_rejects_out_of_range_chaos_flag() {
    let dir = TempDir::new().unwrap();
    universe(&dir)
        .args(["exec", "TaskPad", "list_tasks", "--chaos", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("chaos.level"));
}
