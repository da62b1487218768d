use assert_cmd::Command;
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn init_creates_the_workspace_layout() {
    let workspace = temp_workspace();

    let output = run_command(&workspace.path, "http://127.0.0.1:9", &["init", "--json"]);
    assert_eq!(output["ok"], true);
    let created = output["result"]["created"]
        .as_array()
        .expect("created paths");
    assert!(!created.is_empty());

    assert!(workspace.path.join(".saldo").is_dir());
    assert!(workspace.path.join(".saldo/config.toml").is_file());

    let again = run_command(&workspace.path, "http://127.0.0.1:9", &["init", "--json"]);
    assert_eq!(again["ok"], true);
    assert_eq!(again["result"]["created"].as_array().map(Vec::len), Some(0));
}

#[test]
fn doctor_passes_on_a_fresh_workspace() {
    let workspace = temp_workspace();
    run_command(&workspace.path, "http://127.0.0.1:9", &["init", "--json"]);

    let report = run_command(&workspace.path, "http://127.0.0.1:9", &["doctor", "--json"]);
    assert_eq!(report["ok"], true);
    let checks = report["result"]["checks"].as_array().expect("checks");
    assert!(checks.iter().all(|check| check["ok"] == true));
}

#[test]
fn profile_set_and_use_round_trip() {
    let workspace = temp_workspace();
    run_command(&workspace.path, "http://127.0.0.1:9", &["init", "--json"]);

    let set = run_command(
        &workspace.path,
        "http://127.0.0.1:9",
        &[
            "profile",
            "set",
            "--name",
            "work",
            "--server",
            "https://work.example.com",
            "--auth-server",
            "https://auth.example.com",
            "--json",
        ],
    );
    assert_eq!(set["ok"], true);
    assert_eq!(set["result"]["profile"], "work");

    let used = run_command(
        &workspace.path,
        "http://127.0.0.1:9",
        &["profile", "use", "work", "--json"],
    );
    assert_eq!(used["ok"], true);

    let listed = run_command(
        &workspace.path,
        "http://127.0.0.1:9",
        &["profile", "list", "--json"],
    );
    let profiles = listed["result"].as_array().expect("profiles");
    let work = profiles
        .iter()
        .find(|profile| profile["name"] == "work")
        .expect("work profile");
    assert_eq!(work["active"], true);
    assert_eq!(work["server"], "https://work.example.com");
}

#[test]
fn auth_token_lifecycle() {
    let server = MockServer::start();
    let workspace = temp_workspace();
    run_command(&workspace.path, &server.base_url(), &["init", "--json"]);

    let check = server.mock(|when, then| {
        when.method(GET)
            .path("/check/auth")
            .header("authorization", "Bearer access-1");
        then.status(200).json_body(json!({
            "id": "u-1",
            "email": "user@example.com",
            "plan": "pro",
        }));
    });

    let stored = run_command(
        &workspace.path,
        &server.base_url(),
        &[
            "auth",
            "set-token",
            "--access",
            "access-1",
            "--refresh",
            "refresh-1",
            "--json",
        ],
    );
    assert_eq!(stored["ok"], true);

    let status = run_command(
        &workspace.path,
        &server.base_url(),
        &["auth", "status", "--json"],
    );
    assert_eq!(status["ok"], true);
    assert_eq!(status["result"]["email"], "user@example.com");
    check.assert_hits(1);

    let logout = run_command(
        &workspace.path,
        &server.base_url(),
        &["auth", "logout", "--json"],
    );
    assert_eq!(logout["ok"], true);

    // Without tokens the status probe never reaches the server.
    let mut cmd = base_command(&workspace.path, &server.base_url());
    cmd.args(["auth", "status", "--json"]);
    cmd.assert().code(3);
    check.assert_hits(1);
}

fn run_command(workspace: &Path, server_url: &str, args: &[&str]) -> Value {
    let mut cmd = base_command(workspace, server_url);
    cmd.args(args);

    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(&stdout).expect("json stdout")
}

fn base_command(workspace: &Path, server_url: &str) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("saldo");
    cmd.current_dir(workspace)
        .env_remove("RUST_LOG")
        .args(["--workspace", workspace.to_str().expect("workspace path")])
        .args(["--server", server_url]);
    cmd
}

#[derive(Debug)]
struct TestWorkspace {
    _temp: TempDir,
    path: PathBuf,
}

fn temp_workspace() -> TestWorkspace {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace_path = temp.path().join("workspace");
    fs::create_dir_all(&workspace_path).expect("create workspace dir");
    TestWorkspace {
        _temp: temp,
        path: workspace_path,
    }
}
