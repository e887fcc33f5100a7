//! End-to-end tests of the `apptopo` binary: exit codes, validate, and a
//! LOCAL-source sync against a mock platform.

use std::path::Path;
use std::process::{Command, Output};

use httpmock::prelude::*;
use serde_json::{json, Value};

const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 60;
const EXIT_SOURCE: i32 = 61;
const EXIT_PLATFORM: i32 = 62;

const CSV: &str = "app_name,vm_name,vm_ip\nAppA,vm1,10.0.0.1\nAppA,vm2,10.0.0.2\n,vm3,10.0.0.3\n";

fn apptopo(args: &[&str], turbo: Option<&str>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_apptopo"));
    cmd.args(args)
        .env("APPTOPO_LOG", "off")
        .env_remove("TURBO_ADDRESS")
        .env_remove("TURBO_USERNAME")
        .env_remove("TURBO_PASSWORD");
    if let Some(address) = turbo {
        cmd.env("TURBO_ADDRESS", address)
            .env("TURBO_USERNAME", "svc-apptopo")
            .env("TURBO_PASSWORD", "hunter2");
    }
    cmd.output().expect("failed to run apptopo")
}

fn write_config(dir: &Path, csv_dir: &Path) -> String {
    let config = json!({
        "INPUT_CSV_NAME": "apps.csv",
        "INPUT_CSV_DIR": csv_dir.to_str().unwrap(),
        "CSV_LOCATION": "LOCAL",
        "CSV_RETRY_INTERVAL_SECS": 0,
        "CSV_RETRY_ATTEMPTS": 1
    });
    let path = dir.join("run.json");
    std::fs::write(&path, config.to_string()).unwrap();
    path.to_str().unwrap().to_string()
}

fn mock_platform(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/api/v3/login");
        then.status(200)
            .header("set-cookie", "JSESSIONID=s3ss10n; Path=/")
            .json_body(json!({"username": "svc-apptopo"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/v3/search");
        then.status(200).json_body(json!([{"uuid": "u1"}, {"uuid": "u2"}]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/v3/supplychains");
        then.status(200).json_body(json!([{
            "seMap": {"VirtualMachine": {"instances": {
                "u1": {"uuid": "u1", "displayName": "VM1",
                       "aspects": {"virtualMachineAspect": {"ip": ["10.0.0.1"]}}},
                "u2": {"uuid": "u2", "displayName": "vm2",
                       "aspects": {"virtualMachineAspect": {"ip": ["10.0.0.2"]}}}
            }}}
        }]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/v3/topologydefinitions");
        then.status(200).json_body(json!([]));
    });
}

#[test]
fn missing_config_file_is_usage_error() {
    let out = apptopo(&["sync", "/nonexistent/run.json"], None);
    assert_eq!(out.status.code(), Some(EXIT_USAGE));
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot read config"));
}

#[test]
fn malformed_config_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(&path, "{ not json").unwrap();

    let out = apptopo(&["validate", path.to_str().unwrap()], None);
    assert_eq!(out.status.code(), Some(EXIT_CONFIG));
}

#[test]
fn unsupported_location_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(&path, r#"{"INPUT_CSV_NAME": "apps.csv", "CSV_LOCATION": "DROPBOX"}"#).unwrap();

    let out = apptopo(&["validate", path.to_str().unwrap()], Some("https://turbo"));
    assert_eq!(out.status.code(), Some(EXIT_CONFIG));
}

#[test]
fn match_ip_without_ip_column_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(
        &path,
        r#"{"INPUT_CSV_NAME": "apps.csv", "CSV_LOCATION": "LOCAL", "MATCH_IP": true,
            "ENTITY_FIELD_MAP": {"entity_ip": null}}"#,
    )
    .unwrap();

    let out = apptopo(&["validate", path.to_str().unwrap()], Some("https://turbo"));
    assert_eq!(out.status.code(), Some(EXIT_CONFIG));
    assert!(String::from_utf8_lossy(&out.stderr).contains("MATCH_IP"));
}

#[test]
fn validate_accepts_local_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), dir.path());

    let out = apptopo(&["validate", &config], Some("https://turbo.example"));
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("ok: apps.csv"));
}

#[test]
fn validate_without_credentials_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), dir.path());

    let out = apptopo(&["validate", &config], None);
    assert_eq!(out.status.code(), Some(EXIT_CONFIG));
    assert!(String::from_utf8_lossy(&out.stderr).contains("TURBO_"));
}

#[test]
fn dry_run_plans_without_writing() {
    let server = MockServer::start();
    mock_platform(&server);
    let writes = server.mock(|when, then| {
        when.method(POST).path("/api/v3/topologydefinitions");
        then.status(200).json_body(json!({"uuid": "def-1"}));
    });

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("apps.csv"), CSV).unwrap();
    let config = write_config(dir.path(), dir.path());

    let out = apptopo(
        &["sync", &config, "--dry-run", "--json"],
        Some(&server.base_url()),
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    writes.assert_hits(0);

    let report: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["meta"]["dry_run"], true);
    assert_eq!(report["actions"][0]["action"], "create");
    assert_eq!(report["actions"][0]["application"], "AppA");
    assert!(report["reconcile"].is_null());
}

#[test]
fn sync_creates_definition_and_writes_report() {
    let server = MockServer::start();
    mock_platform(&server);
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v3/topologydefinitions")
            .json_body(json!({
                "displayName": "AppA",
                "entityType": "BusinessApplication",
                "entityDefinitionData": {
                    "manualConnectionData": {
                        "VirtualMachine": {"staticConnections": ["u1", "u2"]}
                    }
                }
            }));
        then.status(200).json_body(json!({"uuid": "def-1"}));
    });

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("apps.csv"), CSV).unwrap();
    let config = write_config(dir.path(), dir.path());
    let report_path = dir.path().join("last-run.json");

    let out = apptopo(
        &["sync", &config, "--output", report_path.to_str().unwrap()],
        Some(&server.base_url()),
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    create.assert();

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("create  AppA (2 member(s))"));
    assert!(stdout.contains("1 created, 0 updated"));

    let report: Value = serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["reconcile"]["created"], json!(["AppA"]));
}

#[test]
fn absent_csv_exits_with_source_code() {
    let server = MockServer::start();
    mock_platform(&server);

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), dir.path());

    let out = apptopo(&["sync", &config], Some(&server.base_url()));
    assert_eq!(out.status.code(), Some(EXIT_SOURCE));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("apps.csv not found after 1 attempt(s)"));
    assert!(stderr.contains("hint:"));
}

#[test]
fn rejected_write_exits_with_platform_code() {
    let server = MockServer::start();
    mock_platform(&server);
    let create = server.mock(|when, then| {
        when.method(POST).path("/api/v3/topologydefinitions");
        then.status(500).body("java.lang.IllegalStateException");
    });

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("apps.csv"), CSV).unwrap();
    let config = write_config(dir.path(), dir.path());

    let out = apptopo(&["sync", &config], Some(&server.base_url()));
    assert_eq!(out.status.code(), Some(EXIT_PLATFORM));
    create.assert();
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("platform server error (500)"));
    assert!(out.stdout.is_empty());
}
