// CLI integration tests for record commands against a file store.
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_clientbook");
    let mut command = Command::new(exe);
    command
        .env_remove("CLIENTBOOK_URL")
        .env_remove("CLIENTBOOK_STORE");
    command
}

fn records(store: &Path, args: &[&str]) -> Output {
    let store = format!("file:{}", store.display());
    cmd()
        .args(["records", "--store", &store])
        .args(args)
        .output()
        .expect("run clientbook")
}

fn parse_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    serde_json::from_str(text.trim()).expect("valid json")
}

fn create_args<'a>(client_id: &'a str, name: &'a str) -> [&'a str; 9] {
    [
        "create",
        "--client-id",
        client_id,
        "--name",
        name,
        "--address",
        "1 Main St",
        "--bio",
        "Engineer",
    ]
}

#[test]
fn create_list_update_delete_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("records.json");

    let create = records(&store, &create_args("1", "Ann Lee"));
    assert!(create.status.success());
    let created = parse_json(&create.stdout);
    assert_eq!(created["clientId"], 1);
    assert_eq!(created["name"], "Ann Lee");
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(id.len(), 24);

    let list = records(&store, &["list", "--json"]);
    assert!(list.status.success());
    let listed = parse_json(&list.stdout);
    assert_eq!(listed.as_array().expect("array").len(), 1);

    let update = records(&store, &["update", &id, "--bio", "Manager"]);
    assert!(update.status.success());
    assert_eq!(parse_json(&update.stdout)["bio"], "Manager");

    let get = records(&store, &["get", &id]);
    assert!(get.status.success());
    assert_eq!(parse_json(&get.stdout)["bio"], "Manager");

    let delete = records(&store, &["delete", &id]);
    assert!(delete.status.success());
    assert_eq!(parse_json(&delete.stdout)["deleted"], id.as_str());

    let again = records(&store, &["delete", &id]);
    assert_eq!(again.status.code(), Some(4));
    let err = parse_json(&again.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert_eq!(err["error"]["message"], "Record not found");
}

#[test]
fn duplicate_client_id_exit_code_and_message() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("records.json");
    assert!(records(&store, &create_args("7", "Ann")).status.success());

    let duplicate = records(&store, &create_args("7", "Bo"));
    assert_eq!(duplicate.status.code(), Some(3));
    let err = parse_json(&duplicate.stderr);
    assert_eq!(err["error"]["kind"], "Validation");
    assert_eq!(
        err["error"]["detail"],
        "Client ID already exists. Please use a different Client ID."
    );

    let check = records(&store, &["check", "7"]);
    assert!(check.status.success());
    assert_eq!(parse_json(&check.stdout)["available"], false);
}

#[test]
fn invalid_fields_are_rejected_before_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("records.json");

    let invalid = records(&store, &create_args("0", "Ann L33"));
    assert_eq!(invalid.status.code(), Some(3));
    let err = parse_json(&invalid.stderr);
    assert_eq!(
        err["error"]["fields"]["clientId"],
        "Client ID must be a number between 1 and 10000"
    );
    assert_eq!(
        err["error"]["fields"]["name"],
        "Name can only contain alphabets and spaces"
    );

    let list = records(&store, &["list", "--json"]);
    assert_eq!(parse_json(&list.stdout), Value::Array(Vec::new()));
}

#[test]
fn usage_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("records.json");
    let update = records(&store, &["update", "abc"]);
    assert_eq!(update.status.code(), Some(2));

    let bad_store = cmd()
        .args(["records", "--store", "mongodb://localhost/x", "list"])
        .output()
        .expect("run");
    assert_eq!(bad_store.status.code(), Some(2));
}

#[test]
fn unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    let output = cmd()
        .args([
            "records",
            "--url",
            &format!("http://127.0.0.1:{port}"),
            "--timeout-ms",
            "500",
            "list",
        ])
        .output()
        .expect("run");
    let code = output.status.code().expect("code");
    assert!(code == 9 || code == 10, "unexpected exit code {code}");
    let err = parse_json(&output.stderr);
    assert!(err["error"]["hint"].as_str().is_some());
}

#[test]
fn concurrent_creates_admit_one_holder_per_client_id() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("records.json");
    let store_arg = format!("file:{}", store.display());

    // Open once so every worker sees an existing document.
    assert!(records(&store, &["list", "--json"]).status.success());

    let workers = 8;
    let mut children = Vec::new();
    for i in 0..workers {
        let name = format!("Worker {}", char::from(b'a' + i as u8));
        let child = cmd()
            .args([
                "records",
                "--store",
                &store_arg,
                "create",
                "--client-id",
                "99",
                "--name",
                &name,
                "--address",
                "x",
                "--bio",
                "y",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn");
        children.push(child);
    }

    let mut successes = 0;
    for mut child in children {
        let status = child.wait().expect("wait");
        if status.success() {
            successes += 1;
        } else {
            assert_eq!(status.code(), Some(3));
        }
    }
    assert_eq!(successes, 1);

    let list = records(&store, &["list", "--json"]);
    assert_eq!(parse_json(&list.stdout).as_array().expect("array").len(), 1);
}

#[test]
fn version_and_completion() {
    let version = cmd().arg("version").output().expect("version");
    assert!(version.status.success());
    assert_eq!(parse_json(&version.stdout)["name"], "clientbook");

    let completion = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(completion.status.success());
    assert!(String::from_utf8_lossy(&completion.stdout).contains("clientbook"));
}
