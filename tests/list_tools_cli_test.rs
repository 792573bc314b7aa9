// Integration tests for the openapi-mcp binary's one-shot modes.

use std::io::Write;
use std::process::{Command, Stdio};

const SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": { "title": "Todo", "version": "1" },
  "servers": [{ "url": "http://localhost:4010" }],
  "paths": {
    "/todos": {
      "get": { "operationId": "listTodos" },
      "post": { "operationId": "createTodo" }
    },
    "/todos/{id}": {
      "delete": {
        "parameters": [{ "name": "id", "in": "path", "required": true }]
      }
    }
  }
}"#;

fn spec_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(SPEC.as_bytes()).unwrap();
    file
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_openapi-mcp"))
        .args(args)
        .env_remove("OPENAPI_MCP_SPEC")
        .env_remove("OPENAPI_MCP_BASE_URL")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to spawn openapi-mcp")
}

#[test]
fn test_list_tools_prints_compiled_names() {
    let file = spec_file();
    let output = run(&["--spec", file.path().to_str().unwrap(), "--list-tools"]);

    assert!(
        output.status.success(),
        "--list-tools should exit successfully, got: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("listTodos (GET /todos)"));
    assert!(stdout.contains("createTodo (POST /todos)"));
    assert!(stdout.contains("deleteTodosById (DELETE /todos/{id})"));
}

#[test]
fn test_tool_filter_limits_listing() {
    let file = spec_file();
    let output = run(&[
        "--spec",
        file.path().to_str().unwrap(),
        "--tool",
        "listTodos",
        "--list-tools",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("listTodos"));
    assert!(!stdout.contains("createTodo"));
}

#[test]
fn test_unknown_tool_filter_fails() {
    let file = spec_file();
    let output = run(&[
        "--spec",
        file.path().to_str().unwrap(),
        "--tools",
        "listTodos,nope",
        "--list-tools",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope"), "stderr should name the unknown tool: {stderr}");
}

#[test]
fn test_missing_spec_file_fails() {
    let output = run(&["--spec", "/definitely/not/here.yaml", "--list-tools"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/definitely/not/here.yaml"));
}
