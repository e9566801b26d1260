//! CLI tests for answering a request from a prerecording.
//!
//! Spawns the binary with a scratch config and prerecording, and verifies the
//! printed body and exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use hallucinate::core::response::RECORD_SEPARATOR;
use hallucinate::exit_codes;

const CONFIG: &str = r#"
[loop]
max_turns = 5

[[models]]
name = "Product"
table = "products"
fields = [
    { name = "id", type = "integer", primary_key = true },
    { name = "name", type = "text" },
    { name = "price", type = "integer" },
]
rows = [
    { name = "Widget", price = 10 },
    { name = "Gadget", price = 25 },
]
"#;

fn write_recording(dir: &Path, responses: &[&str]) -> std::path::PathBuf {
    let mut contents = String::from("You answer requests.");
    for response in responses {
        contents.push_str(RECORD_SEPARATOR);
        contents.push_str(response);
    }
    let path = dir.join("recording.txt");
    fs::write(&path, contents).expect("write recording");
    path
}

fn hallucinate(dir: &Path, recording: &Path, method: &str, path: &str) -> Output {
    fs::write(dir.join("hallucinate.toml"), CONFIG).expect("write config");
    Command::new(env!("CARGO_BIN_EXE_hallucinate"))
        .current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .arg("--prerecording")
        .arg(recording)
        .arg(method)
        .arg(path)
        .output()
        .expect("run hallucinate")
}

#[test]
fn prints_response_body_from_prerecording() {
    let temp = tempfile::tempdir().expect("tempdir");
    let recording = write_recording(
        temp.path(),
        &[
            " List names.\n```rhai\nlet names = all(Product).map(|p| p.name);",
            " Answer.\n```rhai\nrespond(`<ul><li>${names[0]}</li><li>${names[1]}</li></ul>`);",
        ],
    );
    let output = hallucinate(temp.path(), &recording, "GET", "/products");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim_end(), "<ul><li>Widget</li><li>Gadget</li></ul>");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("200 text/html"));
}

#[test]
fn exhausted_prerecording_exits_with_exhausted_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let recording = write_recording(temp.path(), &[" Look.\n```rhai\nlet x = 1;"]);
    let output = hallucinate(temp.path(), &recording, "GET", "/");

    assert_eq!(output.status.code(), Some(exit_codes::EXHAUSTED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("prerecording exhausted"));
}

#[test]
fn malformed_response_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let recording = write_recording(temp.path(), &["no code block at all"]);
    let output = hallucinate(temp.path(), &recording, "POST", "/orders");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown format"));
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let recording = write_recording(temp.path(), &[" Answer.\n```rhai\nrespond(1);"]);
    fs::write(temp.path().join("custom.toml"), "[agent]\nmax_tokens = 0\n").expect("write");
    let output = Command::new(env!("CARGO_BIN_EXE_hallucinate"))
        .current_dir(temp.path())
        .env_remove("OPENAI_API_KEY")
        .args(["--config", "custom.toml", "--prerecording"])
        .arg(&recording)
        .args(["GET", "/"])
        .output()
        .expect("run hallucinate");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_tokens"));
}
