mod common;

use common::{capsule, run, write_file};

#[test]
fn enhance_without_platform_settings_names_missing_variable() {
    let result = run(capsule().args(["enhance", "--text", "hello"]));

    assert!(!result.status.success());
    assert!(
        result.stderr.contains("CAPSULE_ENDPOINT"),
        "stderr: {}",
        result.stderr
    );
}

#[test]
fn feed_requires_project_id() {
    let result = run(capsule()
        .env("CAPSULE_ENDPOINT", "https://cloud.example.io/v1")
        .arg("feed"));

    assert!(!result.status.success());
    assert!(
        result.stderr.contains("CAPSULE_PROJECT_ID"),
        "stderr: {}",
        result.stderr
    );
}

#[test]
fn config_file_with_unknown_field_is_rejected() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let config_path = temp_dir.path().join("capsule.json");
    write_file(&config_path, r#"{"endpiont": "https://cloud.example.io/v1"}"#);

    let result = run(capsule()
        .arg("--config")
        .arg(&config_path)
        .args(["function", "--body", "{}"]));

    assert!(!result.status.success());
    assert!(result.stderr.contains("unknown field"), "stderr: {}", result.stderr);
}

#[test]
fn config_file_must_use_http_urls() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let config_path = temp_dir.path().join("capsule.json");
    write_file(&config_path, r#"{"action_url": "localhost:5173/create"}"#);

    let result = run(capsule()
        .arg("--config")
        .arg(&config_path)
        .args(["function", "--body", "{}"]));

    assert!(!result.status.success());
    assert!(result.stderr.contains("action_url"), "stderr: {}", result.stderr);
}
