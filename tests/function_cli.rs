mod common;

use common::{capsule, run, run_with_stdin};

#[test]
fn missing_text_answers_400() {
    let result = run(capsule().args(["function", "--body", "{}"]));

    assert!(result.status.success(), "stderr: {}", result.stderr);
    let response = result.stdout_json();
    assert_eq!(response["statusCode"], 400);
    assert_eq!(response["body"]["error"], "Text parameter is required");
}

#[test]
fn empty_or_invalid_stdin_body_answers_400() {
    for body in ["", r#"{"text": ""}"#, "{not json"] {
        let result = run_with_stdin(capsule().arg("function"), body);
        assert!(result.status.success(), "stderr: {}", result.stderr);
        assert_eq!(result.stdout_json()["statusCode"], 400, "body {body:?}");
    }
}

#[test]
fn missing_credential_answers_500() {
    let result = run_with_stdin(capsule().arg("function"), r#"{"text": "we went to the lake"}"#);

    assert!(result.status.success(), "stderr: {}", result.stderr);
    let response = result.stdout_json();
    assert_eq!(response["statusCode"], 500);
    assert_eq!(
        response["body"]["error"],
        "Function error: Enhancement failed: HF_TOKEN environment variable is not set"
    );
    assert!(response["body"].get("enhancedText").is_none());
}
