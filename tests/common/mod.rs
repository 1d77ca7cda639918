//! Shared test infrastructure for driving the `capsule` binary.
#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Variables the binary reads; cleared so the host environment cannot leak in.
const CAPSULE_ENV: &[&str] = &[
    "HF_TOKEN",
    "CAPSULE_ENDPOINT",
    "CAPSULE_PROJECT_ID",
    "CAPSULE_FUNCTION_ID",
    "CAPSULE_API_KEY",
    "CAPSULE_PROVIDER_URL",
    "CAPSULE_ACTION_URL",
];

/// Captured result of one `capsule` invocation.
#[derive(Debug)]
pub struct CapsuleRun {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapsuleRun {
    pub fn stdout_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {}", self.stdout))
    }
}

/// A `capsule` command with a scrubbed environment.
pub fn capsule() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_capsule"));
    for var in CAPSULE_ENV {
        command.env_remove(var);
    }
    command.env("RUST_LOG", "off");
    command
}

pub fn run(command: &mut Command) -> CapsuleRun {
    run_with_stdin(command, "")
}

pub fn run_with_stdin(command: &mut Command, stdin: &str) -> CapsuleRun {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn capsule");
    if let Some(mut pipe) = child.stdin.take() {
        pipe.write_all(stdin.as_bytes()).expect("write stdin");
    }
    let output = child.wait_with_output().expect("wait for capsule");
    CapsuleRun {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

pub fn write_file(path: &Path, contents: &str) {
    std::fs::write(path, contents.as_bytes()).expect("write file");
}
