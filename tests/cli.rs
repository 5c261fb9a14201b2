use std::process::Command;

fn docentity() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docentity"));
    for var in [
        "DOCENTITY_DOCUMENTS",
        "DOCUMENTCLOUD_TOKEN",
        "GOOGLE_API_KEY",
        "DOCENTITY_BYTE_LIMIT",
        "DOCENTITY_BULK_LIMIT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_pipeline_flags() {
    let output = docentity().arg("--help").output().expect("run CLI");

    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--document",
        "--documentcloud-token",
        "--google-api-key",
        "--byte-limit",
        "--bulk-limit",
    ] {
        assert!(stdout.contains(flag), "help is missing {flag}:\n{stdout}");
    }
}

#[test]
fn missing_credentials_fail_before_any_request() {
    let output = docentity()
        .args(["--document", "42"])
        .output()
        .expect("run CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--documentcloud-token"), "stderr: {stderr}");
}

#[test]
fn document_ids_must_be_numeric() {
    let output = docentity()
        .args(["--document", "abc"])
        .env("DOCUMENTCLOUD_TOKEN", "token")
        .env("GOOGLE_API_KEY", "key")
        .output()
        .expect("run CLI");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("abc"));
}
