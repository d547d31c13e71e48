//! Exit-status and message tests for the `docpipe` binary.

use std::process::{Command, Output};

fn docpipe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_docpipe"))
        .args(args)
        .env("RUST_LOG", "off")
        .env_remove("DOCPIPE_DATE")
        .output()
        .expect("run docpipe")
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn test_pdf_on_empty_directory_exits_1_naming_html() {
    let dir = tempfile::tempdir().unwrap();
    let out = docpipe(&["pdf", dir.path().to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains(".html"), "stderr: {err}");
    assert!(err.contains("PDF rendering failed"), "stderr: {err}");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_html_on_empty_directory_names_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let out = docpipe(&["html", dir.path().to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains(".md"), "stderr: {}", stderr(&out));
}

#[test]
fn test_missing_directory_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let out = docpipe(&["format", missing.to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("not found"), "stderr: {}", stderr(&out));
}

#[test]
fn test_malformed_date_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    let out = docpipe(&[
        "package",
        dir.path().to_str().unwrap(),
        "--project",
        "csaf",
        "--doc-version",
        "v2.1",
        "--stage",
        "os",
        "--date",
        "01.11.2024",
    ]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("yyyy-mm-dd"), "stderr: {}", stderr(&out));
    assert!(!dir.path().join("csaf-v2.1-os.zip").exists());
}

#[test]
fn test_package_json_report() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    let out = docpipe(&[
        "--json",
        "package",
        dir.path().to_str().unwrap(),
        "--project",
        "csaf",
        "--doc-version",
        "v2.1",
        "--stage",
        "os",
        "--date",
        "2024-11-01",
    ]);

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["stage"], "package");
    assert!(report["artifact"]
        .as_str()
        .unwrap()
        .ends_with("csaf-v2.1-os.zip"));
}

#[test]
fn test_metadata_restore_without_record_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let out = docpipe(&["metadata", "restore", dir.path().to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(!dir.path().join(".git-mtimes").exists());
}
