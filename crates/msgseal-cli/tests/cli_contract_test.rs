//! Exit-code and output contract of the `msgseal` binary.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

const OUTER: &str = "multipart/mixed; charset=UTF-8; boundary=outer";
const SOAP: &str = "<SOAP-ENV:Envelope><SOAP-ENV:Body><getPerson/></SOAP-ENV:Body></SOAP-ENV:Envelope>";

fn multipart(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (content_type, body) in parts {
        out.extend_from_slice(b"--outer\r\n");
        out.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"--outer--\r\n");
    out
}

fn batch_message() -> Vec<u8> {
    multipart(&[
        ("text/xml; charset=UTF-8", SOAP.as_bytes()),
        ("application/x-road-hash-chain-result", b"<hashChainResult/>"),
        ("application/x-road-hash-chain", b"<hashChain/>"),
        ("application/vnd.bdoc-signature", b"<signatures/>"),
    ])
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn msgseal() -> Command {
    let mut cmd = Command::cargo_bin("msgseal").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("MSGSEAL_CONFIG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout must be a JSON document")
}

// ============================================================================
// decode
// ============================================================================

#[test]
fn test_decode_reports_digests() {
    let dir = tempdir().unwrap();
    let wire = write_file(dir.path(), "msg.bin", &batch_message());

    let output = msgseal()
        .args(["decode", "--content-type", OUTER])
        .arg(&wire)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["status"], "ok");
    assert_eq!(report["payload_kind"], "soap");
    assert_eq!(report["batch_signature"], true);
    let names: Vec<&str> = report["digests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["message"]);
}

#[test]
fn test_decode_rejection_exits_one() {
    let dir = tempdir().unwrap();
    let wire = write_file(
        dir.path(),
        "msg.bin",
        &multipart(&[("text/xml", SOAP.as_bytes())]),
    );

    msgseal()
        .args(["decode", "--content-type", OUTER])
        .arg(&wire)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"code\": \"MissingSignaturePart\""));
}

#[test]
fn test_decode_missing_file_is_config_error() {
    let dir = tempdir().unwrap();
    msgseal()
        .args(["decode", "--content-type", OUTER])
        .arg(dir.path().join("absent.bin"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to open message"));
}

#[test]
fn test_limits_from_config_file() {
    let dir = tempdir().unwrap();
    let wire = write_file(dir.path(), "msg.bin", &batch_message());
    let config = write_file(dir.path(), "msgseal.yaml", b"limits:\n  max_parts: 2\n");

    msgseal()
        .arg("--config")
        .arg(&config)
        .args(["decode", "--content-type", OUTER])
        .arg(&wire)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("LimitExceeded"));
}

#[test]
fn test_unknown_config_key_is_config_error() {
    let dir = tempdir().unwrap();
    let wire = write_file(dir.path(), "msg.bin", &batch_message());
    let config = write_file(dir.path(), "msgseal.yaml", b"limits:\n  max_partz: 2\n");

    msgseal()
        .arg("--config")
        .arg(&config)
        .args(["decode", "--content-type", OUTER])
        .arg(&wire)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid config"));
}

// ============================================================================
// container
// ============================================================================

#[test]
fn test_pack_inspect_verify() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("archive");
    fs::create_dir(&out).unwrap();
    let wire = write_file(dir.path(), "msg.bin", &batch_message());

    let output = msgseal()
        .args(["container", "pack", "--content-type", OUTER, "--query-id", "q/1", "--kind", "response", "--out"])
        .arg(&out)
        .arg(&wire)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let packed = stdout_json(&output);
    let path = PathBuf::from(packed["path"].as_str().unwrap());
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("q%2F1-response-"), "unexpected name {}", name);
    assert!(name.ends_with(".asice"));

    let output = msgseal().args(["container", "inspect"]).arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    let summary = stdout_json(&output);
    assert_eq!(summary["batch_signature"], true);
    assert_eq!(summary["batch_timestamp"], false);
    assert!(summary["entries"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e.as_str() == Some("META-INF/hashchain.xml")));

    msgseal()
        .args(["container", "verify"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("container verify: OK"));
}

#[test]
fn test_verify_rejects_non_container() {
    let dir = tempdir().unwrap();
    let bogus = write_file(dir.path(), "bogus.asice", b"not a zip archive at all");

    msgseal()
        .args(["container", "verify"])
        .arg(&bogus)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"rejected\""));
}

#[test]
fn test_pack_requires_signature() {
    let dir = tempdir().unwrap();
    let wire = write_file(
        dir.path(),
        "fault.xml",
        b"<Envelope><Body><Fault><faultcode>Server</faultcode></Fault></Body></Envelope>",
    );

    msgseal()
        .args(["container", "pack", "--content-type", "text/xml", "--query-id", "q1", "--out"])
        .arg(dir.path())
        .arg(&wire)
        .assert()
        .code(1);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "no container may be created");
}
