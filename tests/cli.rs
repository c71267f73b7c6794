use std::path::Path;
use std::process::{Command, Output};

fn run_bin(storage: &Path, vars: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pki-bootstrap"));
    cmd.env_clear()
        .env("CA_STORAGE_PATH", storage)
        .env("CA_ORG_NAME", "TestOrg")
        .env("CA_STATE", "Utah")
        .env("CA_KEY_SIZE", "2048")
        .env("CERT_NAME", "clickhouse");
    for (k, v) in vars {
        cmd.env(k, v);
    }
    cmd.output().unwrap()
}

#[test]
fn test_generate_ca_then_skip() {
    let dir = tempfile::tempdir().unwrap();

    let first = run_bin(dir.path(), &[("REQUEST_TYPE", "generate_ca")]);
    assert!(first.status.success());
    assert!(dir.path().join("ca").join("ca.cert.pem").exists());

    let second = run_bin(dir.path(), &[("REQUEST_TYPE", "generate_ca")]);
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("already exists"));
}

#[test]
fn test_generate_ca_with_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_bin(
        dir.path(),
        &[
            ("REQUEST_TYPE", "generate_ca"),
            ("GENERATE_CERTIFICATE", "true"),
            ("SAN_LIST", "db.internal,db"),
        ],
    );
    assert!(out.status.success());
    assert!(dir
        .path()
        .join("certificates")
        .join("server_clickhouse")
        .join("clickhouse.cert.pem")
        .exists());
}

#[test]
fn test_bad_leaf_config_exits_before_writing_root() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_bin(
        dir.path(),
        &[("REQUEST_TYPE", "generate_ca"), ("GENERATE_CERTIFICATE", "true")],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("ca").exists());
}

#[test]
fn test_server_cert_on_missing_storage_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_bin(
        &dir.path().join("absent"),
        &[("REQUEST_TYPE", "generate_server_cert"), ("SAN_LIST", "db.internal")],
    );
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_invalid_request_type_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    for request in ["generate_everything", ""] {
        let out = run_bin(dir.path(), &[("REQUEST_TYPE", request)]);
        assert_eq!(out.status.code(), Some(1), "REQUEST_TYPE={:?}", request);
    }
    assert!(!dir.path().join("ca").exists());
}

#[test]
fn test_server_cert_from_existing_ca() {
    let dir = tempfile::tempdir().unwrap();
    assert!(run_bin(dir.path(), &[("REQUEST_TYPE", "generate_ca")]).status.success());

    let out = run_bin(
        dir.path(),
        &[
            ("REQUEST_TYPE", "generate_server_cert"),
            ("CERT_TYPE", "client"),
            ("SAN_LIST", "agent.internal"),
        ],
    );
    assert!(out.status.success());
    assert!(dir
        .path()
        .join("certificates")
        .join("client_clickhouse")
        .join("clickhouse.key.pem")
        .exists());
}
