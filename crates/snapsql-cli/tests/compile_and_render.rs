use std::io::Write;

use assert_cmd::Command;

#[test]
fn renders_a_static_template_from_stdin() {
    let mut cmd = Command::cargo_bin("snapsql").unwrap();
    cmd.write_stdin("SELECT id FROM users\n");
    let output = cmd.assert().success().get_output().clone();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("SELECT id FROM users"));
}

#[test]
fn compile_only_emits_intermediate_json() {
    let mut cmd = Command::cargo_bin("snapsql").unwrap();
    cmd.arg("--compile-only");
    cmd.write_stdin("SELECT id FROM users\n");
    let output = cmd.assert().success().get_output().clone();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\"instructions\""));
}

#[test]
fn renders_with_schema_and_params_files() {
    let mut schema_file = tempfile::NamedTempFile::new().unwrap();
    write!(schema_file, r#"{{"active": "bool"}}"#).unwrap();
    let mut params_file = tempfile::NamedTempFile::new().unwrap();
    write!(params_file, r#"{{"active": true}}"#).unwrap();

    let mut cmd = Command::cargo_bin("snapsql").unwrap();
    cmd.arg("--schema").arg(schema_file.path());
    cmd.arg("--params").arg(params_file.path());
    cmd.write_stdin("SELECT id FROM users WHERE active = /*= active */true\n");
    let output = cmd.assert().success().get_output().clone();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("WHERE active = $1"));
}

#[test]
fn reports_compile_diagnostics_on_stderr() {
    let mut cmd = Command::cargo_bin("snapsql").unwrap();
    cmd.write_stdin("SELECT * FROM users\n");
    cmd.assert().failure();
}
