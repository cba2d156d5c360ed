use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const JQ_RECIPE: &str = r#"
name: jq
binaries:
  urls:
    "1.6": https://example.com/jq-1.6
  env:
    JQ_VERSION: "{{ self.version }}"
  instructions: |
    {{ self.install_dependencies }}
    curl -fsSL -o /usr/local/bin/jq {{ self.binaries_url }}
    chmod +x /usr/local/bin/jq
  arguments:
    required: [version]
  dependencies:
    apt: [curl]
    yum: [curl]
"#;

const BUILD_SPEC: &str = r#"
pkg_manager: apt
instructions:
  - name: from_
    kwds:
      base_image: debian:bullseye
  - name: jq
    kwds:
      version: "1.6"
  - name: run
    kwds:
      command: echo done
"#;

fn write_fixtures(temp_dir: &TempDir) {
    let templates = temp_dir.path().join("templates");
    fs::create_dir(&templates).unwrap();
    fs::write(templates.join("jq.yaml"), JQ_RECIPE).unwrap();
    fs::write(temp_dir.path().join("build.yaml"), BUILD_SPEC).unwrap();
}

#[test]
fn test_help_command() {
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage: specforge"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("templates"));
}

#[test]
fn test_version_command() {
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("specforge"));
}

#[test]
fn test_generate_docker() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);

    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--template-dir")
        .arg(temp_dir.path().join("templates"))
        .arg("generate")
        .arg(temp_dir.path().join("build.yaml"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("FROM debian:bullseye"))
        .stdout(predicate::str::contains("ENV JQ_VERSION=\"1.6\""))
        .stdout(predicate::str::contains("https://example.com/jq-1.6"))
        .stdout(predicate::str::contains("apt-get update -qq"))
        .stdout(predicate::str::contains("RUN echo done"))
        .stdout(predicate::str::contains("{{").not());
}

#[test]
fn test_generate_pkg_manager_override() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);

    // The spec declares apt; the flag wins.
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--template-dir")
        .arg(temp_dir.path().join("templates"))
        .arg("generate")
        .arg("--pkg-manager")
        .arg("yum")
        .arg(temp_dir.path().join("build.yaml"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("yum install -y -q"))
        .stdout(predicate::str::contains("apt-get").not());
}

#[test]
fn test_generate_singularity() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);

    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--template-dir")
        .arg(temp_dir.path().join("templates"))
        .arg("generate")
        .arg("--dialect")
        .arg("singularity")
        .arg(temp_dir.path().join("build.yaml"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Bootstrap: docker"))
        .stdout(predicate::str::contains("From: debian:bullseye"))
        .stdout(predicate::str::contains("%post"))
        .stdout(predicate::str::contains("export JQ_VERSION=\"1.6\""));
}

#[test]
fn test_generate_writes_output_file() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);
    let out = temp_dir.path().join("Dockerfile");

    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--template-dir")
        .arg(temp_dir.path().join("templates"))
        .arg("generate")
        .arg("--output")
        .arg(&out)
        .arg(temp_dir.path().join("build.yaml"));

    cmd.assert().success();

    let content = fs::read_to_string(out).unwrap();
    assert!(content.starts_with("FROM debian:bullseye"));
}

#[test]
fn test_generate_unknown_template_fails() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);

    // No --template-dir, so the jq step cannot resolve.
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("generate").arg(temp_dir.path().join("build.yaml"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown template 'jq'"));
}

#[test]
fn test_generate_nonexistent_spec_fails() {
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("generate").arg("/nonexistent/build.yaml");

    cmd.assert().failure();
}

#[test]
fn test_templates_listing() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);

    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("--template-dir")
        .arg(temp_dir.path().join("templates"))
        .arg("templates");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("jq"));
}

#[test]
fn test_templates_listing_empty() {
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("templates");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No templates registered."));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("invalid-command");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_verbose_flag() {
    let temp_dir = TempDir::new().unwrap();
    write_fixtures(&temp_dir);

    let mut cmd = Command::cargo_bin("specforge").unwrap();
    cmd.arg("-v")
        .arg("--template-dir")
        .arg(temp_dir.path().join("templates"))
        .arg("generate")
        .arg(temp_dir.path().join("build.yaml"));

    cmd.assert().success();
}
