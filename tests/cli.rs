use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn alcf_infra() -> Command {
    let mut command = Command::cargo_bin("alcf-infra").unwrap();
    command
        .env_remove("CDK_DEFAULT_ACCOUNT")
        .env_remove("CDK_DEFAULT_REGION")
        .env_remove("RUST_LOG");
    command
}

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configurations")
}

#[test]
fn config_prints_suffixed_name_and_tags() {
    alcf_infra()
        .arg("--config-dir")
        .arg(config_dir())
        .args(["config", "--environment", "Dev", "--suffix", "pr1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stack_name: AlcfCeilometerDev-pr1"))
        .stdout(predicate::str::contains("Environment: Dev"))
        .stdout(predicate::str::contains("Project: alcf_ceilometer"));
}

#[test]
fn config_ignores_suffix_when_multiple_not_allowed() {
    alcf_infra()
        .arg("--config-dir")
        .arg(config_dir())
        .args(["config", "--environment", "Prod", "--suffix", "pr1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stack_name: AlcfCeilometerProd\n"));
}

#[test]
fn missing_configuration_fails_with_path() {
    let dir = tempdir().unwrap();

    alcf_infra()
        .arg("--config-dir")
        .arg(dir.path())
        .args(["config", "--environment", "Dev"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("AlcfCeilometerStack.yaml not found"));
}

#[test]
fn synth_app_writes_manifest() {
    let out = tempdir().unwrap();

    alcf_infra()
        .arg("--config-dir")
        .arg(config_dir())
        .args([
            "synth-app",
            "--environment",
            "PreProd",
            "--account-id",
            "123456789012",
            "--region",
            "us-west-2",
            "--out",
        ])
        .arg(out.path())
        .assert()
        .success();

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out.path().join("AlcfCeilometerPreProd.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["id"], "AlcfCeilometerPreProd");
    assert_eq!(manifest["tags"]["Environment"], "PreProd");
    assert_eq!(manifest["env"]["account"], "123456789012");
}

#[test]
fn synth_pipeline_writes_one_manifest_per_environment() {
    let out = tempdir().unwrap();

    alcf_infra()
        .arg("--config-dir")
        .arg(config_dir())
        .args([
            "synth-pipeline",
            "--supported-environments",
            "Dev,Prod",
            "--account-id",
            "123456789012",
            "--region",
            "us-west-2",
            "--out",
        ])
        .arg(out.path())
        .assert()
        .success();

    assert!(out.path().join("AlcfCeilometerPipelineDev.json").exists());

    let prod: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out.path().join("AlcfCeilometerPipelineProd.json")).unwrap(),
    )
    .unwrap();
    let pipeline = &prod["pipeline"];
    assert_eq!(pipeline["stages"].as_array().unwrap().len(), 2);
    assert_eq!(
        pipeline["stages"][1]["pre"][0]["name"],
        "ApprovalBeforeDeployingProduction"
    );
    // Prod appends us-east-1 to the common target regions
    assert_eq!(
        pipeline["cross_region_replication_buckets"]
            .as_object()
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn outputs_requires_an_environment() {
    alcf_infra()
        .arg("--config-dir")
        .arg(config_dir())
        .args(["outputs", "--region", "us-west-2"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--environment"));
}

#[test]
fn outputs_without_any_region_fails_before_calling_aws() {
    let home = tempdir().unwrap();

    alcf_infra()
        .env_remove("AWS_REGION")
        .env_remove("AWS_DEFAULT_REGION")
        .env_remove("AWS_PROFILE")
        .env("AWS_CONFIG_FILE", home.path().join("config"))
        .env("AWS_SHARED_CREDENTIALS_FILE", home.path().join("credentials"))
        .env("AWS_EC2_METADATA_DISABLED", "true")
        .arg("--config-dir")
        .arg(config_dir())
        .args(["outputs", "--environment", "Dev"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no region given"));
}

#[test]
fn outputs_with_missing_configuration_names_the_file() {
    let dir = tempdir().unwrap();

    alcf_infra()
        .arg("--config-dir")
        .arg(dir.path())
        .args(["outputs", "--environment", "Dev", "--region", "us-west-2"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("AlcfCeilometerStack.yaml not found"));
}
