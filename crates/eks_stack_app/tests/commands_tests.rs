use std::collections::BTreeMap;
use std::fs;

use anyhow::Result;
use eks_stack_app::adapters::outputs::StackOutputSource;
use eks_stack_app::commands::{run_manifests, run_outputs, run_synth};
use eks_stack_core::StackEnvironment;
use serde_json::Value;

struct RecordedOutputs(BTreeMap<String, String>);

impl StackOutputSource for RecordedOutputs {
    fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>> {
        assert_eq!(stack_name, "SpringBootEksStack");
        Ok(self.0.clone())
    }
}

#[test]
fn synth_writes_assembly_into_out_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("cdk.out");

    let files = run_synth(
        &out,
        None,
        StackEnvironment::new(Some("123456789012".to_string()), Some("us-east-1".to_string())),
    )
    .expect("synth");

    assert_eq!(files.template, out.join("SpringBootEksStack.template.json"));
    assert!(files.manifest.is_file());
    assert!(files.workload.as_ref().is_some_and(|path| path.is_file()));
}

#[test]
fn synth_applies_config_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("stack.toml");
    fs::write(
        &config_path,
        "[stack]\nid = \"StagingEks\"\n\n[cluster]\nnode_count = 3\n",
    )
    .expect("write config");

    let files = run_synth(
        &dir.path().join("out"),
        Some(&config_path),
        StackEnvironment::default(),
    )
    .expect("synth");

    assert!(files.template.ends_with("StagingEks.template.json"));
    let template: Value =
        serde_json::from_str(&fs::read_to_string(&files.template).expect("read")).expect("json");
    let nodegroup = template["Resources"]
        .as_object()
        .expect("resources")
        .values()
        .find(|resource| resource["Type"] == "AWS::EKS::Nodegroup")
        .expect("nodegroup");
    assert_eq!(nodegroup["Properties"]["ScalingConfig"]["DesiredSize"], 3);
}

#[test]
fn synth_reports_bad_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("stack.toml");
    fs::write(&config_path, "[cluster]\nnode_count = 0\n").expect("write config");

    let error = run_synth(&dir.path().join("out"), Some(&config_path), StackEnvironment::default())
        .expect_err("zero nodes should be rejected");

    assert!(format!("{error:#}").contains("cluster"));
}

#[test]
fn synth_refuses_stack_ids_that_escape_the_out_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("stack.toml");
    fs::write(&config_path, "[stack]\nid = \"../escaped\"\n").expect("write config");
    let out = dir.path().join("out");

    let error = run_synth(&out, Some(&config_path), StackEnvironment::default())
        .expect_err("path-like stack id should be rejected");

    assert!(format!("{error:#}").contains("stack id '../escaped'"));
    assert!(!dir.path().join("escaped.template.json").exists());
    assert!(!out.exists());
}

#[test]
fn manifests_use_explicit_image() {
    let yaml = run_manifests(None, Some("registry.example/app:1.2.3")).expect("manifests");

    assert!(yaml.contains("registry.example/app:1.2.3"));
    let documents: Vec<serde_yaml::Value> = yaml
        .split("---\n")
        .filter(|document| !document.trim().is_empty())
        .map(|document| serde_yaml::from_str(document).expect("yaml document"))
        .collect();
    assert_eq!(documents.len(), 3);
    assert_eq!(documents[0]["kind"], "Deployment");
}

#[test]
fn manifests_without_image_show_registry_placeholder() {
    let yaml = run_manifests(None, None).expect("manifests");
    assert!(yaml.contains("<RepositoryUri>:latest"));
}

#[test]
fn outputs_render_as_json() {
    let source = RecordedOutputs(BTreeMap::from([
        ("RepositoryUri".to_string(), "uri".to_string()),
        ("ClusterName".to_string(), "spring-boot-k8s-cluster".to_string()),
        ("KubectlRoleArn".to_string(), "arn:aws:iam::123456789012:role/admin".to_string()),
    ]));

    let rendered = run_outputs(&source, "SpringBootEksStack").expect("outputs");
    let parsed: Value = serde_json::from_str(&rendered).expect("json");

    assert_eq!(parsed["ClusterName"], "spring-boot-k8s-cluster");
    assert_eq!(parsed["RepositoryUri"], "uri");
}
