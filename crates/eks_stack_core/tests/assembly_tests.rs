use std::fs;

use eks_stack_core::assembly::{ASSEMBLY_SCHEMA_VERSION, MANIFEST_FILE, WORKLOAD_FILE};
use eks_stack_core::{CloudAssembly, SpringBootEksStack, StackConfig, StackEnvironment};
use serde_json::Value;

fn write_assembly(env: StackEnvironment) -> (tempfile::TempDir, Value, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = SpringBootEksStack::from_config(env, &StackConfig::default()).expect("define");
    let files = CloudAssembly::new(dir.path()).write(&stack).expect("write assembly");

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(&files.manifest).expect("read manifest"))
            .expect("manifest json");
    let template = fs::read_to_string(&files.template).expect("read template");
    (dir, manifest, template)
}

#[test]
fn writes_template_manifest_and_workload() {
    let (dir, manifest, template) = write_assembly(StackEnvironment::new(
        Some("123456789012".to_string()),
        Some("us-east-1".to_string()),
    ));

    assert!(dir.path().join("SpringBootEksStack.template.json").is_file());
    assert!(dir.path().join(MANIFEST_FILE).is_file());
    assert_eq!(manifest["version"], ASSEMBLY_SCHEMA_VERSION);

    let artifact = &manifest["artifacts"]["SpringBootEksStack"];
    assert_eq!(artifact["type"], "aws:cloudformation:stack");
    assert_eq!(artifact["environment"], "aws://123456789012/us-east-1");
    assert_eq!(
        artifact["properties"]["templateFile"],
        "SpringBootEksStack.template.json"
    );

    let parsed: Value = serde_json::from_str(&template).expect("template json");
    assert_eq!(parsed["AWSTemplateFormatVersion"], "2010-09-09");

    let workload = fs::read_to_string(dir.path().join(WORKLOAD_FILE)).expect("read workload");
    assert!(workload.contains("kind: Deployment"));
    assert!(workload.contains("kind: Service"));
    assert!(workload.contains("kind: ConfigMap"));
    assert!(workload.contains("<RepositoryUri>:latest"));
    assert!(!workload.contains("${Token["));
}

#[test]
fn environment_only_changes_the_manifest() {
    let (_first_dir, first_manifest, first_template) = write_assembly(StackEnvironment::new(
        Some("123456789012".to_string()),
        Some("us-east-1".to_string()),
    ));
    let (_second_dir, second_manifest, second_template) = write_assembly(StackEnvironment::new(
        Some("210987654321".to_string()),
        Some("eu-west-1".to_string()),
    ));

    assert_eq!(first_template, second_template);
    assert_ne!(
        first_manifest["artifacts"]["SpringBootEksStack"]["environment"],
        second_manifest["artifacts"]["SpringBootEksStack"]["environment"]
    );
}

#[test]
fn agnostic_environment_uses_unknown_placeholders() {
    let (_dir, manifest, _template) = write_assembly(StackEnvironment::default());
    assert_eq!(
        manifest["artifacts"]["SpringBootEksStack"]["environment"],
        "aws://unknown-account/unknown-region"
    );
}
