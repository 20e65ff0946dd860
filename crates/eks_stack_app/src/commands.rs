//! Subcommand bodies, kept free of argument parsing so tests can drive them.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use eks_stack_core::assembly::AssemblyFiles;
use eks_stack_core::workload::WorkloadManifests;
use eks_stack_core::{CloudAssembly, SpringBootEksStack, StackConfig, StackEnvironment};

use crate::adapters::outputs::{read_declared_outputs, StackOutputSource};

pub fn load_config(path: Option<&Path>) -> Result<StackConfig> {
    match path {
        Some(path) => StackConfig::load(path)
            .with_context(|| format!("failed to load stack config {}", path.display())),
        None => Ok(StackConfig::default()),
    }
}

/// Defines the stack and writes its cloud assembly into `out_dir`.
pub fn run_synth(
    out_dir: &Path,
    config_path: Option<&Path>,
    env: StackEnvironment,
) -> Result<AssemblyFiles> {
    let config = load_config(config_path)?;
    let stack = SpringBootEksStack::from_config(env, &config).context("failed to define stack")?;
    let files = CloudAssembly::new(out_dir)
        .write(&stack)
        .with_context(|| format!("failed to write cloud assembly to {}", out_dir.display()))?;

    let summary = stack.summary();
    tracing::info!(
        component = "synth",
        event = "synth_complete",
        stack_id = %stack.id(),
        resources = summary.resources,
        outputs = summary.outputs,
        "synthesized stack"
    );
    Ok(files)
}

/// Renders the workload manifests as YAML. Without `image` the repository
/// URI is not known yet, so it is shown as `<RepositoryUri>`.
pub fn run_manifests(config_path: Option<&Path>, image: Option<&str>) -> Result<String> {
    let config = load_config(config_path)?;

    if let Some(image) = image {
        let manifests = WorkloadManifests::build(&config.workload, image);
        manifests.validate().context("workload manifests are invalid")?;
        return manifests.to_yaml().context("failed to render manifests");
    }

    let stack = SpringBootEksStack::from_config(StackEnvironment::default(), &config)
        .context("failed to define stack")?;
    let manifests = stack
        .workload()
        .ok_or_else(|| anyhow!("stack {} declares no workload", stack.id()))?;
    let yaml = manifests.to_yaml().context("failed to render manifests")?;
    Ok(stack.tokens().describe(&yaml))
}

/// Reads the declared outputs of a provisioned stack as pretty JSON.
pub fn run_outputs(source: &impl StackOutputSource, stack_name: &str) -> Result<String> {
    let outputs = read_declared_outputs(source, stack_name)?;
    serde_json::to_string_pretty(&outputs).context("failed to render outputs")
}
