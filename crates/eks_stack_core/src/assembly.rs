//! Cloud assembly output: the directory the provisioning tool deploys from.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;

use crate::error::Result;
use crate::stack::Stack;

pub const ASSEMBLY_SCHEMA_VERSION: &str = "36.0.0";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const WORKLOAD_FILE: &str = "k8s/workload.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyFiles {
    pub template: PathBuf,
    pub manifest: PathBuf,
    pub workload: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CloudAssembly {
    out_dir: PathBuf,
}

impl CloudAssembly {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn template_file_name(stack: &Stack) -> String {
        format!("{}.template.json", stack.id())
    }

    pub fn write(&self, stack: &Stack) -> Result<AssemblyFiles> {
        fs::create_dir_all(&self.out_dir)?;

        let template_name = Self::template_file_name(stack);
        let template_path = self.out_dir.join(&template_name);
        fs::write(&template_path, stack.synth().to_json_pretty()?)?;

        let mut artifacts = serde_json::Map::new();
        artifacts.insert(
            stack.id().to_string(),
            json!({
                "type": "aws:cloudformation:stack",
                "environment": stack.props().env.target(),
                "displayName": stack.id(),
                "properties": {
                    "templateFile": template_name,
                    "description": stack.props().description,
                },
            }),
        );
        let manifest = json!({
            "version": ASSEMBLY_SCHEMA_VERSION,
            "artifacts": artifacts,
        });
        let manifest_path = self.out_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

        let workload_path = match stack.workload() {
            Some(manifests) => {
                let path = self.out_dir.join(WORKLOAD_FILE);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, stack.tokens().describe(&manifests.to_yaml()?))?;
                Some(path)
            }
            None => None,
        };

        tracing::info!(
            component = "assembly",
            out_dir = %self.out_dir.display(),
            stack_id = %stack.id(),
            template = %template_path.display(),
            "wrote cloud assembly"
        );

        Ok(AssemblyFiles {
            template: template_path,
            manifest: manifest_path,
            workload: workload_path,
        })
    }
}
