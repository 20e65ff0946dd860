//! Stack configuration.
//!
//! Every section defaults to the literal values the stack has always been
//! deployed with, so a TOML file only needs the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::addon::ObservabilitySettings;
use crate::cluster::ClusterDescriptor;
use crate::error::{Result, SynthError};
use crate::network::NetworkDescriptor;
use crate::registry::RegistryDescriptor;
use crate::workload::WorkloadSettings;

pub const DEFAULT_STACK_ID: &str = "SpringBootEksStack";
pub const DEFAULT_DESCRIPTION: &str =
    "Spring Boot 3 MVC application with AWS Corretto 21 and Datadog agent on EKS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StackSection {
    pub id: String,
    pub description: String,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            id: DEFAULT_STACK_ID.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub stack: StackSection,
    pub network: NetworkDescriptor,
    pub registry: RegistryDescriptor,
    pub cluster: ClusterDescriptor,
    pub observability: ObservabilitySettings,
    pub workload: WorkloadSettings,
}

impl StackConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|error| SynthError::Config(error.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| {
            SynthError::Config(format!("failed to read {}: {error}", path.display()))
        })?;
        let config = Self::from_toml(&content).map_err(|error| match error {
            SynthError::Config(message) => {
                SynthError::Config(format!("failed to parse {}: {message}", path.display()))
            }
            other => other,
        })?;
        tracing::info!(
            component = "config",
            path = %path.display(),
            stack_id = %config.stack.id,
            "loaded stack config"
        );
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|error| SynthError::Config(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = StackConfig::from_toml("").expect("empty config should parse");
        assert_eq!(config, StackConfig::default());
        assert_eq!(config.cluster.node_count, 2);
        assert_eq!(config.network.nat_gateways, 1);
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let config = StackConfig::from_toml(
            r#"
            [cluster]
            node_count = 3

            [workload]
            replicas = 4
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.cluster.node_count, 3);
        assert_eq!(config.cluster.instance_type, "t3.medium");
        assert_eq!(config.workload.replicas, 4);
        assert_eq!(config.workload.container_port, 8080);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let error = StackConfig::from_toml("[database]\nname = \"x\"\n").expect_err("should fail");
        assert!(matches!(error, SynthError::Config(_)));
    }

    #[test]
    fn misspelled_keys_inside_sections_are_rejected() {
        for content in [
            "[cluster]\nnode_cont = 5\n",
            "[network]\nmax_az = 2\n",
            "[workload]\nreplica = 3\n",
            "[stack]\nname = \"Other\"\n",
        ] {
            let error = StackConfig::from_toml(content).expect_err("typo should fail");
            assert!(matches!(error, SynthError::Config(_)), "{content}");
        }
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let rendered = StackConfig::default().to_toml().expect("renders");
        let parsed = StackConfig::from_toml(&rendered).expect("parses");
        assert_eq!(parsed, StackConfig::default());
    }

    #[test]
    fn load_reports_missing_file_path() {
        let error = StackConfig::load("/definitely/not/here.toml").expect_err("should fail");
        assert!(error.to_string().contains("/definitely/not/here.toml"));
    }
}
