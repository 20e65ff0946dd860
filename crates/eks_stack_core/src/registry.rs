//! Container image registry (ECR repository).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, SynthError};
use crate::stack::Stack;
use crate::template::{Expr, Resource};

pub const REPOSITORY_TYPE: &str = "AWS::ECR::Repository";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
    Snapshot,
}

impl RemovalPolicy {
    pub fn as_cfn_policy(self) -> &'static str {
        match self {
            Self::Destroy => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryDescriptor {
    pub name: String,
    pub removal_policy: RemovalPolicy,
    pub scan_on_push: bool,
}

impl Default for RegistryDescriptor {
    fn default() -> Self {
        Self {
            name: "spring-boot-k8s".to_string(),
            // Images are deleted with the stack; not for production registries.
            removal_policy: RemovalPolicy::Destroy,
            scan_on_push: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryHandle {
    pub logical_id: String,
    pub repository_uri: Expr,
}

impl RegistryDescriptor {
    /// ECR names: 2-256 chars of lowercase letters, digits, `-`, `_`, `.`
    /// and `/`, starting with a letter or digit.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        let starts_ok = name
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_lowercase() || first.is_ascii_digit());
        let chars_ok = name.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.' | '/')
        });
        if !(2..=256).contains(&name.len()) || !starts_ok || !chars_ok {
            return Err(SynthError::descriptor(
                "registry",
                format!("'{name}' is not a valid repository name"),
            ));
        }
        if self.removal_policy == RemovalPolicy::Snapshot {
            return Err(SynthError::descriptor(
                "registry",
                "repositories do not support the snapshot removal policy",
            ));
        }
        Ok(())
    }
}

/// `<account>.dkr.ecr.<region>.<url suffix>/<name>`, taken apart from the
/// repository ARN so it works in environment-agnostic stacks.
pub fn repository_uri(logical_id: &str) -> Expr {
    let arn_part = |index| Expr::select(index, Expr::split(":", Expr::get_att(logical_id, "Arn")));
    Expr::join(vec![
        arn_part(4),
        Expr::literal(".dkr.ecr."),
        arn_part(3),
        Expr::literal("."),
        Expr::pseudo("URLSuffix"),
        Expr::literal("/"),
        Expr::reference(logical_id),
    ])
}

pub fn declare(stack: &mut Stack, id: &str, descriptor: &RegistryDescriptor) -> Result<RepositoryHandle> {
    descriptor.validate()?;

    let logical_id = stack.add_resource(
        &[id],
        Resource::new(
            REPOSITORY_TYPE,
            json!({
                "RepositoryName": descriptor.name,
                "ImageScanningConfiguration": { "ScanOnPush": descriptor.scan_on_push },
            }),
        )
        .with_policies(descriptor.removal_policy.as_cfn_policy()),
    )?;

    tracing::debug!(
        component = "registry",
        repository = %descriptor.name,
        logical_id = %logical_id,
        "declared repository"
    );
    stack.record_registry();

    Ok(RepositoryHandle {
        repository_uri: repository_uri(&logical_id),
        logical_id,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn default_descriptor_is_valid() {
        RegistryDescriptor::default()
            .validate()
            .expect("defaults should pass");
    }

    #[test]
    fn rejects_uppercase_names() {
        let descriptor = RegistryDescriptor {
            name: "Spring-Boot".to_string(),
            ..RegistryDescriptor::default()
        };
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn uri_is_assembled_from_arn_parts() {
        let value = repository_uri("Repo").to_value();
        let parts = value["Fn::Join"][1].as_array().expect("join parts");

        assert_eq!(parts.len(), 7);
        assert_eq!(parts[1], Value::from(".dkr.ecr."));
        assert_eq!(parts[4], json!({ "Ref": "AWS::URLSuffix" }));
        assert_eq!(parts[6], json!({ "Ref": "Repo" }));
    }
}
