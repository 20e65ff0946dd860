//! Named stack outputs read by downstream tooling once provisioning is done.

use crate::cluster::ClusterHandle;
use crate::error::Result;
use crate::registry::RepositoryHandle;
use crate::stack::Stack;
use crate::template::{Expr, Output};

pub const REPOSITORY_URI: &str = "RepositoryUri";
pub const CLUSTER_NAME: &str = "ClusterName";
pub const KUBECTL_ROLE_ARN: &str = "KubectlRoleArn";

/// Every output name the stack declares, in declaration order.
pub const DECLARED_OUTPUTS: [&str; 3] = [REPOSITORY_URI, CLUSTER_NAME, KUBECTL_ROLE_ARN];

#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub name: &'static str,
    pub value: Expr,
    pub description: &'static str,
}

pub fn bindings(repository: &RepositoryHandle, cluster: &ClusterHandle) -> Vec<OutputBinding> {
    vec![
        OutputBinding {
            name: REPOSITORY_URI,
            value: repository.repository_uri.clone(),
            description: "ECR Repository URI for the Spring Boot application",
        },
        OutputBinding {
            name: CLUSTER_NAME,
            value: cluster.cluster_name.clone(),
            description: "EKS Cluster Name",
        },
        OutputBinding {
            name: KUBECTL_ROLE_ARN,
            value: cluster.admin_role_arn.clone(),
            description: "IAM Role ARN for kubectl access",
        },
    ]
}

pub fn declare(stack: &mut Stack, bindings: Vec<OutputBinding>) -> Result<()> {
    for binding in bindings {
        stack.add_output(
            binding.name,
            Output {
                value: binding.value,
                description: Some(binding.description.to_string()),
            },
        )?;
    }
    Ok(())
}
