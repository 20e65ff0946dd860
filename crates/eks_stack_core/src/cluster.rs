//! Managed Kubernetes cluster, its default node pool and the admin role
//! used by kubectl-backed resources.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SynthError};
use crate::network::NetworkHandle;
use crate::stack::Stack;
use crate::template::{Expr, Resource};

pub const CLUSTER_TYPE: &str = "AWS::EKS::Cluster";
pub const NODEGROUP_TYPE: &str = "AWS::EKS::Nodegroup";
pub const ROLE_TYPE: &str = "AWS::IAM::Role";

const CLUSTER_ADMIN_POLICY: &str = "cluster-access-policy/AmazonEKSClusterAdminPolicy";
const NODE_POLICIES: [&str; 3] = [
    "AmazonEKSWorkerNodePolicy",
    "AmazonEKS_CNI_Policy",
    "AmazonEC2ContainerRegistryReadOnly",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndpointAccess {
    Public,
    Private,
    PublicAndPrivate,
}

impl EndpointAccess {
    fn flags(self) -> (bool, bool) {
        match self {
            Self::Public => (true, false),
            Self::Private => (false, true),
            Self::PublicAndPrivate => (true, true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterDescriptor {
    pub name: String,
    pub version: String,
    pub node_count: u32,
    pub instance_type: String,
    pub endpoint_access: EndpointAccess,
}

impl Default for ClusterDescriptor {
    fn default() -> Self {
        Self {
            name: "spring-boot-k8s-cluster".to_string(),
            version: "1.27".to_string(),
            node_count: 2,
            instance_type: "t3.medium".to_string(),
            endpoint_access: EndpointAccess::PublicAndPrivate,
        }
    }
}

impl ClusterDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.name.len() > 100 {
            return Err(SynthError::descriptor(
                "cluster",
                "name must be 1-100 characters",
            ));
        }
        if self.node_count == 0 {
            return Err(SynthError::descriptor(
                "cluster",
                "node_count must be a positive integer",
            ));
        }
        let minor = self.version.strip_prefix("1.").unwrap_or_default();
        if minor.is_empty() || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(SynthError::descriptor(
                "cluster",
                format!("version '{}' must look like 1.<minor>", self.version),
            ));
        }
        self.instance_family()?;
        Ok(())
    }

    fn instance_family(&self) -> Result<&str> {
        let invalid = || {
            SynthError::descriptor(
                "cluster",
                format!(
                    "instance type '{}' must look like <family>.<size>",
                    self.instance_type
                ),
            )
        };
        let (family, size) = self.instance_type.split_once('.').ok_or_else(invalid)?;
        let well_formed = |part: &str| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        };
        if !well_formed(family) || !well_formed(size) {
            return Err(invalid());
        }
        Ok(family)
    }

    /// Graviton families (`t4g`, `m6g`, `c7gn`...) need the arm64 AMI.
    pub fn ami_type(&self) -> Result<&'static str> {
        let family = self.instance_family()?;
        let generation_suffix = family.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let graviton = generation_suffix
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .starts_with('g');
        Ok(if graviton { "AL2_ARM_64" } else { "AL2_x86_64" })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterHandle {
    pub logical_id: String,
    pub cluster_name: Expr,
    pub admin_role_arn: Expr,
    /// Resources that must exist before anything is applied through kubectl.
    pub ready_barrier: Vec<String>,
}

fn managed_policy(name: &str) -> Expr {
    Expr::join(vec![
        Expr::literal("arn:"),
        Expr::pseudo("Partition"),
        Expr::literal(format!(":iam::aws:policy/{name}")),
    ])
}

fn assume_role_policy(principal: Value) -> Value {
    json!({
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": principal,
        }],
        "Version": "2012-10-17",
    })
}

pub fn declare(
    stack: &mut Stack,
    id: &str,
    descriptor: &ClusterDescriptor,
    network: &NetworkHandle,
) -> Result<ClusterHandle> {
    descriptor.validate()?;
    let ami_type = descriptor.ami_type()?;

    let cluster_role = stack.add_resource(
        &[id, "Role"],
        Resource::new(
            ROLE_TYPE,
            json!({
                "AssumeRolePolicyDocument": assume_role_policy(json!({ "Service": "eks.amazonaws.com" })),
                "ManagedPolicyArns": [managed_policy("AmazonEKSClusterPolicy")],
            }),
        ),
    )?;

    let security_group = stack.add_resource(
        &[id, "ControlPlaneSecurityGroup"],
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": "EKS Control Plane Security Group",
                "VpcId": network.vpc_id,
                "SecurityGroupEgress": [{
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1",
                }],
            }),
        ),
    )?;

    let (public_access, private_access) = descriptor.endpoint_access.flags();
    let cluster = stack.add_resource(
        &[id],
        Resource::new(
            CLUSTER_TYPE,
            json!({
                "Name": descriptor.name,
                "Version": descriptor.version,
                "RoleArn": Expr::get_att(&cluster_role, "Arn"),
                "ResourcesVpcConfig": {
                    "SubnetIds": network.all_subnet_ids(),
                    "SecurityGroupIds": [Expr::get_att(&security_group, "GroupId")],
                    "EndpointPublicAccess": public_access,
                    "EndpointPrivateAccess": private_access,
                },
                "AccessConfig": {
                    "AuthenticationMode": "API_AND_CONFIG_MAP",
                    "BootstrapClusterCreatorAdminPermissions": true,
                },
            }),
        ),
    )?;
    let cluster_name = Expr::reference(&cluster);

    let node_role = stack.add_resource(
        &[id, "NodegroupDefaultCapacity", "NodeGroupRole"],
        Resource::new(
            ROLE_TYPE,
            json!({
                "AssumeRolePolicyDocument": assume_role_policy(json!({ "Service": "ec2.amazonaws.com" })),
                "ManagedPolicyArns": NODE_POLICIES.map(managed_policy),
            }),
        ),
    )?;
    let nodegroup = stack.add_resource(
        &[id, "NodegroupDefaultCapacity"],
        Resource::new(
            NODEGROUP_TYPE,
            json!({
                "ClusterName": cluster_name,
                "NodeRole": Expr::get_att(&node_role, "Arn"),
                "Subnets": network.private_subnet_ids,
                "AmiType": ami_type,
                "CapacityType": "ON_DEMAND",
                "ForceUpdateEnabled": true,
                "InstanceTypes": [descriptor.instance_type],
                "ScalingConfig": {
                    "DesiredSize": descriptor.node_count,
                    "MaxSize": descriptor.node_count,
                    "MinSize": descriptor.node_count,
                },
            }),
        ),
    )?;

    let account_root = Expr::join(vec![
        Expr::literal("arn:"),
        Expr::pseudo("Partition"),
        Expr::literal(":iam::"),
        Expr::pseudo("AccountId"),
        Expr::literal(":root"),
    ]);
    let admin_role = stack.add_resource(
        &[id, "KubectlAdminRole"],
        Resource::new(
            ROLE_TYPE,
            json!({
                "AssumeRolePolicyDocument": assume_role_policy(json!({ "AWS": account_root })),
            }),
        ),
    )?;
    let admin_role_arn = Expr::get_att(&admin_role, "Arn");

    let access_entry = stack.add_resource(
        &[id, "KubectlAdminAccess"],
        Resource::new(
            "AWS::EKS::AccessEntry",
            json!({
                "ClusterName": cluster_name,
                "PrincipalArn": admin_role_arn,
                "AccessPolicies": [{
                    "PolicyArn": Expr::join(vec![
                        Expr::literal("arn:"),
                        Expr::pseudo("Partition"),
                        Expr::literal(format!(":eks::aws:{CLUSTER_ADMIN_POLICY}")),
                    ]),
                    "AccessScope": { "Type": "cluster" },
                }],
            }),
        ),
    )?;

    tracing::debug!(
        component = "cluster",
        cluster = %descriptor.name,
        version = %descriptor.version,
        nodes = descriptor.node_count,
        instance_type = %descriptor.instance_type,
        "declared cluster"
    );
    stack.record_cluster();

    Ok(ClusterHandle {
        logical_id: cluster,
        cluster_name,
        admin_role_arn,
        ready_barrier: vec![nodegroup, access_entry],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_uses_x86_nodes() {
        let descriptor = ClusterDescriptor::default();
        descriptor.validate().expect("defaults should pass");
        assert_eq!(descriptor.ami_type().expect("valid"), "AL2_x86_64");
    }

    #[test]
    fn graviton_families_use_arm_ami() {
        for instance_type in ["t4g.medium", "m6g.large", "c7gn.xlarge"] {
            let descriptor = ClusterDescriptor {
                instance_type: instance_type.to_string(),
                ..ClusterDescriptor::default()
            };
            assert_eq!(descriptor.ami_type().expect("valid"), "AL2_ARM_64", "{instance_type}");
        }
    }

    #[test]
    fn rejects_zero_nodes() {
        let descriptor = ClusterDescriptor {
            node_count: 0,
            ..ClusterDescriptor::default()
        };
        let error = descriptor.validate().expect_err("should fail");
        assert!(error.to_string().contains("node_count"));
    }

    #[test]
    fn rejects_malformed_version_and_instance_type() {
        let bad_version = ClusterDescriptor {
            version: "v1.27".to_string(),
            ..ClusterDescriptor::default()
        };
        assert!(bad_version.validate().is_err());

        let bad_instance = ClusterDescriptor {
            instance_type: "t3-medium".to_string(),
            ..ClusterDescriptor::default()
        };
        assert!(bad_instance.validate().is_err());
    }
}
