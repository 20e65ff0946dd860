//! The stack container and the Spring Boot on EKS stack definition.

use std::collections::BTreeMap;

use crate::addon::{self, AddonRequest};
use crate::cluster;
use crate::config::StackConfig;
use crate::context::{StackEnvironment, StackProps};
use crate::error::{Result, SynthError};
use crate::logical_id::logical_id;
use crate::network;
use crate::outputs;
use crate::registry;
use crate::template::{Expr, Output, Parameter, Resource, Template, TEMPLATE_FORMAT_VERSION};
use crate::tokens::TokenRegistry;
use crate::workload::{self, WorkloadManifests};

pub const KUBECTL_SERVICE_TOKEN_PARAMETER: &str = "KubectlProviderServiceToken";
const MAX_STACK_ID_LEN: usize = 128;

/// Stack ids name the template file and the CloudFormation stack, so they
/// follow the stack-name rule: a letter, then letters, digits or `-`.
pub fn validate_stack_id(id: &str) -> Result<()> {
    let mut chars = id.chars();
    let starts_ok = chars.next().is_some_and(|first| first.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !starts_ok || !rest_ok || id.len() > MAX_STACK_ID_LEN {
        return Err(SynthError::Config(format!(
            "stack id '{id}' must start with a letter and contain only letters, digits and '-' (at most {MAX_STACK_ID_LEN} characters)"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackSummary {
    pub networks: usize,
    pub registries: usize,
    pub clusters: usize,
    pub addons: usize,
    pub manifests: usize,
    pub resources: usize,
    pub outputs: usize,
}

/// A named set of resource declarations synthesized as one template.
#[derive(Debug, Clone)]
pub struct Stack {
    id: String,
    props: StackProps,
    resources: BTreeMap<String, Resource>,
    parameters: BTreeMap<String, Parameter>,
    outputs: BTreeMap<String, Output>,
    tokens: TokenRegistry,
    workload: Option<WorkloadManifests>,
    summary: StackSummary,
}

impl Stack {
    pub fn new(id: impl Into<String>, props: StackProps) -> Self {
        Self {
            id: id.into(),
            props,
            resources: BTreeMap::new(),
            parameters: BTreeMap::new(),
            outputs: BTreeMap::new(),
            tokens: TokenRegistry::new(),
            workload: None,
            summary: StackSummary::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn props(&self) -> &StackProps {
        &self.props
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenRegistry {
        &mut self.tokens
    }

    pub fn workload(&self) -> Option<&WorkloadManifests> {
        self.workload.as_ref()
    }

    /// Adds `resource` under a construct path relative to the stack and
    /// returns its logical id.
    pub fn add_resource(&mut self, path: &[&str], resource: Resource) -> Result<String> {
        let id = logical_id(path);
        if self.resources.contains_key(&id) {
            return Err(SynthError::DuplicateLogicalId(id));
        }
        self.resources.insert(id.clone(), resource);
        Ok(id)
    }

    pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        if self.outputs.contains_key(name) {
            return Err(SynthError::DuplicateLogicalId(name.to_string()));
        }
        self.outputs.insert(name.to_string(), output);
        Ok(())
    }

    /// Service token of the kubectl provider that applies charts and
    /// manifests. The provider is owned by the provisioning engine, so the
    /// stack takes it as a parameter.
    pub fn kubectl_service_token(&mut self) -> Expr {
        self.parameters
            .entry(KUBECTL_SERVICE_TOKEN_PARAMETER.to_string())
            .or_insert_with(|| Parameter {
                parameter_type: "String".to_string(),
                description: Some(
                    "Service token (Lambda ARN) of the kubectl provider that applies Helm charts and manifests"
                        .to_string(),
                ),
            });
        Expr::reference(KUBECTL_SERVICE_TOKEN_PARAMETER)
    }

    pub(crate) fn record_network(&mut self) {
        self.summary.networks += 1;
    }

    pub(crate) fn record_registry(&mut self) {
        self.summary.registries += 1;
    }

    pub(crate) fn record_cluster(&mut self) {
        self.summary.clusters += 1;
    }

    pub(crate) fn record_addon(&mut self) {
        self.summary.addons += 1;
    }

    pub(crate) fn record_workload(&mut self, manifests: WorkloadManifests) {
        self.summary.manifests += manifests.manifests().len();
        self.workload = Some(manifests);
    }

    pub fn summary(&self) -> StackSummary {
        StackSummary {
            resources: self.resources.len(),
            outputs: self.outputs.len(),
            ..self.summary
        }
    }

    pub fn synth(&self) -> Template {
        Template {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: self.props.description.clone(),
            parameters: self.parameters.clone(),
            resources: self.resources.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

/// Network, registry, cluster, observability add-on, workload manifests and
/// outputs, declared in that order.
pub struct SpringBootEksStack;

impl SpringBootEksStack {
    pub fn define(id: &str, props: StackProps, config: &StackConfig) -> Result<Stack> {
        validate_stack_id(id)?;
        let mut stack = Stack::new(id, props);

        let network = network::declare(&mut stack, "SpringBootEksVpc", &config.network)?;
        let repository =
            registry::declare(&mut stack, "SpringBootRepository", &config.registry)?;
        let cluster = cluster::declare(&mut stack, "SpringBootCluster", &config.cluster, &network)?;

        let request = AddonRequest::datadog(&config.observability);
        addon::declare(&mut stack, "SpringBootClusterChartDatadogOperator", &request, &cluster)?;

        let repository_uri = stack
            .tokens_mut()
            .encode("RepositoryUri", repository.repository_uri.clone());
        let image = format!("{repository_uri}:{}", config.workload.image_tag);
        let manifests = WorkloadManifests::build(&config.workload, &image);
        workload::declare(&mut stack, "SpringBootClusterManifestSpringBootApp", &manifests, &cluster)?;

        outputs::declare(&mut stack, outputs::bindings(&repository, &cluster))?;

        let summary = stack.summary();
        tracing::info!(
            component = "stack",
            stack_id = %stack.id(),
            environment = %stack.props().env.target(),
            env_agnostic = stack.props().env.is_agnostic(),
            resources = summary.resources,
            manifests = summary.manifests,
            outputs = summary.outputs,
            "stack defined"
        );
        Ok(stack)
    }

    /// Defines the stack with the id and description from `config`.
    pub fn from_config(env: StackEnvironment, config: &StackConfig) -> Result<Stack> {
        let props = StackProps {
            env,
            description: Some(config.stack.description.clone()),
        };
        Self::define(&config.stack.id, props, config)
    }
}
