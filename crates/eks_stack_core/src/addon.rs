//! Helm chart installation request for the observability agent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cluster::ClusterHandle;
use crate::error::{Result, SynthError};
use crate::stack::Stack;
use crate::template::Resource;

pub const HELM_CHART_TYPE: &str = "Custom::AWSCDK-EKS-HelmChart";

const MAX_RELEASE_NAME_LEN: usize = 53;

/// Datadog operator install settings. The key fields carry `${NAME}`
/// placeholders; nothing in this crate resolves them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilitySettings {
    pub chart: String,
    pub repository: String,
    pub namespace: String,
    pub create_namespace: bool,
    pub site: String,
    pub api_key: String,
    pub app_key: String,
    pub apm_enabled: bool,
    pub logs_enabled: bool,
    pub logs_container_collect_all: bool,
    pub process_agent_enabled: bool,
    pub dogstatsd_use_host_port: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            chart: "datadog-operator".to_string(),
            repository: "https://helm.datadoghq.com".to_string(),
            namespace: "datadog".to_string(),
            create_namespace: true,
            site: "datadoghq.com".to_string(),
            api_key: "${DATADOG_API_KEY}".to_string(),
            app_key: "${DATADOG_APP_KEY}".to_string(),
            apm_enabled: true,
            logs_enabled: true,
            logs_container_collect_all: true,
            process_agent_enabled: true,
            dogstatsd_use_host_port: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddonRequest {
    pub chart: String,
    pub repository: String,
    pub namespace: String,
    pub create_namespace: bool,
    pub values: Value,
}

impl AddonRequest {
    pub fn datadog(settings: &ObservabilitySettings) -> Self {
        Self {
            chart: settings.chart.clone(),
            repository: settings.repository.clone(),
            namespace: settings.namespace.clone(),
            create_namespace: settings.create_namespace,
            values: json!({
                "datadog": {
                    "apiKey": settings.api_key,
                    "appKey": settings.app_key,
                    "site": settings.site,
                    "apm": { "enabled": settings.apm_enabled },
                    "logs": {
                        "enabled": settings.logs_enabled,
                        "containerCollectAll": settings.logs_container_collect_all,
                    },
                    "processAgent": { "enabled": settings.process_agent_enabled },
                    "dogstatsd": { "useHostPort": settings.dogstatsd_use_host_port },
                },
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chart.trim().is_empty() {
            return Err(SynthError::descriptor("add-on", "chart cannot be empty"));
        }
        if !self.repository.starts_with("https://") && !self.repository.starts_with("oci://") {
            return Err(SynthError::descriptor(
                "add-on",
                format!("repository '{}' must be an https:// or oci:// URL", self.repository),
            ));
        }
        if !is_dns_label(&self.namespace) {
            return Err(SynthError::descriptor(
                "add-on",
                format!("namespace '{}' is not a valid DNS label", self.namespace),
            ));
        }
        if !self.values.is_object() {
            return Err(SynthError::descriptor("add-on", "values must be a mapping"));
        }
        Ok(())
    }
}

fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

/// Lists every `${NAME}` placeholder left in a values tree, depth first.
pub fn unresolved_placeholders(values: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_placeholders(values, &mut found);
    found
}

fn collect_placeholders(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            let mut rest = text.as_str();
            while let Some(start) = rest.find("${") {
                let Some(len) = rest[start + 2..].find('}') else {
                    break;
                };
                let name = &rest[start + 2..start + 2 + len];
                if !name.is_empty() && !found.iter().any(|known| known == name) {
                    found.push(name.to_string());
                }
                rest = &rest[start + 2 + len + 1..];
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_placeholders(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect_placeholders(item, found)),
        _ => {}
    }
}

fn lowercase_alphanumerics<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(str::chars)
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Lowercase alphanumeric release name derived from the construct path,
/// capped at Helm's 53 characters. Starts with a letter; falls back to the
/// chart name when the path has no usable characters.
pub fn release_name(path: &[&str], chart: &str) -> String {
    let mut name = lowercase_alphanumerics(path.iter().copied());
    if name.is_empty() {
        name = lowercase_alphanumerics([chart]);
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name.insert(0, 'r');
    }
    name.truncate(MAX_RELEASE_NAME_LEN);
    name
}

pub fn declare(
    stack: &mut Stack,
    id: &str,
    request: &AddonRequest,
    cluster: &ClusterHandle,
) -> Result<String> {
    request.validate()?;

    for placeholder in unresolved_placeholders(&request.values) {
        tracing::warn!(
            component = "addon",
            chart = %request.chart,
            placeholder = %placeholder,
            "helm values contain an unresolved placeholder; it must be substituted before apply"
        );
    }

    let stack_id = stack.id().to_string();
    let release = release_name(
        &[stack_id.as_str(), id, "chart", request.chart.as_str()],
        &request.chart,
    );
    let service_token = stack.kubectl_service_token();

    let mut resource = Resource::new(
        HELM_CHART_TYPE,
        json!({
            "ServiceToken": service_token,
            "ClusterName": cluster.cluster_name,
            "RoleArn": cluster.admin_role_arn,
            "Release": release,
            "Chart": request.chart,
            "Repository": request.repository,
            "Namespace": request.namespace,
            "CreateNamespace": request.create_namespace,
            "Values": serde_json::to_string(&request.values)?,
        }),
    );
    for dependency in &cluster.ready_barrier {
        resource = resource.depends_on(dependency);
    }

    let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
    tracing::debug!(
        component = "addon",
        chart = %request.chart,
        release = %release,
        namespace = %request.namespace,
        "declared helm chart"
    );
    stack.record_addon();
    Ok(logical_id)
}
