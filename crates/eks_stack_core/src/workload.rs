//! Kubernetes objects for the Spring Boot workload: deployment, service and
//! config map, built as typed k8s-openapi values and applied to the cluster
//! as one kubectl-backed resource.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::cluster::ClusterHandle;
use crate::error::{Result, SynthError};
use crate::quantity::parse_quantity;
use crate::stack::Stack;
use crate::template::Resource;

pub const KUBERNETES_RESOURCE_TYPE: &str = "Custom::AWSCDK-EKS-KubernetesResource";

const CONFIG_VOLUME: &str = "config-volume";
const PROPERTIES_FILE: &str = "application.properties";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadSettings {
    pub name: String,
    pub replicas: i32,
    pub max_surge: i32,
    pub max_unavailable: i32,
    pub container_port: i32,
    pub service_port: i32,
    pub service_type: String,
    pub image_tag: String,
    pub memory_request: String,
    pub cpu_request: String,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub health_path: String,
    pub readiness_initial_delay_seconds: i32,
    pub readiness_period_seconds: i32,
    pub liveness_initial_delay_seconds: i32,
    pub liveness_period_seconds: i32,
    pub java_opts: String,
    pub dd_env: String,
    pub dd_version: String,
    pub dd_trace_sample_rate: String,
    pub dd_logs_injection: bool,
    pub dd_profiling_enabled: bool,
    pub config_map_name: String,
    pub config_mount_path: String,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            name: "spring-boot-k8s".to_string(),
            replicas: 2,
            max_surge: 1,
            max_unavailable: 0,
            container_port: 8080,
            service_port: 80,
            service_type: "LoadBalancer".to_string(),
            image_tag: "latest".to_string(),
            memory_request: "512Mi".to_string(),
            cpu_request: "200m".to_string(),
            memory_limit: "1Gi".to_string(),
            cpu_limit: "500m".to_string(),
            health_path: "/health".to_string(),
            readiness_initial_delay_seconds: 30,
            readiness_period_seconds: 10,
            liveness_initial_delay_seconds: 60,
            liveness_period_seconds: 20,
            java_opts: "-XX:+UseContainerSupport -XX:MaxRAMPercentage=75.0".to_string(),
            dd_env: "production".to_string(),
            dd_version: "1.0.0".to_string(),
            dd_trace_sample_rate: "1".to_string(),
            dd_logs_injection: true,
            dd_profiling_enabled: true,
            config_map_name: "spring-boot-k8s-config".to_string(),
            config_mount_path: "/app/config".to_string(),
        }
    }
}

/// A manifest tagged by its resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Deployment(appsv1::Deployment),
    Service(corev1::Service),
    ConfigMap(corev1::ConfigMap),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment(_) => "Deployment",
            Self::Service(_) => "Service",
            Self::ConfigMap(_) => "ConfigMap",
        }
    }

    pub fn name(&self) -> Option<&str> {
        let metadata = match self {
            Self::Deployment(object) => &object.metadata,
            Self::Service(object) => &object.metadata,
            Self::ConfigMap(object) => &object.metadata,
        };
        metadata.name.as_deref()
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Deployment(object) => object.serialize(serializer),
            Self::Service(object) => object.serialize(serializer),
            Self::ConfigMap(object) => object.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadManifests {
    pub deployment: appsv1::Deployment,
    pub service: corev1::Service,
    pub config_map: corev1::ConfigMap,
}

fn app_labels(settings: &WorkloadSettings) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), settings.name.clone())])
}

fn quantities(memory: &str, cpu: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

fn http_probe(settings: &WorkloadSettings, initial_delay: i32, period: i32) -> corev1::Probe {
    corev1::Probe {
        http_get: Some(corev1::HTTPGetAction {
            path: Some(settings.health_path.clone()),
            port: IntOrString::Int(settings.container_port),
            ..corev1::HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        ..corev1::Probe::default()
    }
}

fn env_value(name: &str, value: impl Into<String>) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..corev1::EnvVar::default()
    }
}

fn container_env(settings: &WorkloadSettings) -> Vec<corev1::EnvVar> {
    vec![
        env_value("JAVA_OPTS", settings.java_opts.clone()),
        corev1::EnvVar {
            name: "DD_AGENT_HOST".to_string(),
            value_from: Some(corev1::EnvVarSource {
                field_ref: Some(corev1::ObjectFieldSelector {
                    field_path: "status.hostIP".to_string(),
                    ..corev1::ObjectFieldSelector::default()
                }),
                ..corev1::EnvVarSource::default()
            }),
            ..corev1::EnvVar::default()
        },
        env_value("DD_ENV", settings.dd_env.clone()),
        env_value("DD_SERVICE", settings.name.clone()),
        env_value("DD_VERSION", settings.dd_version.clone()),
        env_value("DD_LOGS_INJECTION", settings.dd_logs_injection.to_string()),
        env_value("DD_TRACE_SAMPLE_RATE", settings.dd_trace_sample_rate.clone()),
        env_value("DD_PROFILING_ENABLED", settings.dd_profiling_enabled.to_string()),
    ]
}

fn application_properties(settings: &WorkloadSettings) -> String {
    format!(
        "spring.application.name={name}\n\
         server.port={port}\n\
         \n\
         # Actuator configuration\n\
         management.endpoints.web.exposure.include=health,info,metrics\n\
         management.endpoint.health.show-details=always\n\
         \n\
         # Datadog configuration\n\
         dd.service.name={name}\n\
         dd.env={env}\n\
         dd.version={version}\n",
        name = settings.name,
        port = settings.container_port,
        env = settings.dd_env,
        version = settings.dd_version,
    )
}

impl WorkloadManifests {
    /// Builds the manifest set; `image` may contain a token marker.
    pub fn build(settings: &WorkloadSettings, image: &str) -> Self {
        let labels = app_labels(settings);

        let container = corev1::Container {
            name: settings.name.clone(),
            image: Some(image.to_string()),
            ports: Some(vec![corev1::ContainerPort {
                container_port: settings.container_port,
                ..corev1::ContainerPort::default()
            }]),
            resources: Some(corev1::ResourceRequirements {
                requests: Some(quantities(&settings.memory_request, &settings.cpu_request)),
                limits: Some(quantities(&settings.memory_limit, &settings.cpu_limit)),
                ..corev1::ResourceRequirements::default()
            }),
            readiness_probe: Some(http_probe(
                settings,
                settings.readiness_initial_delay_seconds,
                settings.readiness_period_seconds,
            )),
            liveness_probe: Some(http_probe(
                settings,
                settings.liveness_initial_delay_seconds,
                settings.liveness_period_seconds,
            )),
            env: Some(container_env(settings)),
            volume_mounts: Some(vec![corev1::VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: settings.config_mount_path.clone(),
                ..corev1::VolumeMount::default()
            }]),
            ..corev1::Container::default()
        };

        let deployment = appsv1::Deployment {
            metadata: metav1::ObjectMeta {
                name: Some(settings.name.clone()),
                labels: Some(labels.clone()),
                ..metav1::ObjectMeta::default()
            },
            spec: Some(appsv1::DeploymentSpec {
                replicas: Some(settings.replicas),
                selector: metav1::LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..metav1::LabelSelector::default()
                },
                strategy: Some(appsv1::DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(appsv1::RollingUpdateDeployment {
                        max_surge: Some(IntOrString::Int(settings.max_surge)),
                        max_unavailable: Some(IntOrString::Int(settings.max_unavailable)),
                        ..appsv1::RollingUpdateDeployment::default()
                    }),
                    ..appsv1::DeploymentStrategy::default()
                }),
                template: corev1::PodTemplateSpec {
                    metadata: Some(metav1::ObjectMeta {
                        labels: Some(labels.clone()),
                        annotations: Some(BTreeMap::from([(
                            "ad.datadoghq.com/java.logs".to_string(),
                            format!(r#"[{{"source":"java","service":"{}"}}]"#, settings.name),
                        )])),
                        ..metav1::ObjectMeta::default()
                    }),
                    spec: Some(corev1::PodSpec {
                        containers: vec![container],
                        volumes: Some(vec![corev1::Volume {
                            name: CONFIG_VOLUME.to_string(),
                            config_map: Some(corev1::ConfigMapVolumeSource {
                                name: Some(settings.config_map_name.clone()),
                                ..corev1::ConfigMapVolumeSource::default()
                            }),
                            ..corev1::Volume::default()
                        }]),
                        ..corev1::PodSpec::default()
                    }),
                },
                ..appsv1::DeploymentSpec::default()
            }),
            ..appsv1::Deployment::default()
        };

        let service = corev1::Service {
            metadata: metav1::ObjectMeta {
                name: Some(settings.name.clone()),
                labels: Some(labels.clone()),
                ..metav1::ObjectMeta::default()
            },
            spec: Some(corev1::ServiceSpec {
                type_: Some(settings.service_type.clone()),
                ports: Some(vec![corev1::ServicePort {
                    name: Some("http".to_string()),
                    port: settings.service_port,
                    target_port: Some(IntOrString::Int(settings.container_port)),
                    protocol: Some("TCP".to_string()),
                    ..corev1::ServicePort::default()
                }]),
                selector: Some(labels),
                ..corev1::ServiceSpec::default()
            }),
            ..corev1::Service::default()
        };

        let config_map = corev1::ConfigMap {
            metadata: metav1::ObjectMeta {
                name: Some(settings.config_map_name.clone()),
                ..metav1::ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                PROPERTIES_FILE.to_string(),
                application_properties(settings),
            )])),
            ..corev1::ConfigMap::default()
        };

        Self {
            deployment,
            service,
            config_map,
        }
    }

    /// Deployment, service, config map, in apply order.
    pub fn manifests(&self) -> Vec<Manifest> {
        vec![
            Manifest::Deployment(self.deployment.clone()),
            Manifest::Service(self.service.clone()),
            Manifest::ConfigMap(self.config_map.clone()),
        ]
    }

    fn deployment_spec(&self) -> Result<&appsv1::DeploymentSpec> {
        self.deployment
            .spec
            .as_ref()
            .ok_or_else(|| SynthError::manifest("deployment has no spec"))
    }

    fn pod_spec(&self) -> Result<&corev1::PodSpec> {
        self.deployment_spec()?
            .template
            .spec
            .as_ref()
            .ok_or_else(|| SynthError::manifest("pod template has no spec"))
    }

    pub fn deployment_selector(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .deployment_spec()?
            .selector
            .match_labels
            .clone()
            .unwrap_or_default())
    }

    pub fn pod_labels(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .deployment_spec()?
            .template
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.labels.clone())
            .unwrap_or_default())
    }

    pub fn service_selector(&self) -> BTreeMap<String, String> {
        self.service
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.clone())
            .unwrap_or_default()
    }

    pub fn container_ports(&self) -> Result<Vec<i32>> {
        Ok(self
            .pod_spec()?
            .containers
            .iter()
            .flat_map(|container| container.ports.iter().flatten())
            .map(|port| port.container_port)
            .collect())
    }

    pub fn service_target_ports(&self) -> Vec<i32> {
        self.service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|port| match &port.target_port {
                Some(IntOrString::Int(value)) => Some(*value),
                Some(IntOrString::String(_)) => None,
                None => Some(port.port),
            })
            .collect()
    }

    /// Checks the cross-object rules the cluster would otherwise only
    /// enforce at apply time.
    pub fn validate(&self) -> Result<()> {
        let selector = self.deployment_selector()?;
        if selector.is_empty() {
            return Err(SynthError::manifest("deployment selector is empty"));
        }
        if selector != self.pod_labels()? {
            return Err(SynthError::manifest(
                "deployment selector does not match pod template labels",
            ));
        }
        if selector != self.service_selector() {
            return Err(SynthError::manifest(
                "service selector does not match deployment selector",
            ));
        }

        let container_ports = self.container_ports()?;
        for target in self.service_target_ports() {
            if !container_ports.contains(&target) {
                return Err(SynthError::manifest(format!(
                    "service target port {target} is not exposed by any container"
                )));
            }
        }

        let pod_spec = self.pod_spec()?;
        let volumes: BTreeSet<&str> = pod_spec
            .volumes
            .iter()
            .flatten()
            .map(|volume| volume.name.as_str())
            .collect();

        for container in &pod_spec.containers {
            validate_env(container)?;
            validate_resources(container)?;
            validate_probe_ports(container)?;

            for mount in container.volume_mounts.iter().flatten() {
                if !volumes.contains(mount.name.as_str()) {
                    return Err(SynthError::manifest(format!(
                        "container '{}' mounts undeclared volume '{}'",
                        container.name, mount.name
                    )));
                }
            }
        }

        let config_map_name = self.config_map.metadata.name.as_deref();
        for volume in pod_spec.volumes.iter().flatten() {
            if let Some(source) = &volume.config_map {
                if source.name.as_deref() != config_map_name {
                    return Err(SynthError::manifest(format!(
                        "volume '{}' references config map {:?} which is not part of this set",
                        volume.name, source.name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn to_json_values(&self) -> Result<Vec<Value>> {
        self.manifests()
            .iter()
            .map(|manifest| serde_json::to_value(manifest).map_err(SynthError::from))
            .collect()
    }

    /// Multi-document YAML stream, one document per manifest.
    pub fn to_yaml(&self) -> Result<String> {
        let mut stream = String::new();
        for manifest in self.manifests() {
            stream.push_str("---\n");
            stream.push_str(&serde_yaml::to_string(&manifest)?);
        }
        Ok(stream)
    }
}

fn validate_env(container: &corev1::Container) -> Result<()> {
    let mut seen = BTreeSet::new();
    for variable in container.env.iter().flatten() {
        if !seen.insert(variable.name.as_str()) {
            return Err(SynthError::manifest(format!(
                "container '{}' declares env var '{}' more than once",
                container.name, variable.name
            )));
        }
    }
    Ok(())
}

fn validate_resources(container: &corev1::Container) -> Result<()> {
    let Some(resources) = &container.resources else {
        return Ok(());
    };
    let (Some(requests), Some(limits)) = (&resources.requests, &resources.limits) else {
        return Ok(());
    };

    for (resource, request) in requests {
        let Some(limit) = limits.get(resource) else {
            continue;
        };
        if parse_quantity(&limit.0)? < parse_quantity(&request.0)? {
            return Err(SynthError::manifest(format!(
                "container '{}' {resource} limit {} is below its request {}",
                container.name, limit.0, request.0
            )));
        }
    }
    Ok(())
}

fn validate_probe_ports(container: &corev1::Container) -> Result<()> {
    let exposed: Vec<i32> = container
        .ports
        .iter()
        .flatten()
        .map(|port| port.container_port)
        .collect();

    let probes = [&container.readiness_probe, &container.liveness_probe];
    for probe in probes.into_iter().flatten() {
        if let Some(IntOrString::Int(port)) = probe.http_get.as_ref().map(|action| &action.port) {
            if !exposed.contains(port) {
                return Err(SynthError::manifest(format!(
                    "container '{}' probes port {port} which it does not expose",
                    container.name
                )));
            }
        }
    }
    Ok(())
}

pub fn declare(
    stack: &mut Stack,
    id: &str,
    manifests: &WorkloadManifests,
    cluster: &ClusterHandle,
) -> Result<String> {
    manifests.validate()?;

    let documents = serde_json::to_string(&manifests.to_json_values()?)?;
    let manifest_expr = stack.tokens().resolve(&documents);
    let service_token = stack.kubectl_service_token();

    let mut resource = Resource::new(
        KUBERNETES_RESOURCE_TYPE,
        serde_json::json!({
            "ServiceToken": service_token,
            "Manifest": manifest_expr,
            "ClusterName": cluster.cluster_name,
            "RoleArn": cluster.admin_role_arn,
            "Overwrite": false,
        }),
    );
    for dependency in &cluster.ready_barrier {
        resource = resource.depends_on(dependency);
    }

    let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
    for manifest in manifests.manifests() {
        tracing::debug!(
            component = "workload",
            kind = manifest.kind(),
            name = manifest.name().unwrap_or_default(),
            "declared manifest"
        );
    }
    stack.record_workload(manifests.clone());
    Ok(logical_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_manifests() -> WorkloadManifests {
        WorkloadManifests::build(&WorkloadSettings::default(), "registry.example/app:latest")
    }

    #[test]
    fn default_manifests_pass_validation() {
        default_manifests().validate().expect("defaults should pass");
    }

    #[test]
    fn serialized_manifests_carry_api_version_and_kind() {
        let values = default_manifests().to_json_values().expect("serializes");
        let shapes: Vec<(&str, &str)> = values
            .iter()
            .map(|value| {
                (
                    value["apiVersion"].as_str().unwrap_or_default(),
                    value["kind"].as_str().unwrap_or_default(),
                )
            })
            .collect();
        assert_eq!(
            shapes,
            vec![("apps/v1", "Deployment"), ("v1", "Service"), ("v1", "ConfigMap")]
        );
    }

    #[test]
    fn agent_host_comes_from_the_node_ip() {
        let values = default_manifests().to_json_values().expect("serializes");
        let env = &values[0]["spec"]["template"]["spec"]["containers"][0]["env"];
        let agent_host = env
            .as_array()
            .expect("env list")
            .iter()
            .find(|variable| variable["name"] == "DD_AGENT_HOST")
            .expect("DD_AGENT_HOST present");
        assert_eq!(agent_host["valueFrom"]["fieldRef"]["fieldPath"], "status.hostIP");
    }

    #[test]
    fn rejects_mismatched_service_selector() {
        let mut manifests = default_manifests();
        if let Some(spec) = manifests.service.spec.as_mut() {
            spec.selector = Some(BTreeMap::from([("app".to_string(), "other".to_string())]));
        }
        let error = manifests.validate().expect_err("should fail");
        assert_eq!(
            error.to_string(),
            "invalid manifest: service selector does not match deployment selector"
        );
    }

    #[test]
    fn rejects_duplicate_env_names() {
        let mut manifests = default_manifests();
        let container = &mut manifests
            .deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .expect("pod spec")
            .containers[0];
        container
            .env
            .get_or_insert_with(Vec::new)
            .push(env_value("DD_ENV", "staging"));

        let error = manifests.validate().expect_err("should fail");
        assert!(error.to_string().contains("'DD_ENV' more than once"));
    }

    #[test]
    fn rejects_limit_below_request() {
        let settings = WorkloadSettings {
            memory_limit: "256Mi".to_string(),
            ..WorkloadSettings::default()
        };
        let manifests = WorkloadManifests::build(&settings, "app:latest");
        let error = manifests.validate().expect_err("should fail");
        assert!(error.to_string().contains("memory limit 256Mi is below its request 512Mi"));
    }

    #[test]
    fn rejects_target_port_not_exposed() {
        let mut manifests = default_manifests();
        if let Some(ports) = manifests
            .service
            .spec
            .as_mut()
            .and_then(|spec| spec.ports.as_mut())
        {
            ports[0].target_port = Some(IntOrString::Int(9090));
        }
        let error = manifests.validate().expect_err("should fail");
        assert!(error.to_string().contains("target port 9090"));
    }

    fn pod_spec_mut(manifests: &mut WorkloadManifests) -> &mut corev1::PodSpec {
        manifests
            .deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .expect("pod spec")
    }

    #[test]
    fn rejects_probe_on_unexposed_port() {
        let mut manifests = default_manifests();
        let container = &mut pod_spec_mut(&mut manifests).containers[0];
        if let Some(action) = container
            .readiness_probe
            .as_mut()
            .and_then(|probe| probe.http_get.as_mut())
        {
            action.port = IntOrString::Int(9090);
        }

        let error = manifests.validate().expect_err("should fail");
        assert!(error.to_string().contains("probes port 9090"));
    }

    #[test]
    fn rejects_mount_of_undeclared_volume() {
        let mut manifests = default_manifests();
        let container = &mut pod_spec_mut(&mut manifests).containers[0];
        if let Some(mounts) = container.volume_mounts.as_mut() {
            mounts[0].name = "secrets-volume".to_string();
        }

        let error = manifests.validate().expect_err("should fail");
        assert!(error.to_string().contains("mounts undeclared volume 'secrets-volume'"));
    }

    #[test]
    fn rejects_config_map_volume_outside_the_set() {
        let mut manifests = default_manifests();
        if let Some(source) = pod_spec_mut(&mut manifests)
            .volumes
            .as_mut()
            .and_then(|volumes| volumes[0].config_map.as_mut())
        {
            source.name = Some("shared-config".to_string());
        }

        let error = manifests.validate().expect_err("should fail");
        assert!(error.to_string().contains("volume 'config-volume' references config map"));
    }

    #[test]
    fn yaml_stream_has_one_document_per_manifest() {
        let yaml = default_manifests().to_yaml().expect("renders");
        assert_eq!(yaml.matches("---\n").count(), 3);
        assert!(yaml.contains("kind: ConfigMap"));
        assert!(yaml.contains("server.port=8080"));
    }
}
