use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use eks_stack_core::outputs::DECLARED_OUTPUTS;

/// Source of the outputs of a provisioned stack, keyed by output name.
pub trait StackOutputSource {
    fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>>;
}

pub struct CloudFormationOutputSource {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationOutputSource {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }
}

impl StackOutputSource for CloudFormationOutputSource {
    fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>> {
        let client = self.client.clone();
        let name = stack_name.to_string();

        let response = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client.describe_stacks().stack_name(name).send().await
            })
        })
        .with_context(|| format!("failed to describe stack {stack_name}"))?;

        let stack = response
            .stacks()
            .first()
            .ok_or_else(|| anyhow!("stack {stack_name} was not found"))?;

        Ok(stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some((
                    output.output_key()?.to_string(),
                    output.output_value()?.to_string(),
                ))
            })
            .collect())
    }
}

/// Reads every output the stack declares. A missing output is an error
/// naming it; extra outputs are ignored.
pub fn read_declared_outputs(
    source: &impl StackOutputSource,
    stack_name: &str,
) -> Result<BTreeMap<String, String>> {
    let mut available = source.stack_outputs(stack_name)?;
    let mut declared = BTreeMap::new();

    for name in DECLARED_OUTPUTS {
        let value = available
            .remove(name)
            .ok_or_else(|| anyhow!("stack {stack_name} is missing output {name}"))?;
        declared.insert(name.to_string(), value);
    }

    tracing::info!(
        component = "outputs",
        event = "outputs_read",
        stack_name,
        outputs = declared.len(),
        "read stack outputs"
    );
    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOutputs(Vec<(&'static str, &'static str)>);

    impl StackOutputSource for FixedOutputs {
        fn stack_outputs(&self, _stack_name: &str) -> Result<BTreeMap<String, String>> {
            Ok(self
                .0
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect())
        }
    }

    #[test]
    fn reads_all_declared_outputs_and_drops_extras() {
        let source = FixedOutputs(vec![
            ("RepositoryUri", "123456789012.dkr.ecr.us-east-1.amazonaws.com/spring-boot-k8s"),
            ("ClusterName", "spring-boot-k8s-cluster"),
            ("KubectlRoleArn", "arn:aws:iam::123456789012:role/admin"),
            ("Unrelated", "value"),
        ]);

        let outputs = read_declared_outputs(&source, "SpringBootEksStack").expect("outputs");

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs["ClusterName"], "spring-boot-k8s-cluster");
        assert!(!outputs.contains_key("Unrelated"));
    }

    #[test]
    fn missing_output_is_named_in_the_error() {
        let source = FixedOutputs(vec![
            ("RepositoryUri", "uri"),
            ("ClusterName", "spring-boot-k8s-cluster"),
        ]);

        let error = read_declared_outputs(&source, "SpringBootEksStack")
            .expect_err("missing output should fail");

        assert!(error.to_string().contains("KubectlRoleArn"));
    }
}
