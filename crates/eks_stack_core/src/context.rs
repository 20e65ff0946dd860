//! Account/region context a stack is synthesized for.

use serde::{Deserialize, Serialize};

pub const ACCOUNT_ENV_VAR: &str = "CDK_DEFAULT_ACCOUNT";
pub const REGION_ENV_VAR: &str = "CDK_DEFAULT_REGION";

const UNKNOWN_ACCOUNT: &str = "unknown-account";
const UNKNOWN_REGION: &str = "unknown-region";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackEnvironment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl StackEnvironment {
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Self {
            account: non_empty(account),
            region: non_empty(region),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var(ACCOUNT_ENV_VAR).ok(),
            std::env::var(REGION_ENV_VAR).ok(),
        )
    }

    /// True when neither account nor region is pinned.
    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() && self.region.is_none()
    }

    /// Environment string recorded in the cloud assembly manifest.
    pub fn target(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or(UNKNOWN_ACCOUNT),
            self.region.as_deref().unwrap_or(UNKNOWN_REGION),
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackProps {
    pub env: StackEnvironment,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_treated_as_unset() {
        let env = StackEnvironment::new(Some("  ".to_string()), Some(String::new()));
        assert!(env.is_agnostic());
        assert_eq!(env.target(), "aws://unknown-account/unknown-region");
    }

    #[test]
    fn target_uses_pinned_account_and_region() {
        let env = StackEnvironment::new(
            Some("123456789012".to_string()),
            Some("us-east-1".to_string()),
        );
        assert!(!env.is_agnostic());
        assert_eq!(env.target(), "aws://123456789012/us-east-1");
    }
}
