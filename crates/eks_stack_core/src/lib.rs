//! Declarations and synthesis for the Spring Boot on EKS stack.
//!
//! This crate owns the construct graph (network, registry, cluster, add-on,
//! workload manifests, outputs) and turns it into a CloudFormation template
//! plus a cloud assembly on disk. It intentionally excludes AWS SDK calls;
//! reading deployed outputs lives in `eks_stack_app`.

pub mod addon;
pub mod assembly;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod logical_id;
pub mod network;
pub mod outputs;
pub mod quantity;
pub mod registry;
pub mod stack;
pub mod template;
pub mod tokens;
pub mod workload;

pub use assembly::CloudAssembly;
pub use config::StackConfig;
pub use context::{StackEnvironment, StackProps};
pub use error::{Result, SynthError};
pub use stack::{SpringBootEksStack, Stack, StackSummary};
pub use template::{Expr, Template};
