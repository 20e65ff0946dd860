//! Command-line surface and AWS-facing adapters for the Spring Boot on EKS
//! stack.
//!
//! Synthesis itself lives in `eks_stack_core`, which never talks to AWS.
//! This crate owns process concerns (argument parsing, logging setup) and the
//! one post-provisioning read against CloudFormation.

pub mod adapters;
pub mod commands;
pub mod logging;
