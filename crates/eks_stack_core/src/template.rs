//! CloudFormation template model.
//!
//! Everything here serializes to the JSON shapes the provisioning engine
//! reads. Maps are `BTreeMap` so the synthesized template is byte-stable
//! for identical input.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A value that may only be known once the engine provisions the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Ref(String),
    GetAtt(String, String),
    Join(String, Vec<Expr>),
    Select(u32, Box<Expr>),
    Split(String, Box<Expr>),
    GetAzs(String),
}

impl Expr {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Self::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt(logical_id.into(), attribute.into())
    }

    pub fn join(parts: Vec<Expr>) -> Self {
        Self::Join(String::new(), parts)
    }

    pub fn select(index: u32, list: Expr) -> Self {
        Self::Select(index, Box::new(list))
    }

    pub fn split(delimiter: impl Into<String>, source: Expr) -> Self {
        Self::Split(delimiter.into(), Box::new(source))
    }

    pub fn pseudo(name: &str) -> Self {
        Self::Ref(format!("AWS::{name}"))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Literal(value) => Value::String(value.clone()),
            Self::Ref(logical_id) => json!({ "Ref": logical_id }),
            Self::GetAtt(logical_id, attribute) => {
                json!({ "Fn::GetAtt": [logical_id, attribute] })
            }
            Self::Join(delimiter, parts) => {
                let parts: Vec<Value> = parts.iter().map(Expr::to_value).collect();
                json!({ "Fn::Join": [delimiter, parts] })
            }
            Self::Select(index, list) => json!({ "Fn::Select": [index, list.to_value()] }),
            Self::Split(delimiter, source) => {
                json!({ "Fn::Split": [delimiter, source.to_value()] })
            }
            Self::GetAzs(region) => json!({ "Fn::GetAZs": region }),
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
            self.depends_on.sort();
        }
        self
    }

    pub fn with_policies(mut self, policy: &str) -> Self {
        self.deletion_policy = Some(policy.to_string());
        self.update_replace_policy = Some(policy.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "Value")]
    pub value: Expr,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn count_of(&self, resource_type: &str) -> usize {
        self.resources
            .values()
            .filter(|resource| resource.resource_type == resource_type)
            .count()
    }

    pub fn resources_of<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
