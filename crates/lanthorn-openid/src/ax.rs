//! Attribute Exchange (AX) 1.0 fetch requests and responses
//!
//! Only the wire shape is handled here. Which attributes to release is the
//! host's decision.

use indexmap::IndexMap;
use lanthorn_core::OPENID_AX_NS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Extension, Message};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AxError {
    #[error("Unexpected attribute exchange mode")]
    UnexpectedMode,
}

/// A value released for one attribute type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multiple(Vec<String>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Single(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Single(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Multiple(values)
    }
}

/// Attribute values keyed by type URI, in the order the host supplies them
pub type AttributeValues = IndexMap<String, AttributeValue>;

/// A parsed `fetch_request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Namespace alias chosen by the relying party
    pub alias: String,

    /// Attribute alias -> type URI
    pub types: IndexMap<String, String>,

    /// Aliases listed in `required`
    pub required: Vec<String>,

    /// Aliases listed in `if_available`
    pub if_available: Vec<String>,
}

impl FetchRequest {
    /// Interpret an AX extension; anything but `mode=fetch_request` is rejected
    pub fn from_extension(extension: Extension) -> Result<Self, AxError> {
        if extension.fields.get("mode").map(String::as_str) != Some("fetch_request") {
            return Err(AxError::UnexpectedMode);
        }

        let types = extension
            .fields
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("type.").map(|alias| (alias.to_string(), v.clone())))
            .collect();

        let split = |field: &str| -> Vec<String> {
            extension
                .fields
                .get(field)
                .map(|list| {
                    list.split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Self {
            required: split("required"),
            if_available: split("if_available"),
            alias: extension.alias,
            types,
        })
    }

    /// The relying party's alias for a type URI
    pub fn alias_for(&self, type_uri: &str) -> Option<&str> {
        self.types
            .iter()
            .find(|(_, uri)| uri.as_str() == type_uri)
            .map(|(alias, _)| alias.as_str())
    }

    /// Type URIs the relying party asked for
    pub fn requested_types(&self) -> impl Iterator<Item = &str> {
        self.types.values().map(String::as_str)
    }

    /// Append a `fetch_response` to `response`, mirroring the relying
    /// party's namespace and attribute aliases. Attributes it did not ask
    /// for are dropped.
    pub fn write_response(&self, values: Option<&AttributeValues>, response: &mut Message) {
        let ns = &self.alias;
        response.insert(format!("ns.{}", ns), OPENID_AX_NS);
        response.insert(format!("{}.mode", ns), "fetch_response");

        let Some(values) = values else {
            return;
        };

        for (type_uri, value) in values {
            let Some(alias) = self.alias_for(type_uri) else {
                continue;
            };

            response.insert(format!("{}.type.{}", ns, alias), type_uri.as_str());
            match value {
                AttributeValue::Single(v) => {
                    response.insert(format!("{}.value.{}", ns, alias), v.as_str());
                }
                AttributeValue::Multiple(vs) => {
                    response.insert(format!("{}.count.{}", ns, alias), vs.len().to_string());
                    for (index, v) in vs.iter().enumerate() {
                        response.insert(format!("{}.value.{}.{}", ns, alias, index + 1), v.as_str());
                    }
                }
            }
        }
    }
}
