//! Protocol message codec
//!
//! A [`Message`] is an ordered field map with the `openid.` prefix removed.
//! Insertion order matters: it decides the key-value encoding order and,
//! for responses, the signed field list.

use indexmap::IndexMap;
use lanthorn_core::OPENID_NS;
use serde::{Deserialize, Serialize};

/// Prefix carried by every protocol field on the wire
pub const FIELD_PREFIX: &str = "openid.";

/// An OpenID message (request or response)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    fields: IndexMap<String, String>,
}

/// Key-value form encoding of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueForm {
    /// `field:value\n` lines, trailing newline included
    pub body: String,

    /// Fields in the order they were encoded
    pub fields: Vec<String>,
}

/// Fields of one extension, keyed without the alias prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub alias: String,
    pub fields: IndexMap<String, String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a message from decoded form or query parameters.
    ///
    /// Only `openid.`-prefixed keys are kept; the prefix is stripped and the
    /// remainder lower-cased.
    pub fn from_parameters<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut fields = IndexMap::new();
        for (key, value) in params {
            if let Some(name) = key.as_ref().strip_prefix(FIELD_PREFIX) {
                fields.insert(name.to_lowercase(), value.into());
            }
        }
        Self { fields }
    }

    /// Parse a key-value form body (`field:value` per line)
    pub fn from_key_value_form(body: &str) -> Self {
        let fields = body
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Insert or replace a field. Replacing keeps the original position.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn mode(&self) -> Option<&str> {
        self.get("mode")
    }

    /// Whether the message declares the OpenID 2.0 namespace
    pub fn is_openid(&self) -> bool {
        self.get("ns") == Some(OPENID_NS)
    }

    /// Encode as key-value form.
    ///
    /// The protocol namespace is injected (first, unless the message already
    /// carries an `ns` field). With `fields`, exactly those fields are
    /// encoded in that order; a field absent from the message encodes with
    /// an empty value.
    pub fn encode_direct(&self, fields: Option<&[&str]>) -> KeyValueForm {
        let mut with_ns: IndexMap<&str, &str> = IndexMap::with_capacity(self.fields.len() + 1);
        if !self.fields.contains_key("ns") {
            with_ns.insert("ns", OPENID_NS);
        }
        for (k, v) in &self.fields {
            with_ns.insert(k.as_str(), v.as_str());
        }
        with_ns.insert("ns", OPENID_NS);

        let order: Vec<&str> = match fields {
            Some(list) => list.to_vec(),
            None => with_ns.keys().copied().collect(),
        };

        let mut body = String::new();
        for field in &order {
            body.push_str(field);
            body.push(':');
            body.push_str(with_ns.get(field).copied().unwrap_or(""));
            // The trailing newline is part of the signature base.
            body.push('\n');
        }

        KeyValueForm {
            body,
            fields: order.into_iter().map(str::to_string).collect(),
        }
    }

    /// Pairs for an indirect (query string) encoding, `openid.ns` first
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.fields.len() + 1);
        pairs.push((format!("{}ns", FIELD_PREFIX), OPENID_NS.to_string()));
        for (k, v) in &self.fields {
            if k != "ns" {
                pairs.push((format!("{}{}", FIELD_PREFIX, k), v.clone()));
            }
        }
        pairs
    }

    /// Find the extension declared with namespace URI `namespace`.
    ///
    /// Looks for `ns.<alias> = namespace`, then gathers every `<alias>.*`
    /// field. Returns `None` when the request does not declare it.
    pub fn extension(&self, namespace: &str) -> Option<Extension> {
        let alias = self.fields.iter().find_map(|(k, v)| {
            k.strip_prefix("ns.")
                .filter(|_| v == namespace)
                .map(str::to_string)
        })?;

        let prefix = format!("{}.", alias);
        let fields = self
            .fields
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect();

        Some(Extension { alias, fields })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Message {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
