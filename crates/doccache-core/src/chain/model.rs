//! Chain-side input types, in the shape the indexer emits them.

use serde::{Deserialize, Serialize};

/// A document as read from the chain.
///
/// Content groups are positional: the outer index is the group sequence and
/// the inner index is the content sequence, both 1-based once stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainDocument {
    pub hash: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub content_groups: Vec<Vec<ChainContent>>,
    #[serde(default)]
    pub certificates: Vec<ChainCertificate>,
}

impl ChainDocument {
    /// A chain document carrying only its hash, enough to address it for deletion.
    pub fn with_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Default::default()
        }
    }
}

/// A labeled, typed value inside a chain content group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainContent {
    pub label: String,
    pub value: ChainValue,
}

impl ChainContent {
    pub fn new(label: impl Into<String>, value_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            label: label.into(),
            value: ChainValue(value_type.into(), value),
        }
    }
}

/// A `[type, value]` variant pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainValue(pub String, pub serde_json::Value);

impl ChainValue {
    /// The variant's type tag, e.g. `string`, `int64`, `checksum256`.
    pub fn type_tag(&self) -> &str {
        &self.0
    }

    /// The variant's value as stored text. Strings are taken verbatim,
    /// everything else keeps its JSON rendering.
    pub fn as_text(&self) -> String {
        match &self.1 {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// An attestation on a chain document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainCertificate {
    pub certifier: String,
    #[serde(default)]
    pub notes: String,
    pub certification_date: String,
}

/// A named, directed relationship between two documents addressed by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEdge {
    pub name: String,
    pub from: String,
    pub to: String,
}

impl ChainEdge {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}
