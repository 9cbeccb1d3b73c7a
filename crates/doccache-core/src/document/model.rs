//! Document graph models.
//!
//! Field names follow the stored predicate names so the same types serve as
//! mutation payloads and as decoded query results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Graph type name of documents.
pub const DOCUMENT_TYPE: &str = "Document";
/// Graph type name of content groups.
pub const CONTENT_GROUP_TYPE: &str = "ContentGroup";
/// Graph type name of contents.
pub const CONTENT_TYPE: &str = "Content";
/// Graph type name of certificates.
pub const CERTIFICATE_TYPE: &str = "Certificate";

/// A content-addressed document node.
///
/// Every field is optional on the wire: a projection only returns what was
/// asked for, and a bare `{uid}` is how one node points at another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub creator: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_date: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_groups: Vec<ContentGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
    #[serde(rename = "dgraph.type", default, skip_serializing_if = "Vec::is_empty")]
    pub node_types: Vec<String>,
    /// Named relationships to other documents, keyed by predicate.
    #[serde(flatten)]
    pub edges: BTreeMap<String, Vec<Document>>,
}

/// An ordered group of contents owned by a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "content_group_sequence", default)]
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<Content>,
    #[serde(rename = "dgraph.type", default, skip_serializing_if = "Vec::is_empty")]
    pub node_types: Vec<String>,
}

/// A labeled value inside a content group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(rename = "content_sequence", default)]
    pub sequence: i64,
    /// Referenced document for checksum contents; at most one element.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document: Vec<Document>,
    #[serde(rename = "dgraph.type", default, skip_serializing_if = "Vec::is_empty")]
    pub node_types: Vec<String>,
}

/// An append-only attestation attached to a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub certifier: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub certification_date: String,
    #[serde(rename = "certification_sequence", default)]
    pub sequence: i64,
    #[serde(rename = "dgraph.type", default, skip_serializing_if = "Vec::is_empty")]
    pub node_types: Vec<String>,
}
