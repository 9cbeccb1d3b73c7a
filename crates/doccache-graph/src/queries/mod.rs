//! Document retrieval queries.
//!
//! A [`RequestConfig`] decides which sections of a document are fetched:
//! content groups, certificates and any number of named relationships,
//! each relationship rendered with the same sections one level deep.

pub mod dql;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DoccacheError, DoccacheResult};
use crate::schema::is_relationship_name;
use dql::{Edge, QueryBlock, Request, RootFunc, Selection, TYPE_PREDICATE};

/// Name of the single query block every document query uses.
pub const DOCS_BLOCK: &str = "docs";

/// Which parts of a document to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default)]
    pub content_groups: bool,
    #[serde(default)]
    pub certificates: bool,
    /// Relationship names to expand, in order.
    #[serde(default)]
    pub edges: Vec<String>,
}

impl RequestConfig {
    /// Only the certificate section; what an upsert needs to merge.
    pub fn certificates_only() -> Self {
        Self {
            certificates: true,
            ..Default::default()
        }
    }

    /// Content groups and certificates, no relationships.
    pub fn full() -> Self {
        Self {
            content_groups: true,
            certificates: true,
            edges: Vec::new(),
        }
    }

    /// Also expand the relationship `name`.
    pub fn with_edge(mut self, name: impl Into<String>) -> Self {
        self.edges.push(name.into());
        self
    }

    /// Relationship names with duplicates removed, first occurrence kept.
    fn distinct_edges(&self) -> Vec<&str> {
        let mut seen = Vec::with_capacity(self.edges.len());
        for name in &self.edges {
            if !seen.contains(&name.as_str()) {
                seen.push(name.as_str());
            }
        }
        seen
    }
}

/// Scalar predicates every document projection starts with.
const BASE_PREDICATES: [&str; 5] = ["uid", "hash", "creator", "created_date", TYPE_PREDICATE];

fn content_groups_edge() -> Edge {
    let referenced = Selection::new().predicate("uid").expand_all();

    let contents = Selection::new()
        .predicates(["uid", "content_sequence", "label", "value", "type", TYPE_PREDICATE])
        .edge(Edge::new("document", referenced));

    let groups = Selection::new()
        .predicates(["uid", "content_group_sequence", TYPE_PREDICATE])
        .edge(Edge::new("contents", contents).order_asc("content_sequence"));

    Edge::new("content_groups", groups).order_asc("content_group_sequence")
}

fn certificates_edge() -> Edge {
    let certs = Selection::new()
        .predicates(["uid", TYPE_PREDICATE])
        .expand_all();
    Edge::new("certificates", certs).order_asc("certification_sequence")
}

/// Base projection plus the configured sections, without relationships.
fn sections(config: &RequestConfig) -> Selection {
    let mut selection = Selection::new().predicates(BASE_PREDICATES);
    if config.content_groups {
        selection = selection.edge(content_groups_edge());
    }
    if config.certificates {
        selection = selection.edge(certificates_edge());
    }
    selection
}

/// Full projection for a document under `config`.
///
/// Relationship names must be valid and must not shadow a base predicate;
/// they are written into the query text verbatim.
pub fn document_selection(config: &RequestConfig) -> DoccacheResult<Selection> {
    let mut selection = sections(config);
    for name in config.distinct_edges() {
        if !is_relationship_name(name) {
            return Err(DoccacheError::InvalidPredicate(name.to_string()));
        }
        selection = selection.edge(Edge::new(name, sections(config)));
    }
    Ok(selection)
}

/// Fetch the document with `hash`, the hash bound as `$hash`.
pub fn document_by_hash(hash: &str, config: &RequestConfig) -> DoccacheResult<Request> {
    Ok(Request::Block {
        block: QueryBlock {
            name: DOCS_BLOCK.to_string(),
            func: RootFunc::Eq {
                predicate: "hash".to_string(),
                var: "hash".to_string(),
            },
            selection: document_selection(config)?,
        },
        variables: BTreeMap::from([("hash".to_string(), hash.to_string())]),
    })
}

/// Fetch `uid` and `hash` for every document whose hash is in `hashes`.
pub fn uids_by_hashes(hashes: Vec<String>) -> Request {
    Request::Block {
        block: QueryBlock {
            name: DOCS_BLOCK.to_string(),
            func: RootFunc::EqAny {
                predicate: "hash".to_string(),
                values: hashes,
            },
            selection: Selection::new().predicates(["uid", "hash"]),
        },
        variables: BTreeMap::new(),
    }
}

/// Introspect the named types.
pub fn schema_of<I, S>(types: I) -> Request
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Request::Schema {
        types: types.into_iter().map(Into::into).collect(),
    }
}

/// First element of the `docs` block in a decoded query result.
pub fn first_match(data: &serde_json::Value) -> Option<&serde_json::Value> {
    data.get(DOCS_BLOCK)
        .and_then(|docs| docs.as_array())
        .and_then(|docs| docs.first())
}
