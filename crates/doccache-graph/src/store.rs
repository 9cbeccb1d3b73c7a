//! The graph store seam.
//!
//! Everything the mirror needs from a schema-on-write graph database fits in
//! four calls. [`crate::DgraphClient`] talks to a real Dgraph,
//! [`crate::MemoryStore`] keeps the graph in process.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::DoccacheResult;
use crate::queries::dql::Request;
use crate::schema::Schema;

/// Primitive operations against a graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Submit type and predicate declarations.
    ///
    /// Re-declaring a type replaces its field list.
    async fn update_schema(&self, schema: &Schema) -> DoccacheResult<()>;

    /// Run a read request and return the decoded `data` object.
    async fn query(&self, request: &Request) -> DoccacheResult<Value>;

    /// Set or delete a JSON node graph.
    ///
    /// Returns the uids assigned to blank nodes (`_:name`), keyed by `name`.
    /// Deleting an object that only carries a `uid` removes the whole node.
    async fn mutate(&self, graph: &Value, delete: bool) -> DoccacheResult<HashMap<String, String>>;

    /// Add or remove the relationship `name` from `from_uid` to `to_uid`.
    async fn mutate_edge(
        &self,
        from_uid: &str,
        to_uid: &str,
        name: &str,
        delete: bool,
    ) -> DoccacheResult<()> {
        let mut target = Map::new();
        target.insert("uid".to_string(), Value::String(to_uid.to_string()));

        let mut node = Map::new();
        node.insert("uid".to_string(), Value::String(from_uid.to_string()));
        node.insert(name.to_string(), Value::Array(vec![Value::Object(target)]));

        self.mutate(&Value::Object(node), delete).await?;
        Ok(())
    }
}
