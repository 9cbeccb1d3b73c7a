//! Dgraph schema: base declarations and on-demand relationship predicates.
//!
//! The `Document` type starts with its scalar and ownership predicates and
//! grows one `[uid]` predicate per relationship name seen on an edge event.
//! Dgraph replaces a type's field list on every declaration, so each growth
//! step re-declares all known fields.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use doccache_core::document::model::{
    CERTIFICATE_TYPE, CONTENT_GROUP_TYPE, CONTENT_TYPE, DOCUMENT_TYPE,
};

use crate::error::{DoccacheError, DoccacheResult};
use crate::queries::{dql::is_valid_predicate, schema_of};
use crate::store::GraphStore;

/// Types that must exist before documents can be stored.
pub const BASE_TYPES: [&str; 4] = [DOCUMENT_TYPE, CONTENT_GROUP_TYPE, CONTENT_TYPE, CERTIFICATE_TYPE];

/// Value type of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateKind {
    String,
    DateTime,
    Int,
    UidList,
}

impl PredicateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredicateKind::String => "string",
            PredicateKind::DateTime => "datetime",
            PredicateKind::Int => "int",
            PredicateKind::UidList => "[uid]",
        }
    }
}

/// Index tokenizer of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Exact,
    Term,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Exact => "exact",
            IndexKind::Term => "term",
        }
    }
}

/// A predicate declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateDef {
    pub name: String,
    pub kind: PredicateKind,
    pub index: Option<IndexKind>,
    /// Enables Dgraph's conflict detection on concurrent writes of the same value.
    pub upsert: bool,
}

impl PredicateDef {
    pub fn new(name: impl Into<String>, kind: PredicateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            index: None,
            upsert: false,
        }
    }

    pub fn indexed(mut self, index: IndexKind) -> Self {
        self.index = Some(index);
        self
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }
}

/// A type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<String>,
}

impl TypeDef {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// A schema update: types plus predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub types: Vec<TypeDef>,
    pub predicates: Vec<PredicateDef>,
}

impl Schema {
    /// The document, content group, content and certificate types.
    pub fn base() -> Self {
        use IndexKind::{Exact, Term};
        use PredicateKind::{DateTime, Int, UidList};
        let string = PredicateKind::String;

        Self {
            types: vec![
                TypeDef::new(
                    DOCUMENT_TYPE,
                    ["hash", "created_date", "creator", "content_groups", "certificates"],
                ),
                TypeDef::new(CONTENT_GROUP_TYPE, ["content_group_sequence", "contents"]),
                TypeDef::new(
                    CONTENT_TYPE,
                    ["label", "value", "type", "content_sequence", "document"],
                ),
                TypeDef::new(
                    CERTIFICATE_TYPE,
                    ["certifier", "notes", "certification_date", "certification_sequence"],
                ),
            ],
            predicates: vec![
                PredicateDef::new("hash", string).indexed(Exact).upsert(),
                PredicateDef::new("created_date", DateTime),
                PredicateDef::new("creator", string).indexed(Term),
                PredicateDef::new("content_groups", UidList),
                PredicateDef::new("certificates", UidList),
                PredicateDef::new("content_group_sequence", Int),
                PredicateDef::new("contents", UidList),
                PredicateDef::new("label", string).indexed(Term),
                PredicateDef::new("value", string).indexed(Term),
                PredicateDef::new("type", string).indexed(Term),
                PredicateDef::new("content_sequence", Int),
                PredicateDef::new("document", UidList),
                PredicateDef::new("certifier", string).indexed(Term),
                PredicateDef::new("notes", string),
                PredicateDef::new("certification_date", DateTime),
                PredicateDef::new("certification_sequence", Int),
            ],
        }
    }

    /// Declare relationship `name` and re-declare `Document` with it added.
    pub fn relationship<'a>(name: &str, known_fields: impl IntoIterator<Item = &'a String>) -> Self {
        let mut fields: Vec<String> = known_fields.into_iter().cloned().collect();
        fields.push(name.to_string());

        Self {
            types: vec![TypeDef::new(DOCUMENT_TYPE, fields)],
            predicates: vec![PredicateDef::new(name, PredicateKind::UidList)],
        }
    }

    /// Render as Dgraph schema text.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for ty in &self.types {
            let _ = writeln!(text, "type {} {{", ty.name);
            for field in &ty.fields {
                let _ = writeln!(text, "  {}", field);
            }
            text.push_str("}\n\n");
        }
        for pred in &self.predicates {
            let _ = write!(text, "{}: {}", pred.name, pred.kind.as_str());
            if let Some(index) = pred.index {
                let _ = write!(text, " @index({})", index.as_str());
            }
            if pred.upsert {
                text.push_str(" @upsert");
            }
            text.push_str(" .\n");
        }
        text
    }
}

/// Whether `name` may be used as a `Document` relationship.
///
/// Besides being a well-formed predicate, the name must not collide with
/// `uid` or any base predicate: those carry owned sub-nodes or scalar values,
/// and re-declaring them as `[uid]` would change their meaning.
pub fn is_relationship_name(name: &str) -> bool {
    is_valid_predicate(name)
        && name != "uid"
        && !Schema::base().predicates.iter().any(|p| p.name == name)
}

#[derive(Debug, Default, Deserialize)]
struct SchemaTypes {
    #[serde(default)]
    types: Vec<SchemaType>,
}

#[derive(Debug, Deserialize)]
struct SchemaType {
    name: String,
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    name: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    loaded: bool,
    document_fields: BTreeSet<String>,
    version: u64,
}

/// Tracks the `Document` predicate set and serializes every schema change.
///
/// One lock guards both the cached predicate set and the store update, so a
/// relationship name is declared at most once per process and two different
/// new names never issue overlapping type declarations.
pub struct SchemaRegistry {
    store: Arc<dyn GraphStore>,
    state: Mutex<RegistryState>,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Whether all base types exist in the store.
    pub async fn schema_ready(&self) -> DoccacheResult<bool> {
        let existing = self.fetch_types(&BASE_TYPES).await?;
        let missing: Vec<&str> = BASE_TYPES
            .iter()
            .copied()
            .filter(|name| !existing.iter().any(|t| t.name == *name))
            .collect();

        if !missing.is_empty() {
            debug!(?missing, "Base schema types missing");
        }
        Ok(missing.is_empty())
    }

    /// Create the base schema if needed and load the `Document` predicates.
    ///
    /// Safe to run on every startup.
    pub async fn ensure_schema(&self) -> DoccacheResult<()> {
        let mut state = self.state.lock().await;

        if !self.schema_ready().await? {
            info!("Creating base document schema...");
            self.store.update_schema(&Schema::base()).await?;
            state.version += 1;
        }

        state.document_fields = self.fetch_document_fields().await?;
        state.loaded = true;

        info!(predicates = state.document_fields.len(), "Document schema ready");
        Ok(())
    }

    /// Declare `name` as a `Document` relationship unless already known.
    ///
    /// Returns whether a schema update was issued.
    pub async fn register_edge_if_new(&self, name: &str) -> DoccacheResult<bool> {
        if !is_relationship_name(name) {
            return Err(DoccacheError::InvalidPredicate(name.to_string()));
        }

        let mut state = self.state.lock().await;

        if !state.loaded {
            state.document_fields = self.fetch_document_fields().await?;
            state.loaded = true;
        }
        if state.document_fields.contains(name) {
            return Ok(false);
        }

        let update = Schema::relationship(name, state.document_fields.iter());
        self.store.update_schema(&update).await?;

        state.document_fields.insert(name.to_string());
        state.version += 1;
        info!(edge = name, version = state.version, "Registered relationship predicate");
        Ok(true)
    }

    /// Cached `Document` predicates.
    pub async fn document_predicates(&self) -> Vec<String> {
        self.state.lock().await.document_fields.iter().cloned().collect()
    }

    /// Number of schema updates this registry has issued.
    pub async fn version(&self) -> u64 {
        self.state.lock().await.version
    }

    async fn fetch_types(&self, names: &[&str]) -> DoccacheResult<Vec<SchemaType>> {
        let data = self.store.query(&schema_of(names.iter().copied())).await?;
        let decoded: SchemaTypes = serde_json::from_value(data)?;
        Ok(decoded.types)
    }

    async fn fetch_document_fields(&self) -> DoccacheResult<BTreeSet<String>> {
        let types = self.fetch_types(&[DOCUMENT_TYPE]).await?;
        Ok(types
            .into_iter()
            .filter(|t| t.name == DOCUMENT_TYPE)
            .flat_map(|t| t.fields.into_iter().map(|f| f.name))
            .collect())
    }
}
