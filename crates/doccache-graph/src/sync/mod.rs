//! Chain to Dgraph document synchronization.
//!
//! [`DocumentSync`] is the only writer: it upserts documents keyed by hash,
//! deletes them with their owned sub-nodes, and adds or removes named
//! relationships between documents.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde_json::{json, Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use doccache_core::{Certificate, ChainDocument, ChainEdge, Document};

use crate::error::{DoccacheError, DoccacheResult, Endpoint};
use crate::queries::{document_by_hash, first_match, RequestConfig};
use crate::resolver::HashResolver;
use crate::schema::SchemaRegistry;
use crate::store::GraphStore;

/// Blank node name of a document being created.
const NEW_DOCUMENT: &str = "document";

/// What `store_document` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Created { uid: String },
    Updated { uid: String, certificates_added: usize },
    Unchanged { uid: String },
}

impl StoreOutcome {
    pub fn uid(&self) -> &str {
        match self {
            StoreOutcome::Created { uid }
            | StoreOutcome::Updated { uid, .. }
            | StoreOutcome::Unchanged { uid } => uid,
        }
    }
}

/// Mirrors chain documents and edges into the graph store.
pub struct DocumentSync {
    store: Arc<dyn GraphStore>,
    schema: SchemaRegistry,
    resolver: HashResolver,
    /// Per-hash locks for writes in progress.
    in_flight: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl DocumentSync {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            schema: SchemaRegistry::new(store.clone()),
            resolver: HashResolver::new(store.clone()),
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn resolver(&self) -> &HashResolver {
        &self.resolver
    }

    /// Create the base schema if missing and load the document predicates.
    pub async fn prepare_schema(&self) -> DoccacheResult<()> {
        self.schema.ensure_schema().await
    }

    /// Find a document by hash.
    pub async fn get_by_hash(&self, hash: &str, config: &RequestConfig) -> DoccacheResult<Option<Document>> {
        match self.fetch(hash, config).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Find a document by hash, decoded as a plain JSON map.
    pub async fn get_by_hash_as_map(
        &self,
        hash: &str,
        config: &RequestConfig,
    ) -> DoccacheResult<Option<Map<String, Value>>> {
        match self.fetch(hash, config).await? {
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(DoccacheError::store(format!("expected a document object, got {}", other))),
            None => Ok(None),
        }
    }

    /// Uid of the document with `hash`, if stored.
    pub async fn get_uid(&self, hash: &str) -> DoccacheResult<Option<String>> {
        self.resolver.resolve_one(hash).await
    }

    /// Create the document on first sighting, otherwise append new certificates.
    ///
    /// Content groups are immutable once stored; re-sending a document only
    /// ever adds certificates.
    pub async fn store_document(&self, chain_doc: &ChainDocument) -> DoccacheResult<StoreOutcome> {
        let lock = self.hash_lock(&chain_doc.hash)?;
        let _guard = lock.lock().await;

        let existing = self
            .get_by_hash(&chain_doc.hash, &RequestConfig::certificates_only())
            .await?;

        match existing {
            None => self.create_document(chain_doc).await,
            Some(doc) => self.update_certificates(doc, chain_doc).await,
        }
    }

    /// Delete the document with the chain document's hash.
    ///
    /// Returns `false` when there was nothing to delete.
    pub async fn delete_document(&self, chain_doc: &ChainDocument) -> DoccacheResult<bool> {
        let lock = self.hash_lock(&chain_doc.hash)?;
        let _guard = lock.lock().await;

        let doc = match self.get_by_hash(&chain_doc.hash, &RequestConfig::full()).await? {
            Some(doc) => doc,
            None => {
                info!(hash = %chain_doc.hash, "Document not found, nothing to delete");
                return Ok(false);
            }
        };
        let uid = doc
            .uid
            .clone()
            .ok_or_else(|| DoccacheError::store(format!("document {} returned without uid", chain_doc.hash)))?;

        let owned = owned_uids(&doc);
        info!(uid = %uid, hash = %chain_doc.hash, owned = owned.len(), "Deleting document");

        let targets: Vec<Value> = std::iter::once(uid)
            .chain(owned)
            .map(|uid| json!({ "uid": uid }))
            .collect();
        self.store.mutate(&Value::Array(targets), true).await?;
        Ok(true)
    }

    /// Create or remove the relationship `edge.name` between two stored documents.
    ///
    /// Both endpoints must exist; the relationship name is declared in the
    /// schema first if this is its first use.
    pub async fn mutate_edge(&self, edge: &ChainEdge, delete: bool) -> DoccacheResult<()> {
        self.schema.register_edge_if_new(&edge.name).await?;

        let uids = self
            .resolver
            .resolve([edge.from.as_str(), edge.to.as_str()])
            .await?;

        let from_uid = uids
            .get(&edge.from)
            .ok_or_else(|| missing_endpoint(Endpoint::From, edge, delete))?;
        let to_uid = uids
            .get(&edge.to)
            .ok_or_else(|| missing_endpoint(Endpoint::To, edge, delete))?;

        info!(
            edge = %edge.name,
            from = %from_uid,
            from_hash = %edge.from,
            to = %to_uid,
            to_hash = %edge.to,
            delete,
            "Mutating edge"
        );
        self.store.mutate_edge(from_uid, to_uid, &edge.name, delete).await
    }

    async fn create_document(&self, chain_doc: &ChainDocument) -> DoccacheResult<StoreOutcome> {
        info!(hash = %chain_doc.hash, "Creating document");

        let mut doc = Document::from_chain(chain_doc)?;
        self.resolve_checksums(&mut doc).await?;
        doc.uid = Some(format!("_:{}", NEW_DOCUMENT));

        let uids = self.store.mutate(&serde_json::to_value(&doc)?, false).await?;
        let uid = uids
            .get(NEW_DOCUMENT)
            .cloned()
            .ok_or_else(|| DoccacheError::store(format!("no uid assigned to document {}", chain_doc.hash)))?;

        debug!(uid = %uid, hash = %chain_doc.hash, "Document created");
        Ok(StoreOutcome::Created { uid })
    }

    async fn update_certificates(&self, mut doc: Document, chain_doc: &ChainDocument) -> DoccacheResult<StoreOutcome> {
        let uid = doc
            .uid
            .clone()
            .ok_or_else(|| DoccacheError::store(format!("document {} returned without uid", chain_doc.hash)))?;

        let incoming = Certificate::from_chain_list(&chain_doc.certificates)?;
        let added = doc.merge_certificates(&incoming);
        if added.is_empty() {
            debug!(uid = %uid, hash = %chain_doc.hash, "No new certificates");
            return Ok(StoreOutcome::Unchanged { uid });
        }

        let certificates_added = added.len();
        info!(uid = %uid, hash = %chain_doc.hash, certificates_added, "Updating certificates for document");

        let update = Document::certificate_update(uid.clone(), added);
        self.store.mutate(&serde_json::to_value(&update)?, false).await?;
        Ok(StoreOutcome::Updated { uid, certificates_added })
    }

    /// Point checksum contents at the documents they name.
    ///
    /// Unknown hashes are expected when documents arrive out of order; those
    /// contents are stored without a reference.
    async fn resolve_checksums(&self, doc: &mut Document) -> DoccacheResult<()> {
        let hashes: Vec<String> = doc.checksum_contents().map(|c| c.value.clone()).collect();
        if hashes.is_empty() {
            return Ok(());
        }

        let uids = self.resolver.resolve(&hashes).await?;
        let doc_hash = doc.hash.clone();
        for content in doc.checksum_contents_mut() {
            match uids.get(&content.value) {
                Some(uid) => content.set_reference(uid.clone()),
                None => warn!(
                    referenced = %content.value,
                    document = %doc_hash,
                    "Referenced document not found, checksum left unresolved"
                ),
            }
        }
        Ok(())
    }

    async fn fetch(&self, hash: &str, config: &RequestConfig) -> DoccacheResult<Option<Value>> {
        let data = self.store.query(&document_by_hash(hash, config)?).await?;
        Ok(first_match(&data).cloned())
    }

    fn hash_lock(&self, hash: &str) -> DoccacheResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .in_flight
            .lock()
            .map_err(|_| DoccacheError::store("in-flight lock table poisoned"))?;

        if let Some(lock) = locks.get(hash).and_then(Weak::upgrade) {
            return Ok(lock);
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(hash.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }
}

fn missing_endpoint(endpoint: Endpoint, edge: &ChainEdge, delete: bool) -> DoccacheError {
    DoccacheError::MissingEndpoint {
        endpoint,
        name: edge.name.clone(),
        from: edge.from.clone(),
        to: edge.to.clone(),
        delete,
    }
}

/// Uids of the content groups, contents and certificates a document owns.
fn owned_uids(doc: &Document) -> Vec<String> {
    let groups = doc.content_groups.iter().flat_map(|group| {
        group
            .uid
            .iter()
            .chain(group.contents.iter().filter_map(|c| c.uid.as_ref()))
    });
    let certs = doc.certificates.iter().filter_map(|c| c.uid.as_ref());
    groups.chain(certs).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use doccache_core::{ChainCertificate, ChainContent};

    fn sync() -> (Arc<MemoryStore>, DocumentSync) {
        let store = Arc::new(MemoryStore::new());
        let sync = DocumentSync::new(store.clone());
        (store, sync)
    }

    fn certificate(certifier: &str, day: u32) -> ChainCertificate {
        ChainCertificate {
            certifier: certifier.to_string(),
            notes: format!("note from {}", certifier),
            certification_date: format!("2021-01-{:02}T00:00:00.000", day),
        }
    }

    fn chain_doc(hash: &str, certs: usize) -> ChainDocument {
        ChainDocument {
            hash: hash.to_string(),
            creator: "dao.hypha".to_string(),
            created_date: "2021-01-01T00:00:00.000".to_string(),
            content_groups: vec![vec![
                ChainContent::new("content_group_label", "string", json!("details")),
                ChainContent::new("title", "string", json!("Document ".to_string() + hash)),
            ]],
            certificates: (1..=certs)
                .map(|i| certificate(&format!("certifier{}", i), i as u32 + 1))
                .collect(),
        }
    }

    fn referencing(hash: &str, target: &str) -> ChainDocument {
        let mut doc = chain_doc(hash, 0);
        doc.content_groups[0].push(ChainContent::new("parent", "checksum256", json!(target)));
        doc
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let (store, sync) = sync();
        sync.prepare_schema().await.unwrap();
        let doc = chain_doc("aaa", 2);

        let first = sync.store_document(&doc).await.unwrap();
        assert!(matches!(first, StoreOutcome::Created { .. }));
        let nodes = store.node_count();
        let mutations = store.mutation_count();

        let second = sync.store_document(&doc).await.unwrap();
        assert_eq!(second, StoreOutcome::Unchanged { uid: first.uid().to_string() });
        assert_eq!(store.node_count(), nodes);
        assert_eq!(store.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn test_certificates_are_merged() {
        let (_store, sync) = sync();
        sync.store_document(&chain_doc("aaa", 2)).await.unwrap();

        let outcome = sync.store_document(&chain_doc("aaa", 3)).await.unwrap();
        assert!(matches!(outcome, StoreOutcome::Updated { certificates_added: 1, .. }));

        let doc = sync
            .get_by_hash("aaa", &RequestConfig::certificates_only())
            .await
            .unwrap()
            .unwrap();
        let sequences: Vec<i64> = doc.certificates.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(doc.certificates[2].certifier, "certifier3");
        assert_eq!(doc.certificates[2].certification_date, "2021-01-04T00:00:00Z");
    }

    #[tokio::test]
    async fn test_update_leaves_content_groups_alone() {
        let (_store, sync) = sync();
        sync.store_document(&chain_doc("aaa", 1)).await.unwrap();

        let mut changed = chain_doc("aaa", 2);
        changed.content_groups[0][1] = ChainContent::new("title", "string", json!("rewritten"));
        sync.store_document(&changed).await.unwrap();

        let doc = sync.get_by_hash("aaa", &RequestConfig::full()).await.unwrap().unwrap();
        assert_eq!(doc.content_groups.len(), 1);
        assert_eq!(doc.content_groups[0].get("title").unwrap().value, "Document aaa");
        assert_eq!(doc.certificates.len(), 2);
    }

    #[tokio::test]
    async fn test_checksum_resolves_when_target_exists() {
        let (_store, sync) = sync();
        let target = sync.store_document(&chain_doc("bbb", 0)).await.unwrap();
        sync.store_document(&referencing("aaa", "bbb")).await.unwrap();

        let doc = sync.get_by_hash("aaa", &RequestConfig::full()).await.unwrap().unwrap();
        let parent = doc.content_groups[0].get("parent").unwrap();
        assert_eq!(parent.referenced_uid(), Some(target.uid()));
        assert_eq!(parent.document[0].hash, "bbb");
    }

    #[tokio::test]
    async fn test_checksum_dangles_when_target_missing() {
        let (_store, sync) = sync();
        sync.store_document(&referencing("aaa", "bbb")).await.unwrap();
        sync.store_document(&chain_doc("bbb", 0)).await.unwrap();

        let doc = sync.get_by_hash("aaa", &RequestConfig::full()).await.unwrap().unwrap();
        let parent = doc.content_groups[0].get("parent").unwrap();
        assert_eq!(parent.value, "bbb");
        assert_eq!(parent.referenced_uid(), None);
    }

    #[tokio::test]
    async fn test_edge_with_missing_endpoint() {
        let (store, sync) = sync();
        sync.prepare_schema().await.unwrap();
        sync.store_document(&chain_doc("aaa", 0)).await.unwrap();
        let mutations = store.mutation_count();

        let edge = ChainEdge::new("owns", "aaa", "zzz");
        let err = sync.mutate_edge(&edge, false).await.unwrap_err();
        match &err {
            DoccacheError::MissingEndpoint { endpoint, name, delete, .. } => {
                assert_eq!(*endpoint, Endpoint::To);
                assert_eq!(name, "owns");
                assert!(!delete);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(
            err.to_string(),
            "To node of the relationship: [Edge: owns, From: aaa, To: zzz] does not exist, Delete Op: false"
        );
        assert_eq!(store.mutation_count(), mutations);

        let err = sync
            .mutate_edge(&ChainEdge::new("owns", "yyy", "aaa"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, DoccacheError::MissingEndpoint { endpoint: Endpoint::From, .. }));
    }

    #[tokio::test]
    async fn test_delete_unknown_document() {
        let (store, sync) = sync();
        let deleted = sync.delete_document(&ChainDocument::with_hash("nope")).await.unwrap();
        assert!(!deleted);
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_owned_nodes_only() {
        let (store, sync) = sync();
        sync.store_document(&chain_doc("bbb", 0)).await.unwrap();
        let target_nodes = store.node_count();
        sync.store_document(&referencing("aaa", "bbb")).await.unwrap();
        sync.store_document(&chain_doc("aaa", 2)).await.unwrap();

        let deleted = sync.delete_document(&ChainDocument::with_hash("aaa")).await.unwrap();
        assert!(deleted);
        assert_eq!(store.node_count(), target_nodes);
        assert!(sync.get_uid("aaa").await.unwrap().is_none());
        assert!(sync.get_uid("bbb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_new_edge_name_grows_schema_once() {
        let (store, sync) = sync();
        sync.prepare_schema().await.unwrap();
        sync.store_document(&chain_doc("aaa", 0)).await.unwrap();
        sync.store_document(&chain_doc("bbb", 0)).await.unwrap();
        let base_updates = store.schema_update_count();

        let edge = ChainEdge::new("runs", "aaa", "bbb");
        sync.mutate_edge(&edge, false).await.unwrap();
        assert_eq!(store.schema_update_count(), base_updates + 1);

        sync.mutate_edge(&ChainEdge::new("runs", "bbb", "aaa"), false).await.unwrap();
        sync.mutate_edge(&edge, true).await.unwrap();
        assert_eq!(store.schema_update_count(), base_updates + 1);
        assert!(sync.schema().document_predicates().await.contains(&"runs".to_string()));
    }

    #[tokio::test]
    async fn test_edges_are_returned_with_the_same_shape() {
        let (_store, sync) = sync();
        sync.store_document(&chain_doc("aaa", 1)).await.unwrap();
        sync.store_document(&chain_doc("bbb", 2)).await.unwrap();
        sync.mutate_edge(&ChainEdge::new("runs", "aaa", "bbb"), false).await.unwrap();

        let config = RequestConfig::certificates_only().with_edge("runs");
        let doc = sync.get_by_hash("aaa", &config).await.unwrap().unwrap();
        assert!(doc.content_groups.is_empty());
        assert_eq!(doc.certificates.len(), 1);

        let runs = doc.related("runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].hash, "bbb");
        assert_eq!(runs[0].certificates.len(), 2);
        assert!(runs[0].content_groups.is_empty());
    }

    #[tokio::test]
    async fn test_edge_delete_keeps_documents() {
        let (store, sync) = sync();
        sync.store_document(&chain_doc("aaa", 0)).await.unwrap();
        sync.store_document(&chain_doc("bbb", 0)).await.unwrap();
        let edge = ChainEdge::new("runs", "aaa", "bbb");
        sync.mutate_edge(&edge, false).await.unwrap();
        let nodes = store.node_count();

        sync.mutate_edge(&edge, true).await.unwrap();

        let config = RequestConfig::default().with_edge("runs");
        let doc = sync.get_by_hash("aaa", &config).await.unwrap().unwrap();
        assert!(doc.related("runs").is_empty());
        assert_eq!(store.node_count(), nodes);
    }

    #[tokio::test]
    async fn test_get_uid_and_map_decoding() {
        let (_store, sync) = sync();
        let created = sync.store_document(&chain_doc("aaa", 1)).await.unwrap();

        assert_eq!(sync.get_uid("aaa").await.unwrap().as_deref(), Some(created.uid()));
        assert_eq!(sync.get_uid("zzz").await.unwrap(), None);

        let map = sync
            .get_by_hash_as_map("aaa", &RequestConfig::full())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(map["hash"], "aaa");
        assert_eq!(map["created_date"], "2021-01-01T00:00:00Z");
        assert_eq!(map["content_groups"][0]["contents"][1]["label"], "title");
        assert_eq!(map["certificates"][0]["certification_sequence"], 1);

        assert!(sync
            .get_by_hash_as_map("zzz", &RequestConfig::full())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_concurrent_stores_create_once() {
        let (store, sync) = sync();
        let sync = Arc::new(sync);
        let doc = chain_doc("aaa", 1);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let sync = sync.clone();
                let doc = doc.clone();
                tokio::spawn(async move { sync.store_document(&doc).await.unwrap() })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), StoreOutcome::Created { .. }) {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let data = store
            .query(&crate::queries::uids_by_hashes(vec!["aaa".to_string()]))
            .await
            .unwrap();
        assert_eq!(data["docs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_owned_predicate_cannot_link_documents() {
        let (store, sync) = sync();
        sync.prepare_schema().await.unwrap();
        sync.store_document(&chain_doc("aaa", 1)).await.unwrap();
        sync.store_document(&chain_doc("bbb", 0)).await.unwrap();
        let mutations = store.mutation_count();

        let err = sync
            .mutate_edge(&ChainEdge::new("certificates", "aaa", "bbb"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DoccacheError::InvalidPredicate(_)));
        assert_eq!(store.mutation_count(), mutations);

        assert!(sync.delete_document(&ChainDocument::with_hash("aaa")).await.unwrap());
        assert!(sync.get_uid("bbb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scalar_and_uid_edge_names_rejected() {
        let (store, sync) = sync();
        sync.prepare_schema().await.unwrap();
        sync.store_document(&chain_doc("aaa", 0)).await.unwrap();
        sync.store_document(&chain_doc("bbb", 0)).await.unwrap();
        let updates = store.schema_update_count();

        for name in ["label", "uid"] {
            let err = sync
                .mutate_edge(&ChainEdge::new(name, "aaa", "bbb"), false)
                .await
                .unwrap_err();
            assert!(matches!(err, DoccacheError::InvalidPredicate(_)), "{}: {}", name, err);
        }
        assert_eq!(store.schema_update_count(), updates);
    }

    #[tokio::test]
    async fn test_invalid_edge_name() {
        let (store, sync) = sync();
        let err = sync
            .mutate_edge(&ChainEdge::new("bad name", "aaa", "bbb"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DoccacheError::InvalidPredicate(_)));
        assert_eq!(store.query_count(), 0);
    }
}
