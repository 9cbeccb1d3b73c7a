//! Batched hash to uid resolution.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::DoccacheResult;
use crate::queries::uids_by_hashes;
use crate::store::GraphStore;

#[derive(Debug, Default, Deserialize)]
struct HashUids {
    #[serde(default)]
    docs: Vec<HashUid>,
}

#[derive(Debug, Deserialize)]
struct HashUid {
    uid: String,
    hash: String,
}

/// Maps document hashes to the uids the store assigned them.
///
/// This is the only way one document comes to point at another: nothing
/// here creates documents, unknown hashes are simply left out.
#[derive(Clone)]
pub struct HashResolver {
    store: Arc<dyn GraphStore>,
}

impl HashResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Resolve all `hashes` in one query.
    pub async fn resolve<I, S>(&self, hashes: I) -> DoccacheResult<HashMap<String, String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = hashes
            .into_iter()
            .map(|h| h.as_ref().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let requested = wanted.len();
        let data = self
            .store
            .query(&uids_by_hashes(wanted.into_iter().collect()))
            .await?;
        let decoded: HashUids = serde_json::from_value(data)?;
        let map: HashMap<String, String> = decoded
            .docs
            .into_iter()
            .map(|doc| (doc.hash, doc.uid))
            .collect();

        debug!(requested, resolved = map.len(), "Resolved document hashes");
        Ok(map)
    }

    /// Resolve a single hash.
    pub async fn resolve_one(&self, hash: &str) -> DoccacheResult<Option<String>> {
        let mut map = self.resolve([hash]).await?;
        Ok(map.remove(hash))
    }
}
