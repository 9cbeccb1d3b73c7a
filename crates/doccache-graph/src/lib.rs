//! Doccache Graph
//!
//! Mirrors chain documents into Dgraph: schema management, batched hash
//! resolution, query construction and the document synchronizer.

pub mod client;
pub mod error;
pub mod memory;
pub mod queries;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod sync;

pub use client::{DgraphClient, DgraphConfig, HealthInfo};
pub use error::{DoccacheError, DoccacheResult, Endpoint};
pub use memory::MemoryStore;
pub use queries::RequestConfig;
pub use resolver::HashResolver;
pub use schema::{Schema, SchemaRegistry};
pub use store::GraphStore;
pub use sync::{DocumentSync, StoreOutcome};
