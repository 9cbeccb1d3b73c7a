//! Doccache Core Library
//!
//! Storage-independent document model for the doccache graph mirror, the
//! chain input types an indexer emits, and the transformation between them.

pub mod chain;
pub mod document;
pub mod error;

pub use chain::model::{ChainCertificate, ChainContent, ChainDocument, ChainEdge, ChainValue};
pub use document::model::{Certificate, Content, ContentGroup, Document};
pub use error::{ModelError, ModelResult};
