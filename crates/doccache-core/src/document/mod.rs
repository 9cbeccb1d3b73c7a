//! Documents and their owned sub-structures.

pub mod model;

use crate::chain::model::{ChainCertificate, ChainContent, ChainDocument};
use crate::chain::{normalize_timestamp, CHECKSUM_TYPE};
use crate::error::{ModelError, ModelResult};
use model::{
    Certificate, Content, ContentGroup, Document, CERTIFICATE_TYPE, CONTENT_GROUP_TYPE,
    CONTENT_TYPE, DOCUMENT_TYPE,
};

impl Document {
    /// Build a new, not yet persisted document from its chain form.
    ///
    /// Sequences are assigned from chain positions starting at 1. Checksum
    /// references are left unset; resolving them needs the store.
    pub fn from_chain(chain: &ChainDocument) -> ModelResult<Self> {
        if chain.hash.trim().is_empty() {
            return Err(ModelError::MissingHash);
        }

        let content_groups = chain
            .content_groups
            .iter()
            .enumerate()
            .map(|(i, group)| ContentGroup::from_chain(group, i as i64 + 1))
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(Self {
            uid: None,
            hash: chain.hash.clone(),
            creator: chain.creator.clone(),
            created_date: normalize_timestamp("created_date", &chain.created_date)?,
            content_groups,
            certificates: Certificate::from_chain_list(&chain.certificates)?,
            node_types: vec![DOCUMENT_TYPE.to_string()],
            edges: Default::default(),
        })
    }

    /// A bare pointer to an already persisted document.
    pub fn reference(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Default::default()
        }
    }

    /// An update payload that appends `certificates` to the document `uid`.
    pub fn certificate_update(uid: impl Into<String>, certificates: Vec<Certificate>) -> Self {
        Self {
            uid: Some(uid.into()),
            certificates,
            node_types: vec![DOCUMENT_TYPE.to_string()],
            ..Default::default()
        }
    }

    /// Contents whose value is the hash of another document.
    pub fn checksum_contents(&self) -> impl Iterator<Item = &Content> {
        self.content_groups
            .iter()
            .flat_map(|group| group.contents.iter())
            .filter(|content| content.is_checksum())
    }

    /// Mutable access to checksum contents, for attaching resolved references.
    pub fn checksum_contents_mut(&mut self) -> impl Iterator<Item = &mut Content> {
        self.content_groups
            .iter_mut()
            .flat_map(|group| group.contents.iter_mut())
            .filter(|content| content.is_checksum())
    }

    /// Highest stored certificate sequence, 0 when there are none.
    pub fn max_certificate_sequence(&self) -> i64 {
        self.certificates.iter().map(|c| c.sequence).max().unwrap_or(0)
    }

    /// Append the certificates not yet present and return them.
    ///
    /// Certificates are append-only, so anything at or below the current
    /// highest sequence is already stored and skipped.
    pub fn merge_certificates(&mut self, incoming: &[Certificate]) -> Vec<Certificate> {
        let max = self.max_certificate_sequence();
        let mut added: Vec<Certificate> = incoming
            .iter()
            .filter(|c| c.sequence > max)
            .cloned()
            .collect();
        added.sort_by_key(|c| c.sequence);
        added.dedup_by_key(|c| c.sequence);

        self.certificates.extend(added.iter().cloned());
        self.certificates.sort_by_key(|c| c.sequence);
        added
    }

    /// Relationship targets under `name`, empty when not expanded.
    pub fn related(&self, name: &str) -> &[Document] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ContentGroup {
    fn from_chain(contents: &[ChainContent], sequence: i64) -> ModelResult<Self> {
        let contents = contents
            .iter()
            .enumerate()
            .map(|(i, content)| Content::from_chain(content, i as i64 + 1))
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(Self {
            uid: None,
            sequence,
            contents,
            node_types: vec![CONTENT_GROUP_TYPE.to_string()],
        })
    }

    /// Content by label, first match.
    pub fn get(&self, label: &str) -> Option<&Content> {
        self.contents.iter().find(|c| c.label == label)
    }
}

impl Content {
    fn from_chain(content: &ChainContent, sequence: i64) -> ModelResult<Self> {
        let content_type = content.value.type_tag().to_string();
        if content_type == CHECKSUM_TYPE && !content.value.1.is_string() {
            return Err(ModelError::InvalidContent {
                label: content.label.clone(),
                reason: "checksum256 value must be a string".to_string(),
            });
        }

        Ok(Self {
            uid: None,
            label: content.label.clone(),
            value: content.value.as_text(),
            content_type,
            sequence,
            document: Vec::new(),
            node_types: vec![CONTENT_TYPE.to_string()],
        })
    }

    /// Whether the value is a document hash.
    pub fn is_checksum(&self) -> bool {
        self.content_type == CHECKSUM_TYPE
    }

    /// Uid of the referenced document, if resolved.
    pub fn referenced_uid(&self) -> Option<&str> {
        self.document.first().and_then(|d| d.uid.as_deref())
    }

    /// Point this content at the document `uid`.
    pub fn set_reference(&mut self, uid: impl Into<String>) {
        self.document = vec![Document::reference(uid)];
    }
}

impl Certificate {
    fn from_chain(cert: &ChainCertificate, sequence: i64) -> ModelResult<Self> {
        Ok(Self {
            uid: None,
            certifier: cert.certifier.clone(),
            notes: cert.notes.clone(),
            certification_date: normalize_timestamp("certification_date", &cert.certification_date)?,
            sequence,
            node_types: vec![CERTIFICATE_TYPE.to_string()],
        })
    }

    /// Convert a chain certificate list, numbering from 1 in chain order.
    pub fn from_chain_list(certs: &[ChainCertificate]) -> ModelResult<Vec<Self>> {
        certs
            .iter()
            .enumerate()
            .map(|(i, cert)| Self::from_chain(cert, i as i64 + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::model::ChainContent;
    use serde_json::json;

    fn chain_doc() -> ChainDocument {
        ChainDocument {
            hash: "aaa".to_string(),
            creator: "dao.hypha".to_string(),
            created_date: "2021-01-01T00:00:00.000".to_string(),
            content_groups: vec![
                vec![
                    ChainContent::new("content_group_label", "string", json!("details")),
                    ChainContent::new("parent", CHECKSUM_TYPE, json!("bbb")),
                ],
                vec![ChainContent::new("amount", "int64", json!(7))],
            ],
            certificates: vec![
                ChainCertificate {
                    certifier: "alice".to_string(),
                    notes: "first".to_string(),
                    certification_date: "2021-01-02T00:00:00.000".to_string(),
                },
                ChainCertificate {
                    certifier: "bob".to_string(),
                    notes: "second".to_string(),
                    certification_date: "2021-01-03T00:00:00.000".to_string(),
                },
            ],
        }
    }

    fn cert(sequence: i64) -> Certificate {
        Certificate {
            certifier: format!("c{}", sequence),
            sequence,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_chain_assigns_sequences() {
        let doc = Document::from_chain(&chain_doc()).unwrap();

        assert_eq!(doc.uid, None);
        assert_eq!(doc.created_date, "2021-01-01T00:00:00Z");
        assert_eq!(doc.content_groups.len(), 2);
        assert_eq!(doc.content_groups[0].sequence, 1);
        assert_eq!(doc.content_groups[1].sequence, 2);
        assert_eq!(doc.content_groups[0].contents[1].sequence, 2);
        assert_eq!(doc.content_groups[1].contents[0].value, "7");
        assert_eq!(
            doc.certificates.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(doc.node_types, vec!["Document".to_string()]);
    }

    #[test]
    fn test_checksum_contents() {
        let mut doc = Document::from_chain(&chain_doc()).unwrap();
        let values: Vec<_> = doc.checksum_contents().map(|c| c.value.clone()).collect();
        assert_eq!(values, vec!["bbb".to_string()]);

        for content in doc.checksum_contents_mut() {
            content.set_reference("0x2");
        }
        let parent = doc.content_groups[0].get("parent").unwrap();
        assert_eq!(parent.referenced_uid(), Some("0x2"));
    }

    #[test]
    fn test_checksum_value_must_be_string() {
        let mut chain = chain_doc();
        chain.content_groups[0][1] = ChainContent::new("parent", CHECKSUM_TYPE, json!(12));
        let err = Document::from_chain(&chain).unwrap_err();
        assert!(matches!(err, ModelError::InvalidContent { .. }));
    }

    #[test]
    fn test_from_chain_requires_hash() {
        let mut chain = chain_doc();
        chain.hash = " ".to_string();
        assert!(matches!(Document::from_chain(&chain), Err(ModelError::MissingHash)));
    }

    #[test]
    fn test_merge_certificates_appends_only_new() {
        let mut doc = Document {
            certificates: vec![cert(1), cert(2)],
            ..Default::default()
        };

        let added = doc.merge_certificates(&[cert(1), cert(2), cert(3)]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].sequence, 3);
        assert_eq!(
            doc.certificates.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let again = doc.merge_certificates(&[cert(1), cert(2), cert(3)]);
        assert!(again.is_empty());
    }

    #[test]
    fn test_reference_serializes_uid_only() {
        let value = serde_json::to_value(Document::reference("0x9")).unwrap();
        assert_eq!(value, json!({"uid": "0x9"}));
    }

    #[test]
    fn test_decode_with_relationships() {
        let value = json!({
            "uid": "0x1",
            "hash": "aaa",
            "dgraph.type": ["Document"],
            "certificates": [{"uid": "0x3", "certifier": "alice", "certification_sequence": 1}],
            "runs": [{"uid": "0x2", "hash": "bbb"}]
        });

        let doc: Document = serde_json::from_value(value).unwrap();
        assert_eq!(doc.certificates[0].sequence, 1);
        assert_eq!(doc.related("runs").len(), 1);
        assert_eq!(doc.related("runs")[0].hash, "bbb");
        assert!(doc.related("missing").is_empty());
    }
}
