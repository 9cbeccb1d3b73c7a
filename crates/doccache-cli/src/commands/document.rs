//! Document and relationship commands.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use doccache_core::{ChainDocument, ChainEdge};
use doccache_graph::{DocumentSync, RequestConfig};

use crate::output;

#[derive(Args)]
pub struct GetArgs {
    /// Document hash
    pub hash: String,

    /// Include content groups
    #[arg(long)]
    pub content_groups: bool,

    /// Include certificates
    #[arg(long)]
    pub certificates: bool,

    /// Expand a relationship (repeatable)
    #[arg(long = "edge", value_name = "NAME")]
    pub edges: Vec<String>,

    /// Print the raw JSON instead of the formatted document
    #[arg(long)]
    pub raw: bool,
}

impl GetArgs {
    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            content_groups: self.content_groups,
            certificates: self.certificates,
            edges: self.edges.clone(),
        }
    }
}

/// Parse one chain document or a JSON array of them.
pub fn parse_documents(text: &str) -> Result<Vec<ChainDocument>> {
    let value: Value = serde_json::from_str(text).context("Invalid JSON")?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

fn read_documents(path: &Path) -> Result<Vec<ChainDocument>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_documents(&text).with_context(|| format!("In {}", path.display()))
}

pub async fn cmd_store(sync: &DocumentSync, file: &Path) -> Result<()> {
    let docs = read_documents(file)?;
    sync.prepare_schema().await?;

    for doc in &docs {
        let outcome = sync
            .store_document(doc)
            .await
            .with_context(|| format!("Failed to store document {}", doc.hash))?;
        output::print_outcome(&doc.hash, &outcome);
    }
    Ok(())
}

pub async fn cmd_delete(sync: &DocumentSync, file: &Path) -> Result<()> {
    let docs = read_documents(file)?;
    sync.prepare_schema().await?;

    for doc in &docs {
        let deleted = sync
            .delete_document(doc)
            .await
            .with_context(|| format!("Failed to delete document {}", doc.hash))?;
        if deleted {
            println!("{} {}", "deleted".red(), doc.hash);
        } else {
            println!("{} {}", "not found".dimmed(), doc.hash);
        }
    }
    Ok(())
}

pub async fn cmd_edge(sync: &DocumentSync, name: String, from: String, to: String, delete: bool) -> Result<()> {
    let edge = ChainEdge::new(name, from, to);
    sync.prepare_schema().await?;
    sync.mutate_edge(&edge, delete).await?;

    let verb = if delete { "removed".red() } else { "added".green() };
    println!(
        "{} {} {} {}",
        verb,
        edge.from.dimmed(),
        format!("-[{}]->", edge.name).yellow(),
        edge.to.dimmed()
    );
    Ok(())
}

pub async fn cmd_get(sync: &DocumentSync, args: GetArgs) -> Result<()> {
    let config = args.request_config();

    if args.raw {
        let map = sync
            .get_by_hash_as_map(&args.hash, &config)
            .await?
            .ok_or_else(|| anyhow!("Document not found: {}", args.hash))?;
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    let doc = sync
        .get_by_hash(&args.hash, &config)
        .await?
        .ok_or_else(|| anyhow!("Document not found: {}", args.hash))?;
    output::print_document(&doc, &config.edges);
    Ok(())
}

pub async fn cmd_uid(sync: &DocumentSync, hash: &str) -> Result<()> {
    match sync.get_uid(hash).await? {
        Some(uid) => println!("{}", uid),
        None => return Err(anyhow!("Document not found: {}", hash)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use doccache_graph::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, DocumentSync) {
        let store = Arc::new(MemoryStore::new());
        let sync = DocumentSync::new(store.clone());
        for hash in ["aaa", "bbb"] {
            let doc = ChainDocument {
                created_date: "2021-01-01T00:00:00.000".to_string(),
                ..ChainDocument::with_hash(hash)
            };
            sync.store_document(&doc).await.unwrap();
        }
        (store, sync)
    }

    #[test]
    fn test_parse_single_document() {
        let docs = parse_documents(
            r#"{
                "hash": "b0477",
                "creator": "dao.hypha",
                "created_date": "2020-11-12T18:27:47.000",
                "content_groups": [[{"label": "owner", "value": ["name", "johnnyhypha1"]}]],
                "certificates": []
            }"#,
        )
        .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].hash, "b0477");
        assert_eq!(docs[0].content_groups[0][0].value.type_tag(), "name");
    }

    #[test]
    fn test_parse_document_array() {
        let docs = parse_documents(r#"[{"hash": "a"}, {"hash": "b"}]"#).unwrap();
        let hashes: Vec<_> = docs.iter().map(|d| d.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_documents("not json").is_err());
        assert!(parse_documents(r#"{"creator": "no hash"}"#).is_err());
    }

    #[tokio::test]
    async fn test_edge_on_fresh_store_keeps_base_fields() {
        let (store, sync) = seeded().await;
        cmd_edge(&sync, "runs".to_string(), "aaa".to_string(), "bbb".to_string(), false)
            .await
            .unwrap();

        let fields = store.type_fields("Document");
        assert!(fields.contains(&"content_groups".to_string()));
        assert!(fields.contains(&"runs".to_string()));
    }

    #[tokio::test]
    async fn test_delete_on_fresh_store_prepares_schema() {
        let (store, sync) = seeded().await;
        let path = std::env::temp_dir().join(format!("doccache-delete-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"hash": "aaa"}"#).unwrap();

        let result = cmd_delete(&sync, &path).await;
        let _ = std::fs::remove_file(&path);
        result.unwrap();

        assert!(sync.schema().schema_ready().await.unwrap());
        assert!(store.type_fields("Document").contains(&"hash".to_string()));
        assert!(sync.get_uid("aaa").await.unwrap().is_none());
        assert!(sync.get_uid("bbb").await.unwrap().is_some());
    }
}
