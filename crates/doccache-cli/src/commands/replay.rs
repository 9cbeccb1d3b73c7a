//! Replay a recorded event stream.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Deserialize;
use tracing::info;

use doccache_core::{ChainDocument, ChainEdge};
use doccache_graph::{DgraphConfig, DocumentSync, MemoryStore, StoreOutcome};

use super::connect;

/// One line of an events file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Store { document: ChainDocument },
    Delete { document: ChainDocument },
    Edge {
        edge: ChainEdge,
        #[serde(default)]
        delete: bool,
    },
}

/// Counts of what a replay did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub missing: usize,
    pub edges: usize,
}

/// Parse the events file, skipping blank lines.
///
/// Returns each event with its 1-based line number.
pub fn parse_events(text: &str) -> Result<Vec<(usize, Event)>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map(|event| (i + 1, event))
                .with_context(|| format!("Invalid event on line {}", i + 1))
        })
        .collect()
}

/// Apply events in order, stopping at the first failure.
pub async fn apply(sync: &DocumentSync, events: &[(usize, Event)]) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (line, event) in events {
        match event {
            Event::Store { document } => {
                let outcome = sync
                    .store_document(document)
                    .await
                    .with_context(|| format!("Line {}: storing {}", line, document.hash))?;
                match outcome {
                    StoreOutcome::Created { .. } => summary.created += 1,
                    StoreOutcome::Updated { .. } => summary.updated += 1,
                    StoreOutcome::Unchanged { .. } => summary.unchanged += 1,
                }
            }
            Event::Delete { document } => {
                let deleted = sync
                    .delete_document(document)
                    .await
                    .with_context(|| format!("Line {}: deleting {}", line, document.hash))?;
                if deleted {
                    summary.deleted += 1;
                } else {
                    summary.missing += 1;
                }
            }
            Event::Edge { edge, delete } => {
                sync.mutate_edge(edge, *delete)
                    .await
                    .with_context(|| format!("Line {}: edge {}", line, edge.name))?;
                summary.edges += 1;
            }
        }
    }
    Ok(summary)
}

pub async fn execute(config: &DgraphConfig, file: &Path, dry_run: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let events = parse_events(&text)?;

    let sync = if dry_run {
        info!("Dry run, replaying into memory");
        DocumentSync::new(Arc::new(MemoryStore::new()))
    } else {
        connect(config).await?
    };
    sync.prepare_schema().await?;

    println!("{} {} events...", "Replaying".bold(), events.len());
    let summary = apply(&sync, &events).await?;

    println!("\n{}", "Replay complete:".green().bold());
    println!("  Created:       {}", summary.created.to_string().cyan());
    println!("  Updated:       {}", summary.updated.to_string().cyan());
    println!("  Unchanged:     {}", summary.unchanged.to_string().dimmed());
    println!("  Deleted:       {}", summary.deleted.to_string().cyan());
    println!("  Not found:     {}", summary.missing.to_string().dimmed());
    println!("  Edge changes:  {}", summary.edges.to_string().cyan());
    Ok(())
}
