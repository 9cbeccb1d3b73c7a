//! Schema and health commands.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use doccache_graph::{DgraphClient, DgraphConfig, DocumentSync};

/// Ensure the base schema and list the `Document` predicates.
pub async fn cmd_schema(sync: &DocumentSync) -> Result<()> {
    sync.prepare_schema().await?;

    let predicates = sync.schema().document_predicates().await;
    println!("{} ({})", "Document predicates".bold(), predicates.len());
    for name in &predicates {
        println!("  {} {}", "•".dimmed(), name);
    }
    Ok(())
}

/// Show Dgraph health and whether the base schema exists.
pub async fn cmd_status(config: &DgraphConfig) -> Result<()> {
    println!("{}", "Dgraph Status".bold());
    println!("{}", "─".repeat(40));
    println!("  URL:     {}", config.url.cyan());

    let client = DgraphClient::new(config)?;
    let health = match client.health().await {
        Ok(health) => health,
        Err(e) => {
            println!("  Health:  {}", "unreachable".red());
            println!("  {}", e.to_string().dimmed());
            println!("{}", "─".repeat(40));
            return Ok(());
        }
    };

    for node in &health {
        let status = if node.status == "healthy" {
            node.status.green()
        } else {
            node.status.yellow()
        };
        println!("  {:<8} {} {} {}", format!("{}:", node.instance), status, node.address.dimmed(), node.version.dimmed());
    }

    let sync = DocumentSync::new(Arc::new(client));
    let ready = sync.schema().schema_ready().await?;
    if ready {
        println!("  Schema:  {}", "ready".green());
    } else {
        println!("  Schema:  {}", "missing (run 'doccache schema')".yellow());
    }
    println!("{}", "─".repeat(40));
    Ok(())
}
