//! Terminal output formatting.

use colored::Colorize;

use doccache_core::{Content, Document};
use doccache_graph::StoreOutcome;

/// Print the result of storing one document.
pub fn print_outcome(hash: &str, outcome: &StoreOutcome) {
    match outcome {
        StoreOutcome::Created { uid } => {
            println!("{} {} {}", "created".green(), hash, format!("({})", uid).dimmed())
        }
        StoreOutcome::Updated { uid, certificates_added } => println!(
            "{} {} {} +{} certificate(s)",
            "updated".yellow(),
            hash,
            format!("({})", uid).dimmed(),
            certificates_added
        ),
        StoreOutcome::Unchanged { uid } => {
            println!("{} {} {}", "unchanged".dimmed(), hash, format!("({})", uid).dimmed())
        }
    }
}

/// Print a document with whatever sections were fetched.
pub fn print_document(doc: &Document, edges: &[String]) {
    print_header(doc);

    if !doc.content_groups.is_empty() {
        println!();
        println!("{}", "Content Groups".bold());
        for group in &doc.content_groups {
            println!("  {} {}", "group".dimmed(), group.sequence);
            for content in &group.contents {
                println!("    {}", format_content(content));
            }
        }
    }

    if !doc.certificates.is_empty() {
        println!();
        println!("{}", "Certificates".bold());
        for cert in &doc.certificates {
            println!(
                "  {}. {} {} {}",
                cert.sequence,
                cert.certifier.cyan(),
                cert.certification_date.dimmed(),
                cert.notes
            );
        }
    }

    for name in edges {
        let related = doc.related(name);
        println!();
        println!("{} ({})", name.yellow().bold(), related.len());
        for target in related {
            println!(
                "  {} {} {}",
                "→".dimmed(),
                target.hash,
                target.uid.as_deref().unwrap_or("").dimmed()
            );
        }
    }
}

fn print_header(doc: &Document) {
    println!(
        "{} {}",
        doc.hash.cyan().bold(),
        format!("({})", doc.uid.as_deref().unwrap_or("?")).dimmed()
    );
    println!("{}: {}", "Creator".bold(), doc.creator);
    println!("{}: {}", "Created".bold(), doc.created_date);
}

fn format_content(content: &Content) -> String {
    let mut line = format!(
        "{} {} {}",
        content.label.bold(),
        format!("[{}]", content.content_type).dimmed(),
        content.value
    );
    if let Some(uid) = content.referenced_uid() {
        line.push_str(&format!(" {}", format!("-> {}", uid).green()));
    }
    line
}
