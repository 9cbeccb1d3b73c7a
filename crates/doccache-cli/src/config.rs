//! Connection settings: TOML file, then environment, then flags.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use doccache_graph::DgraphConfig;

/// Layout of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub dgraph: DgraphConfig,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid config file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In {}", path.display()))
    }
}

/// Build the Dgraph settings.
///
/// `url` and `auth_token` come from clap, which already prefers the flag over
/// `DGRAPH_URL` / `DGRAPH_AUTH_TOKEN`; either one overrides the file.
pub fn resolve(path: Option<&Path>, url: Option<String>, auth_token: Option<String>) -> Result<DgraphConfig> {
    let mut config = match path {
        Some(path) => FileConfig::load(path)?.dgraph,
        None => DgraphConfig::default(),
    };

    if let Some(url) = url {
        config.url = url;
    }
    if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
        config.auth_token = Some(token);
    }
    Ok(config)
}
