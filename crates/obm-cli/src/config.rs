use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use obm_merger::MergerConfig;
use obm_server::ServerConfig;
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

/// Settings for `obm run`, loaded from TOML and overridden by flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub merger: MergerConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("one-blocks"),
            destination_dir: PathBuf::from("merged-blocks"),
            merger: MergerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Config file (if any) with command-line overrides applied, validated.
    pub fn from_args(args: &RunArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dir) = &args.source {
            config.source_dir = dir.clone();
        }
        if let Some(dir) = &args.destination {
            config.destination_dir = dir.clone();
        }
        if let Some(chunk_size) = args.chunk_size {
            config.merger.chunk_size = chunk_size;
        }
        if let Some(minimal) = args.minimal_block_num {
            config.merger.minimal_block_num = minimal;
        }
        if let Some(bind) = args.bind {
            config.server.bind_addr = bind;
        }
        config.merger.validate()?;
        Ok(config)
    }
}
