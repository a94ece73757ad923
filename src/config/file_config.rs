use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub fetch_timeout_sec: Option<u64>,

    pub assets: Option<AssetsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    /// Where the application shell is served from, e.g. "https://example.org/sheetmusic/"
    pub origin: Option<String>,
    pub cache_prefix: Option<String>,
    pub cache_version: Option<String>,
    /// The complete list of shell assets, relative to `origin`.
    pub paths: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
