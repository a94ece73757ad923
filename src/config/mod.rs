mod file_config;

pub use file_config::{AssetsConfig, FileConfig};

use crate::asset_cache::AssetCacheConfig;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use reqwest::Url;
use std::path::PathBuf;

pub const DEFAULT_CACHE_PREFIX: &str = "sheetmusic-cache-";
pub const DEFAULT_CACHE_VERSION: &str = "v2";
pub const DEFAULT_ASSET_ORIGIN: &str = "http://localhost:8000/";
pub const DEFAULT_ASSET_PATHS: &[&str] = &[
    "./",
    "./index.html",
    "./styles.css",
    "./db.js",
    "./ui.js",
    "./manifest.json",
];

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub fetch_timeout_sec: u64,
    pub asset_origin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub fetch_timeout_sec: u64,
    pub assets: AssetSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSettings {
    pub origin: Url,
    pub cache_prefix: String,
    pub cache_version: String,
    pub paths: Vec<String>,
}

impl AssetSettings {
    pub fn cache_config(&self) -> AssetCacheConfig {
        AssetCacheConfig {
            origin: self.origin.clone(),
            cache_prefix: self.cache_prefix.clone(),
            cache_version: self.cache_version.clone(),
            asset_paths: self.paths.clone(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let fetch_timeout_sec = file.fetch_timeout_sec.unwrap_or(cli.fetch_timeout_sec);

        let assets_file = file.assets.unwrap_or_default();
        let origin = assets_file
            .origin
            .or_else(|| cli.asset_origin.clone())
            .unwrap_or_else(|| DEFAULT_ASSET_ORIGIN.to_string());
        let origin = parse_origin(&origin)?;

        let paths = assets_file
            .paths
            .unwrap_or_else(|| DEFAULT_ASSET_PATHS.iter().map(|p| p.to_string()).collect());
        if paths.is_empty() {
            bail!("[assets] paths must list at least one asset");
        }

        let assets = AssetSettings {
            origin,
            cache_prefix: assets_file
                .cache_prefix
                .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string()),
            cache_version: assets_file
                .cache_version
                .unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string()),
            paths,
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            fetch_timeout_sec,
            assets,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.db_dir.join("state.db")
    }

    pub fn assets_db_path(&self) -> PathBuf {
        self.db_dir.join("assets.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

/// Relative asset paths resolve against the origin as a directory, so it
/// always ends with a slash.
fn parse_origin(origin: &str) -> Result<Url> {
    let with_slash = if origin.ends_with('/') {
        origin.to_string()
    } else {
        format!("{}/", origin)
    };
    let url = Url::parse(&with_slash).with_context(|| format!("Invalid asset origin: {}", origin))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Asset origin must be http or https: {}", origin);
    }
    Ok(url)
}
