//! Host configuration.
//!
//! Loaded from `~/.config/rybu-offline/config.json` when present, then
//! overridden by `RYBU_ORIGIN`, `RYBU_CACHE_VERSION` and `RYBU_CACHE_DIR`
//! (a `.env` file is read first). Cache buckets live under
//! `~/.cache/rybu-offline/` unless `cache_dir` says otherwise.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rybu_offline_core::{AssetManifest, Scope, Url, WorkerConfig};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "rybu-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_ORIGIN: &str = "https://rybuhome.com/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub version: String,
    pub font_hosts: Vec<String>,
    /// Replaces the built-in RybuHome manifest
    pub manifest: Option<AssetManifest>,
    pub cache_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            version: rybu_offline_core::worker::DEFAULT_VERSION.to_string(),
            font_hosts: rybu_offline_core::http::DEFAULT_FONT_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            manifest: None,
            cache_dir: None,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load from `path`, or the default location, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup("RYBU_ORIGIN") {
            self.origin = origin;
        }
        if let Some(version) = lookup("RYBU_CACHE_VERSION") {
            self.version = version;
        }
        if let Some(dir) = lookup("RYBU_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).with_context(|| format!("Invalid origin: {}", self.origin))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn scope(&self) -> Result<Scope> {
        Ok(Scope::new(self.origin_url()?).with_font_hosts(self.font_hosts.iter().cloned()))
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        let config = WorkerConfig::new(self.version.clone(), self.origin_url()?).with_scope(self.scope()?);
        Ok(match self.manifest {
            Some(ref manifest) => config.with_manifest(manifest.clone()),
            None => config,
        })
    }
}
