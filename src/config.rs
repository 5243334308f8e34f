use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ClientError;

/// Programmatic overrides, applied on top of the TOML file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Path to config file
    pub config: Option<PathBuf>,

    /// API base URL
    pub base_url: Option<String>,

    /// Path to data directory
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub namespace: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8019/api/".to_string(),
            timeout_secs: 30,
            user_agent: format!("triptales/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: "triptales_prefs".to_string(),
        }
    }
}

impl ApiConfig {
    /// Parsed base URL, always ending in `/` so relative paths join under it.
    pub fn base(&self) -> Result<url::Url, ClientError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        url::Url::parse(&raw).map_err(|e| ClientError::Config(format!("{}: {}", raw, e)))
    }
}

impl Config {
    pub fn load(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(overrides);
        let config_path = overrides
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Some(ref base_url) = overrides.base_url {
            config.api.base_url = base_url.clone();
        }

        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("triptales.db"));
        }

        Ok(config)
    }

    pub fn data_dir(overrides: &ConfigOverrides) -> PathBuf {
        overrides.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(".triptales")
        })
    }

    /// Location of the token database. `load` always fills this in.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("triptales.db"))
    }
}
