//! Configuration loading and persistence.
//!
//! Host-supplied settings: service key, site domain, vendor push id and
//! where durable state lives. Read from `config.json` in the config
//! directory, then overridden by `PUSHBRIDGE_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

/// Default RichFlyer API domain.
pub const DEFAULT_API_URL: &str = "https://api.richflyer.net";
/// API version sent in `X-API-Version`.
pub const DEFAULT_API_VERSION: &str = "2017-04-01";
/// Service worker script registered by `initialize`.
pub const DEFAULT_SERVICE_WORKER_PATH: &str = "rf-serviceworker.js";

/// Where the auth token slot is kept.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// JSON file under the data directory.
    File,
    /// OS keyring entry.
    #[default]
    Keyring,
}

impl std::str::FromStr for TokenStorage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            other => anyhow::bail!("{other} is not a supported token storage. Use 'file' or 'keyring'."),
        }
    }
}

/// Configuration for the push bridge.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Base URL of the push backend API.
    pub api_url: String,
    /// Value of the `X-API-Version` header.
    pub api_version: String,
    /// SDK service key issued by the backend (`X-Service-Key`).
    pub service_key: String,
    /// Site domain allowed to receive push notifications.
    pub domain: String,
    /// Website push id of the vendor push certificate.
    pub website_push_id: String,
    /// Service worker script path registered on initialize.
    pub service_worker_path: String,
    /// Auth token slot backend.
    pub token_storage: TokenStorage,
    /// Mint an auth token right after a successful activation.
    pub prefetch_token: bool,
    /// Root of durable state. Derived from `domain` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            service_key: String::new(),
            domain: String::new(),
            website_push_id: String::new(),
            service_worker_path: DEFAULT_SERVICE_WORKER_PATH.to_string(),
            token_storage: TokenStorage::default(),
            prefetch_token: false,
            data_dir: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `PUSHBRIDGE_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(custom_dir) = std::env::var("PUSHBRIDGE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("pushbridge")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default config: {e}");
            Self::default()
        });
        config.apply_env_overrides();

        if crate::env::should_skip_keyring() {
            config.token_storage = TokenStorage::File;
        }

        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content).context("Failed to parse config.json")?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(api_url) = std::env::var("PUSHBRIDGE_API_URL") {
            self.api_url = api_url;
        }
        if let Ok(service_key) = std::env::var("PUSHBRIDGE_SERVICE_KEY") {
            self.service_key = service_key;
        }
        if let Ok(domain) = std::env::var("PUSHBRIDGE_DOMAIN") {
            self.domain = domain;
        }
        if let Ok(push_id) = std::env::var("PUSHBRIDGE_WEBSITE_PUSH_ID") {
            self.website_push_id = push_id;
        }
        if let Ok(path) = std::env::var("PUSHBRIDGE_SERVICE_WORKER_PATH") {
            self.service_worker_path = path;
        }
        if let Ok(storage) = std::env::var("PUSHBRIDGE_TOKEN_STORAGE") {
            match storage.parse() {
                Ok(storage) => self.token_storage = storage,
                Err(e) => log::warn!("Ignoring PUSHBRIDGE_TOKEN_STORAGE: {e}"),
            }
        }
        if let Ok(data_dir) = std::env::var("PUSHBRIDGE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(data_dir));
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // The service key is a credential
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Set one field by its config-file name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => self.api_url = value.to_string(),
            "api_version" => self.api_version = value.to_string(),
            "service_key" => self.service_key = value.to_string(),
            "domain" => self.domain = value.to_string(),
            "website_push_id" => self.website_push_id = value.to_string(),
            "service_worker_path" => self.service_worker_path = value.to_string(),
            "token_storage" => self.token_storage = value.parse()?,
            "prefetch_token" => {
                self.prefetch_token = value
                    .parse()
                    .with_context(|| format!("prefetch_token must be true or false, got '{value}'"))?;
            }
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            other => anyhow::bail!("Unknown config key '{other}'"),
        }
        Ok(())
    }

    /// Ensure the fields every backend call needs are present.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.service_key.is_empty(), "service_key is not configured");
        anyhow::ensure!(!self.domain.is_empty(), "domain is not configured");
        Ok(())
    }

    /// Directory holding durable state for this origin.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let origin = if self.domain.is_empty() {
            "default".to_string()
        } else {
            origin_slug(&self.domain)
        };
        Ok(dirs::data_dir()
            .context("Could not determine data directory")?
            .join("pushbridge")
            .join(origin))
    }

    /// Origin key the auth token slot is scoped to.
    pub fn origin(&self) -> String {
        origin_slug(&self.domain)
    }
}

/// Filesystem- and keyring-safe form of a domain.
fn origin_slug(domain: &str) -> String {
    domain
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
