use crate::provider::{BackendSettings, Provider};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an alternate config file.
pub const CONFIG_ENV: &str = "KILN_CONFIG";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: String,

    /// Ordered fallback list of `provider/model` identifiers.
    pub models: Vec<String>,

    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    /// Ollama server root, e.g. `http://localhost:11434`.
    pub ollama_host: Option<String>,

    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Expiry of cached generations. Default: 3600 (1 hour).
    pub ttl_secs: u64,
    /// Capacity of the in-memory backend.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a local edit is pushed.
    pub quiet_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { quiet_ms: 1000 }
    }
}

impl SyncConfig {
    pub fn quiet_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.quiet_ms)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Bearer token to user id.
    pub tokens: HashMap<String, String>,
    /// Accept `X-User-Id` as the principal. Only for use behind a proxy that
    /// authenticates and sets it.
    pub trust_user_header: bool,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .field("trust_user_header", &self.trust_user_header)
            .finish()
    }
}

fn redact(key: &Option<String>) -> Option<&'static str> {
    key.as_ref().map(|_| "[REDACTED]")
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("bind_addr", &self.bind_addr)
            .field("models", &self.models)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("ollama_host", &self.ollama_host)
            .field("cache", &self.cache)
            .field("sync", &self.sync)
            .field("auth", &self.auth)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("kiln"))
            .unwrap_or_else(|| PathBuf::from(".kiln"));

        Self {
            data_dir,
            bind_addr: "127.0.0.1:4000".to_string(),
            models: default_models(),
            openai_api_key: None,
            anthropic_api_key: None,
            openrouter_api_key: None,
            ollama_host: None,
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            auth: AuthSettings::default(),
        }
    }
}

fn default_models() -> Vec<String> {
    [
        "anthropic/claude-sonnet-4-5",
        "openai/gpt-4o-mini",
        "openrouter/meta-llama/llama-3.3-70b-instruct",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Path to the sessions SQLite database.
    pub fn sessions_db_path(&self) -> PathBuf {
        self.data_dir.join("sessions.db")
    }

    /// Path to the SQLite generation cache.
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("kiln").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".kiln/config.toml"))
    }

    /// Load from `$KILN_CONFIG` or the default location. A missing file
    /// yields defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path);
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Per-backend settings for [`crate::provider::Client::from_settings`].
    /// Backends left out here still pick up their environment variables.
    pub fn backend_settings(&self) -> HashMap<Provider, BackendSettings> {
        let mut settings = HashMap::new();
        let keyed = [
            (Provider::OpenAI, &self.openai_api_key),
            (Provider::Anthropic, &self.anthropic_api_key),
            (Provider::OpenRouter, &self.openrouter_api_key),
        ];
        for (provider, key) in keyed {
            if let Some(key) = key {
                settings.insert(
                    provider,
                    BackendSettings {
                        api_key: Some(key.clone()),
                        base_url: None,
                    },
                );
            }
        }
        if let Some(host) = &self.ollama_host {
            settings.insert(
                Provider::Ollama,
                BackendSettings {
                    api_key: None,
                    base_url: Some(format!("{}/v1", host.trim_end_matches('/'))),
                },
            );
        }
        settings
    }

    /// The model list, rejecting an empty one.
    pub fn fallback_models(&self) -> crate::Result<Vec<String>> {
        let models: Vec<String> = self
            .models
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect();
        if models.is_empty() {
            return Err(crate::Error::Config("`models` must list at least one model".into()));
        }
        Ok(models)
    }
}
