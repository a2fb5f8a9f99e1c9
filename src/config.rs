use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HypnosConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embeddings: EmbeddingsConfig,
    pub rerank: RerankConfig,
    pub retrieval: RetrievalConfig,
    pub sleep: SleepConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub agent_id: String,
}

/// Embedding provider selection. `provider = "none"` disables semantic search
/// entirely; retrieval falls back to BM25 alone.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub model: String,
    /// Query instruction prefix override. The literal `"none"` disables the
    /// prefix even for models that default to one.
    pub instruction: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RerankConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub rrf_k: usize,
    pub semantic_top_k: usize,
    pub candidate_multiplier: usize,
    pub min_vitality: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SleepConfig {
    pub tidy_threshold: f64,
    pub max_snapshots_per_memory: usize,
    pub access_growth: f64,
    pub boot_growth: f64,
}

impl Default for HypnosConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            rerank: RerankConfig::default(),
            retrieval: RetrievalConfig::default(),
            sleep: SleepConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./agent-memory.db".into(),
            agent_id: "default".into(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            model: String::new(),
            instruction: None,
            api_key: None,
            base_url: None,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            model: String::new(),
            api_key: None,
            base_url: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            semantic_top_k: 50,
            candidate_multiplier: 3,
            min_vitality: 0.0,
        }
    }
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            tidy_threshold: 0.05,
            max_snapshots_per_memory: 10,
            access_growth: 1.5,
            boot_growth: 1.1,
        }
    }
}

/// Returns `~/.hypnos/`
pub fn default_hypnos_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".hypnos")
}

/// Returns the default config file path: `~/.hypnos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_hypnos_dir().join("config.toml")
}

impl HypnosConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            HypnosConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the `AGENT_MEMORY_*` environment contract on top of file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AGENT_MEMORY_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_AGENT_ID") {
            self.storage.agent_id = val;
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_EMBEDDINGS_PROVIDER") {
            self.embeddings.provider = val;
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_EMBEDDINGS_MODEL") {
            self.embeddings.model = val;
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_EMBEDDINGS_INSTRUCTION") {
            self.embeddings.instruction = Some(val);
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_RERANK_PROVIDER") {
            self.rerank.provider = val;
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_RERANK_MODEL") {
            self.rerank.model = val;
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_RERANK_API_KEY") {
            self.rerank.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_RERANK_BASE_URL") {
            self.rerank.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("AGENT_MEMORY_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
