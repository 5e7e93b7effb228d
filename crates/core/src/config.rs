//! Configuration management for taxguide.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - A YAML file (`taxguide.yaml`, or the path in `TAXGUIDE_CONFIG`)
//! - Environment variables
//! - Command-line flags (`AppConfig::with_overrides`)
//!
//! Every section is a closed record with fixed fields; unknown keys in the
//! YAML file are rejected so typos surface at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "taxguide.yaml";

/// Seven days, the lifetime of a cached query embedding.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Providers the LLM factory knows how to build.
pub const KNOWN_LLM_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Providers the embedding factory knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 3] = ["mock", "ollama", "openai"];

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Path of the YAML file this config was merged from, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Chat model used for answer generation
    pub llm: LlmSettings,

    /// Embedding model used for query vectors
    pub embedding: EmbeddingSettings,

    /// Document store holding the official-source chunks
    pub store: StoreSettings,

    /// Query-embedding cache
    pub cache: CacheSettings,

    /// Retrieval and redundancy-reduction tuning
    pub retrieval: RetrievalSettings,

    /// Published per-million-token prices used for cost accounting
    pub pricing: PricingSettings,

    /// HTTP server binding for `taxguide serve`
    pub server: ServerSettings,

    /// Logging preferences
    pub logging: LoggingSettings,

    /// Verbose mode (enables debug logging)
    #[serde(skip)]
    pub verbose: bool,
}

/// Chat provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct LlmSettings {
    /// Provider identifier ("ollama", "openai")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Optional custom endpoint URL
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum completion tokens
    pub max_tokens: u32,

    /// YAML prompt definition replacing the built-in answer prompt
    pub prompt_file: Option<PathBuf>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
            temperature: 0.2,
            max_tokens: 1200,
            prompt_file: None,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EmbeddingSettings {
    /// Provider identifier ("mock", "ollama", "openai")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Vector length produced by the model
    pub dimensions: usize,

    /// Optional custom endpoint URL
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
            api_key_env: None,
        }
    }
}

/// Kind of document store backing retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process store, optionally seeded from a JSON file
    Memory,
    /// Remote hybrid-search RPC over HTTP
    Rpc,
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreSettings {
    pub kind: StoreKind,

    /// Base URL of the RPC endpoint
    pub endpoint: Option<String>,

    /// Name of the hybrid search function exposed by the store
    pub function: String,

    /// Environment variable holding the store API key
    pub api_key_env: Option<String>,

    /// Minimum semantic similarity the store should consider
    pub similarity_threshold: f32,

    /// JSON file of documents to load into the memory store
    pub seed_file: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            endpoint: None,
            function: "hybrid_search".to_string(),
            api_key_env: None,
            similarity_threshold: 0.3,
            seed_file: None,
        }
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

/// Embedding cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheSettings {
    pub backend: CacheBackend,

    /// Redis connection URL (redis backend only)
    pub redis_url: Option<String>,

    /// Entry lifetime in seconds
    pub ttl_secs: u64,

    /// Maximum in-memory entries (memory backend only)
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: 10_000,
        }
    }
}

/// Retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RetrievalSettings {
    /// Chunks handed to the generator
    pub top_k: usize,

    /// Candidates fetched per kept chunk before redundancy reduction
    pub candidate_multiplier: usize,

    /// MMR trade-off; 1.0 is pure relevance
    pub mmr_lambda: f32,

    /// Similarity above which a candidate counts as a duplicate
    pub duplicate_threshold: f32,

    /// Optional cap on chunks kept from one source document
    pub max_chunks_per_source: Option<usize>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 6,
            candidate_multiplier: 2,
            mmr_lambda: 0.9,
            duplicate_threshold: 0.95,
            max_chunks_per_source: None,
        }
    }
}

/// USD prices per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PricingSettings {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub embedding_per_million: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            input_per_million: 0.15,
            output_per_million: 0.60,
            embedding_per_million: 0.02,
        }
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Logging preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive, e.g. "info" or "taxguide_rag=debug"
    pub level: Option<String>,

    /// Colored output (ignored when `json` is set)
    pub color: Option<bool>,

    /// One JSON object per log line
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from the YAML file (if present) and environment.
    ///
    /// Environment variables:
    /// - `TAXGUIDE_CONFIG`: Path to config file
    /// - `TAXGUIDE_PROVIDER`: LLM provider
    /// - `TAXGUIDE_MODEL`: Model identifier
    /// - `TAXGUIDE_LLM_ENDPOINT`: LLM endpoint URL
    /// - `TAXGUIDE_STORE_URL`: Document store RPC endpoint (switches to the rpc store)
    /// - `TAXGUIDE_REDIS_URL`: Redis URL (switches to the redis cache)
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use taxguide_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Provider: {}", config.llm.provider);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with an explicit file taking precedence over
    /// `TAXGUIDE_CONFIG` and the working-directory lookup.
    pub fn load_from(path: Option<&Path>) -> AppResult<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("TAXGUIDE_CONFIG").map(PathBuf::from).ok())
            .or_else(|| {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            });

        let mut config = match config_path {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse a YAML config file. Missing sections fall back to defaults.
    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: AppConfig = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values.
    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("TAXGUIDE_PROVIDER") {
            self.llm.provider = provider;
        }

        if let Ok(model) = std::env::var("TAXGUIDE_MODEL") {
            self.llm.model = model;
        }

        if let Ok(endpoint) = std::env::var("TAXGUIDE_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if let Ok(url) = std::env::var("TAXGUIDE_STORE_URL") {
            self.store.kind = StoreKind::Rpc;
            self.store.endpoint = Some(url);
        }

        if let Ok(url) = std::env::var("TAXGUIDE_REDIS_URL") {
            self.cache.backend = CacheBackend::Redis;
            self.cache.redis_url = Some(url);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.logging.color = Some(false);
        }
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over both the YAML file and environment.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.logging.level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.logging.level.is_none() {
                self.logging.level = Some("debug".to_string());
            }
        }

        if no_color {
            self.logging.color = Some(false);
        }

        self
    }

    /// Whether colored log output is disabled.
    pub fn no_color(&self) -> bool {
        self.logging.color == Some(false)
    }

    /// Resolve an API key from the environment variable named in `env_name`.
    pub fn resolve_secret(env_name: Option<&str>) -> Option<String> {
        env_name.and_then(|name| std::env::var(name).ok())
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.llm.provider.to_lowercase();
        if !KNOWN_LLM_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        let embedding_provider = self.embedding.provider.to_lowercase();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        // Hosted providers need their key up front
        for (name, env) in [
            (provider.as_str(), self.llm.api_key_env.as_deref()),
            (embedding_provider.as_str(), self.embedding.api_key_env.as_deref()),
        ] {
            if name == "openai" {
                let env = env.unwrap_or("OPENAI_API_KEY");
                if std::env::var(env).is_err() {
                    return Err(AppError::Config(format!(
                        "API key not found in environment variable: {}",
                        env
                    )));
                }
            }
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 || self.retrieval.candidate_multiplier == 0 {
            return Err(AppError::Config(
                "retrieval.topK and retrieval.candidateMultiplier must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("retrieval.mmrLambda", self.retrieval.mmr_lambda),
            ("retrieval.duplicateThreshold", self.retrieval.duplicate_threshold),
            ("store.similarityThreshold", self.store.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.store.kind == StoreKind::Rpc && self.store.endpoint.is_none() {
            return Err(AppError::Config(
                "store.endpoint is required when store.kind is rpc".to_string(),
            ));
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(AppError::Config(
                "cache.redisUrl is required when cache.backend is redis".to_string(),
            ));
        }

        Ok(())
    }
}
