//! Configuration for VDB.
//!
//! Loaded from a TOML file; every section and field is optional.
//!
//! ```toml
//! log_level = "debug"
//!
//! [store]
//! path = "/var/lib/vdb/embeddings.json"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! timeout_secs = 10
//!
//! [captions]
//! languages = ["de", "en"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vdb_sources::LanguagePolicy;

use crate::error::{Result, RetrievalError};

/// Environment variable overriding `store.path`.
pub const ENV_STORE_PATH: &str = "VDB_STORE_PATH";
/// Environment variable overriding `server.bind`.
pub const ENV_BIND: &str = "VDB_BIND";
/// Environment variable overriding `embedding.provider`.
pub const ENV_PROVIDER: &str = "VDB_EMBEDDING_PROVIDER";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VdbConfig {
    /// Where records are persisted.
    pub store: StoreConfig,

    /// Which vectorizer to use.
    pub embedding: EmbeddingConfig,

    /// Search limits.
    pub query: QueryConfig,

    /// Caption fetching.
    pub captions: CaptionConfig,

    /// HTTP server.
    pub server: ServerConfig,

    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: Option<String>,
}

impl VdbConfig {
    /// Read a TOML configuration file and apply environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Default configuration file, `<config dir>/vdb/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vdb").join("config.toml"))
    }

    /// Load `path` if given, else the default file if it exists, else the
    /// built-in defaults. Environment overrides apply in every case.
    pub async fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path).await;
        }
        if let Some(path) = Self::default_path() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Self::load(&path).await;
            }
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RetrievalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VDB_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = var(ENV_STORE_PATH) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(bind) = var(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(provider) = var(ENV_PROVIDER) {
            self.embedding.provider = provider.parse()?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.query.default_k == 0 {
            return Err(RetrievalError::Config(
                "query.default_k must be at least 1".to_string(),
            ));
        }
        if self.query.max_results < self.query.default_k {
            return Err(RetrievalError::Config(format!(
                "query.max_results ({}) is smaller than query.default_k ({})",
                self.query.max_results, self.query.default_k
            )));
        }
        if self.embedding.dimension == Some(0) {
            return Err(RetrievalError::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.embedding.timeout_secs == 0 || self.captions.timeout_secs == 0 {
            return Err(RetrievalError::Config(
                "request timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_default()
                .join("vdb/embeddings.json"),
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// Output dimension; the provider's native size when unset.
    pub dimension: Option<usize>,

    /// Base URL of an OpenAI-compatible API.
    pub base_url: Option<String>,

    /// API key; read from `api_key_env` when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// HTTP request timeout for remote providers.
    pub timeout_secs: u64,

    /// Where local model files are cached.
    pub cache_dir: Option<PathBuf>,
}

impl EmbeddingConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Local model cache, `<cache dir>/vdb/models` unless configured.
    pub fn model_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("vdb").join("models")))
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::FastEmbed,
            model: None,
            dimension: None,
            base_url: None,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            cache_dir: None,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Local sentence-transformer model, no network after the first download.
    #[serde(rename = "fastembed")]
    FastEmbed,
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "openai" => Ok(Self::OpenAI),
            other => Err(RetrievalError::Config(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Results returned when the caller does not ask for a count.
    pub default_k: usize,

    /// Upper bound on results per query.
    pub max_results: usize,

    /// Drop matches scoring below this similarity.
    pub min_score: Option<f32>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_results: 100,
            min_score: None,
        }
    }
}

/// Configuration for caption fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Preferred caption languages, most preferred first.
    pub languages: Vec<String>,

    /// Accept generated captions in another language.
    pub fallback_to_auto: bool,

    /// HTTP request timeout.
    pub timeout_secs: u64,
}

impl CaptionConfig {
    /// Language policy for `languages`, or the configured default when the
    /// caller gave none.
    pub fn policy(&self, languages: &[String]) -> LanguagePolicy {
        let preferred = if languages.is_empty() {
            self.languages.clone()
        } else {
            languages.to_vec()
        };
        LanguagePolicy {
            preferred,
            fallback_to_auto: self.fallback_to_auto,
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            fallback_to_auto: true,
            timeout_secs: 30,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = VdbConfig::default();
        assert_eq!(config.embedding.provider, EmbeddingProviderType::FastEmbed);
        assert_eq!(config.embedding.dimension, None);
        assert_eq!(config.embedding.timeout(), Duration::from_secs(30));
        assert_eq!(config.query.default_k, 5);
        assert_eq!(config.query.max_results, 100);
        assert_eq!(config.captions.languages, vec!["en".to_string()]);
        assert!(config.store.path.ends_with("vdb/embeddings.json"));
    }

    #[test]
    fn test_partial_toml() {
        let config = VdbConfig::from_toml(
            r#"
            log_level = "debug"

            [embedding]
            provider = "openai"
            model = "text-embedding-3-large"
            dimension = 256
            timeout_secs = 5

            [captions]
            languages = ["de"]
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(config.embedding.dimension, Some(256));
        assert_eq!(config.embedding.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.embedding.timeout(), Duration::from_secs(5));
        assert_eq!(config.captions.languages, vec!["de".to_string()]);
        assert!(config.captions.fallback_to_auto);
        assert_eq!(config.query, QueryConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = VdbConfig::from_toml("[embedding]\nprovider = \"word2vec\"").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = VdbConfig::from_toml("[query]\ndefault_k = 0").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = VdbConfig::from_toml("[query]\ndefault_k = 10\nmax_results = 3").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = VdbConfig::from_toml("[embedding]\ntimeout_secs = 0").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = VdbConfig::default();
        config
            .apply_overrides(|name| match name {
                ENV_STORE_PATH => Some("/tmp/vdb.json".to_string()),
                ENV_BIND => Some("0.0.0.0:9000".to_string()),
                ENV_PROVIDER => Some("OpenAI".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.store.path, PathBuf::from("/tmp/vdb.json"));
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(
            "FastEmbed".parse::<EmbeddingProviderType>().unwrap(),
            EmbeddingProviderType::FastEmbed
        );

        let err = config
            .apply_overrides(|name| (name == ENV_PROVIDER).then(|| "bert".to_string()))
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn test_caption_policy() {
        let captions = CaptionConfig::default();
        assert_eq!(captions.policy(&[]).preferred, vec!["en".to_string()]);
        let policy = captions.policy(&["fr".to_string()]);
        assert_eq!(policy.preferred, vec!["fr".to_string()]);
        assert!(policy.fallback_to_auto);
        assert_eq!(captions.timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vdb.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:7000\"\n").unwrap();

        let config = VdbConfig::load(&path).await.unwrap();
        if std::env::var(ENV_BIND).is_err() {
            assert_eq!(config.server.bind, "127.0.0.1:7000");
        }

        let missing = VdbConfig::load(temp_dir.path().join("missing.toml")).await;
        assert!(matches!(missing, Err(RetrievalError::Config(_))));
    }
}
