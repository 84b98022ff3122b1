use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "bible_chunks";
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VERSION: &str = "cuvs";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "BSB_CONFIG_PATH";
/// Config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "bsb.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub rerank: RerankConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

impl Config {
    /// Resolve the config file path: `$BSB_CONFIG_PATH`, then `./bsb.toml`,
    /// then the per-user config directory.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir().map(|p| p.join("bible-study-bot").join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.chunking.chunk_size == 0 {
            return invalid("chunking.chunk_size must be positive");
        }
        if self.chunking.overlap == 0 {
            return invalid("chunking.overlap must be positive");
        }
        if !(0.0..=100.0).contains(&self.chunking.breakpoint_percentile) {
            return invalid("chunking.breakpoint_percentile must be within 0..=100");
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be positive");
        }
        if self.search.top_k == 0 {
            return invalid("search.top_k must be positive");
        }
        if self.search.over_fetch == 0 {
            return invalid("search.over_fetch must be positive");
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.corpus.versions {
            if !seen.insert(source.version.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "corpus version '{}' listed twice",
                    source.version
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API; `/embeddings` is appended.
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Requests per batch, counting the first. `1` sends each request once.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Strip punctuation and collapse whitespace before embedding.
    #[serde(default)]
    pub preprocess: bool,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    32
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            preprocess: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

/// Where one Bible version's book files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSource {
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Version used when a lookup does not name one. Falls back to the first
    /// configured version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<String>,

    #[serde(default = "default_versions")]
    pub versions: Vec<VersionSource>,
}

fn default_versions() -> Vec<VersionSource> {
    vec![VersionSource {
        version: DEFAULT_VERSION.to_string(),
        path: PathBuf::from("data/bible").join(DEFAULT_VERSION),
    }]
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            default_version: None,
            versions: default_versions(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Sliding window over whole verses.
    #[default]
    Verse,
    /// Recursive character splitter over the book text.
    Length,
    /// Embedding-distance breakpoints between sentences.
    Semantic,
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStrategy::Verse => write!(f, "verse"),
            ChunkStrategy::Length => write!(f, "length"),
            ChunkStrategy::Semantic => write!(f, "semantic"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,

    /// Soft maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Soft minimum retained tail, in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    #[serde(default = "default_breakpoint_percentile")]
    pub breakpoint_percentile: f64,
}

fn default_chunk_size() -> usize {
    400
}

fn default_overlap() -> usize {
    30
}

fn default_breakpoint_percentile() -> f64 {
    95.0
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Verse,
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            breakpoint_percentile: default_breakpoint_percentile(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates fetched per requested result when reranking.
    #[serde(default = "default_over_fetch")]
    pub over_fetch: usize,

    /// Category every scripture search is restricted to.
    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> usize {
    5
}

fn default_over_fetch() -> usize {
    3
}

fn default_category() -> String {
    super::chunk::BIBLE_CATEGORY.to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            over_fetch: default_over_fetch(),
            category: default_category(),
            default_format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Language-model judge returning integer scores 0-5.
    #[default]
    Llm,
    /// Local ONNX cross-encoder returning scores in 0-1.
    CrossEncoder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub scorer: ScorerKind,

    /// Minimum score kept; must be on the active scorer's scale.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub llm: LlmJudgeConfig,

    #[serde(default)]
    pub cross_encoder: CrossEncoderConfig,
}

fn default_threshold() -> f32 {
    3.0
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scorer: ScorerKind::Llm,
            threshold: default_threshold(),
            llm: LlmJudgeConfig::default(),
            cross_encoder: CrossEncoderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmJudgeConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended.
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_judge_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_judge_timeout")]
    pub timeout_secs: u64,
}

fn default_judge_model() -> String {
    DEFAULT_JUDGE_MODEL.to_string()
}

fn default_judge_timeout() -> u64 {
    120
}

impl Default for LlmJudgeConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_judge_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_judge_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossEncoderConfig {
    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_max_length() -> usize {
    512
}

impl CrossEncoderConfig {
    /// Configured model directory, or `<data_dir>/bible-study-bot/models/reranker`.
    pub fn resolved_model_dir(&self) -> Option<PathBuf> {
        self.model_dir.clone().or_else(|| {
            dirs::data_dir().map(|d| d.join("bible-study-bot").join("models").join("reranker"))
        })
    }
}

impl Default for CrossEncoderConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            max_length: default_max_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Newline-delimited JSON written by `build` and read by `publish`.
    #[serde(default = "default_build_output")]
    pub output: PathBuf,
}

fn default_build_output() -> PathBuf {
    PathBuf::from("build/data.jsonl")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output: default_build_output(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.url, DEFAULT_EMBEDDING_URL);
        assert_eq!(config.vector_store.url, DEFAULT_QDRANT_URL);
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
        assert_eq!(config.chunking.strategy, ChunkStrategy::Verse);
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.overlap, 30);
        assert_eq!(config.corpus.versions[0].version, "cuvs");
        assert!(!config.rerank.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            strategy = "length"
            chunk_size = 200

            [rerank]
            enabled = true
            scorer = "cross_encoder"
            threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.strategy, ChunkStrategy::Length);
        assert_eq!(config.chunking.chunk_size, 200);
        assert_eq!(config.chunking.overlap, 30);
        assert_eq!(config.rerank.scorer, ScorerKind::CrossEncoder);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.search.top_k = 8;
        config.corpus.versions.push(VersionSource {
            version: "kjv".to_string(),
            path: PathBuf::from("/data/kjv"),
        });
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.search.top_k, 8);
        assert_eq!(loaded.corpus.versions.len(), 2);
        assert_eq!(loaded.corpus.versions[1].version, "kjv");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.search.top_k = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.chunking.overlap = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.corpus.versions.push(config.corpus.versions[0].clone());
        assert!(config.validate().is_err());
    }
}
