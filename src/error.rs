//! Error types for the Bible study bot.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised while loading or querying the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Malformed corpus input: unknown book, duplicate verse, missing field.
    #[error("validation error: {0}")]
    Validation(String),

    /// A caller-supplied parameter violates a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CorpusError {
    pub fn verse_not_found(book: &str, chapter: u32, verse: u32) -> Self {
        CorpusError::NotFound(format!("verse {book} {chapter}:{verse}"))
    }
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // 429 and 5xx gateway errors are transient on hosted endpoints
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to Qdrant: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    /// The collection reported a health state other than healthy.
    /// This is a configuration problem and is never retried.
    #[error("collection '{collection}' is in unexpected state: {status}")]
    UnhealthyCollection { collection: String, status: String },

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Errors surfaced by the query path (retrieval and reranking).
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An embedding, vector store or scoring oracle call failed or returned
    /// something that could not be parsed.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl SearchError {
    pub fn is_upstream(&self) -> bool {
        matches!(self, SearchError::Upstream(_))
    }
}

impl From<EmbeddingError> for SearchError {
    fn from(e: EmbeddingError) -> Self {
        SearchError::Upstream(format!("embedding: {e}"))
    }
}

impl From<VectorStoreError> for SearchError {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::InvalidFilter(msg) => SearchError::InvalidArgument(msg),
            other => SearchError::Upstream(format!("vector store: {other}")),
        }
    }
}

/// Errors related to scoring models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),
}

/// Errors related to ingestion runs.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("chunking error: {0}")]
    ChunkError(String),

    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid batch record at line {line}: {source}")]
    BatchRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}
