//! Query-side models: requests, retrieved candidates, tool responses.

use serde::{Deserialize, Serialize};

use super::chunk::{Filters, Metadata, TextChunk};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// A retrieval request as seen by the agent tool layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Signed so that a non-positive value from a caller can be rejected
    /// instead of failing to deserialize.
    pub top_k: i64,

    #[serde(default)]
    pub filters: Filters,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: i64) -> Self {
        Self {
            query: query.into(),
            top_k,
            filters: Filters::new(),
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

/// A candidate returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Point id in the vector index.
    pub id: String,

    pub text: String,

    pub metadata: Metadata,

    /// Cosine similarity reported by the index.
    pub score: f32,

    /// Score assigned by the reranker, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,
}

impl RetrievedChunk {
    pub fn range(&self) -> Option<&str> {
        self.metadata
            .get(super::chunk::RANGE_KEY)
            .and_then(super::chunk::MetadataValue::as_str)
    }

    pub fn into_passage(self) -> Passage {
        Passage {
            text: self.text,
            metadata: self.metadata,
        }
    }
}

/// Collection of ranked results for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Query that was executed
    pub query: String,

    pub results: Vec<RetrievedChunk>,

    /// Whether the results went through the reranker.
    pub reranked: bool,

    /// Query execution time in milliseconds
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(query: String, results: Vec<RetrievedChunk>, reranked: bool, duration_ms: u64) -> Self {
        Self {
            query,
            results,
            reranked,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

/// The `{text, metadata}` shape handed to the agent layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub metadata: Metadata,
}

impl From<TextChunk> for Passage {
    fn from(chunk: TextChunk) -> Self {
        Self {
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

/// Result of a tool call: passages, or `{"error": reason}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Passages(Vec<Passage>),
    Error { error: String },
}

impl ToolResponse {
    pub fn error(reason: impl Into<String>) -> Self {
        ToolResponse::Error {
            error: reason.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Error { .. })
    }

    pub fn passages(&self) -> &[Passage] {
        match self {
            ToolResponse::Passages(p) => p,
            ToolResponse::Error { .. } => &[],
        }
    }
}
