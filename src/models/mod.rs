pub mod chunk;
pub mod citation;
mod config;
pub mod corpus;
mod search;

pub use chunk::{
    BIBLE_CATEGORY, FilterValue, Filters, Metadata, MetadataValue, TextChunk, bible_filters,
};
pub use citation::{VerseRange, encode_verse_range};
pub use config::{
    BuildConfig, ChunkStrategy, ChunkingConfig, Config, CorpusConfig, CrossEncoderConfig,
    DEFAULT_COLLECTION, DEFAULT_EMBEDDING_URL, DEFAULT_QDRANT_URL, EmbeddingConfig,
    LlmJudgeConfig, RerankConfig, ScorerKind, SearchConfig, VectorStoreConfig, VersionSource,
};
pub use corpus::{Bible, Book, Library, Testament, Verse, VersePosition};
pub use search::{OutputFormat, Passage, RetrievedChunk, SearchRequest, SearchResults, ToolResponse};
