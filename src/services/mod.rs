pub mod chunker;
pub mod embedding;
pub mod ingest;
pub mod loader;
pub mod lookup;
pub mod reranker;
pub mod retriever;
pub mod splitter;
pub mod vector_store;

pub use chunker::{BookChunker, VerseChunker, create_chunker};
pub use embedding::{EmbeddingClient, Embedder};
pub use ingest::{BuildIdGenerator, IngestStats, build_file, ingest, process_batch, publish};
pub use loader::{load_bible_dir, load_library};
pub use lookup::{ContextScope, VerseSpan, lookup_range, lookup_verse, verse_context};
pub use reranker::{CrossEncoder, LlmJudge, RelevanceScorer, Reranker, create_scorer};
pub use retriever::Retriever;
pub use splitter::{LengthSplitter, SemanticSplitter, Splitter};
pub use vector_store::{
    Bootstrap, CollectionHealth, CollectionInfo, MemoryStore, QdrantBackend, VectorStore,
    create_backend, ensure_collection,
};
