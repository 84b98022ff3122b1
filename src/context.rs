//! Application context: every long-lived collaborator, built once from
//! `Config` and passed by reference.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

use crate::error::{AppError, CorpusError, SearchError};
use crate::models::{Config, Filters, Library, SearchResults};
use crate::services::{
    BookChunker, Embedder, EmbeddingClient, Reranker, Retriever, VectorStore, create_backend,
    create_chunker, create_scorer, load_library,
};

/// Query-time knobs for one search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub over_fetch: usize,
    pub filters: Filters,
    pub rerank: bool,
    /// Overrides `rerank.threshold` when set.
    pub threshold: Option<f32>,
}

impl SearchOptions {
    /// Options seeded from the `search` and `rerank` config sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.search.top_k,
            over_fetch: config.search.over_fetch,
            filters: Filters::new(),
            rerank: config.rerank.enabled,
            threshold: None,
        }
    }
}

pub struct AppContext {
    config: Config,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    reranker: Option<Reranker>,
    library: OnceCell<Library>,
}

impl AppContext {
    /// Connect the embedding client and vector store; load the scorer when
    /// reranking is enabled. The corpus is loaded on first use.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&config.embedding)?);
        let store: Arc<dyn VectorStore> = Arc::from(create_backend(&config.vector_store)?);

        let reranker = if config.rerank.enabled {
            let scorer = create_scorer(&config.rerank)?;
            tracing::debug!(scorer = scorer.name(), "reranking enabled");
            Some(Reranker::new(scorer))
        } else {
            None
        };

        Ok(Self {
            config,
            embedder,
            store,
            reranker,
            library: OnceCell::new(),
        })
    }

    /// Context over explicit collaborators, without a reranker.
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            config,
            embedder,
            store,
            reranker: None,
            library: OnceCell::new(),
        }
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_library(self, library: Library) -> Self {
        Self {
            library: OnceCell::new_with(Some(library)),
            ..self
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn reranker(&self) -> Option<&Reranker> {
        self.reranker.as_ref()
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(Arc::clone(&self.embedder), Arc::clone(&self.store))
    }

    pub fn chunker(&self) -> Box<dyn BookChunker> {
        create_chunker(&self.config.chunking, Arc::clone(&self.embedder))
    }

    /// The configured versions, loaded on first call.
    pub async fn library(&self) -> Result<&Library, CorpusError> {
        self.library
            .get_or_try_init(|| async { load_library(&self.config.corpus) })
            .await
    }

    /// Retrieve and optionally rerank. Without reranking the candidates are
    /// cut to `top_k`; over-fetching only feeds the reranker.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResults, SearchError> {
        let start = Instant::now();
        let reranker = match (options.rerank, &self.reranker) {
            (false, _) => None,
            (true, Some(reranker)) => Some(reranker),
            (true, None) => {
                return Err(SearchError::InvalidArgument(
                    "reranking requested but no scorer is configured".to_string(),
                ));
            }
        };

        let over_fetch = if reranker.is_some() { options.over_fetch } else { 1 };
        let candidates = self
            .retriever()
            .search(query, options.top_k, &options.filters, over_fetch)
            .await?;

        let results = match reranker {
            Some(reranker) => {
                let threshold = options.threshold.unwrap_or(self.config.rerank.threshold);
                reranker.rerank(query, candidates, threshold, options.top_k).await?
            }
            None => candidates,
        };

        Ok(SearchResults::new(
            query.to_string(),
            results,
            reranker.is_some(),
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::{Bible, Book, Verse};
    use crate::services::embedding::testing::FakeEmbedder;
    use crate::services::{MemoryStore, ingest};
    use indicatif::ProgressBar;

    pub fn library() -> Library {
        let john = Book::new(
            "john",
            vec![
                Verse::new(3, 16, "神爱世人甚至将他的独生子赐给他们"),
                Verse::new(3, 17, "因为神差他的儿子降世不是要定世人的罪"),
                Verse::new(3, 18, "信他的人不被定罪"),
            ],
        )
        .unwrap();
        let genesis = Book::new(
            "genesis",
            vec![
                Verse::new(1, 1, "起初神创造天地"),
                Verse::new(1, 2, "地是空虚混沌渊面黑暗"),
            ],
        )
        .unwrap();
        let mut library = Library::new();
        library.insert(Bible::new("cuvs", vec![genesis, john]).unwrap());
        library
    }

    /// A context over an in-memory store already holding `library()`.
    pub async fn ingested_context() -> AppContext {
        let mut config = Config::default();
        config.chunking.chunk_size = 20;
        config.chunking.overlap = 0;
        let context = AppContext::new(
            config,
            Arc::new(FakeEmbedder::new(16)),
            Arc::new(MemoryStore::new("bible")),
        )
        .with_library(library());

        let library = context.library().await.unwrap();
        let chunker = context.chunker();
        ingest(
            library,
            chunker.as_ref(),
            context.embedder(),
            context.store(),
            4,
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();
        context
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ingested_context;
    use super::*;
    use crate::services::reranker::testing::FixedScorer;

    #[tokio::test]
    async fn test_search_without_rerank_cuts_to_top_k() {
        let context = ingested_context().await;
        let mut options = SearchOptions::from_config(context.config());
        options.top_k = 2;
        options.over_fetch = 3;

        let results = context.search("神爱世人", &options).await.unwrap();
        assert!(!results.reranked);
        assert_eq!(results.len(), 2);
        assert!(results.results.iter().all(|r| r.relevance.is_none()));
    }

    #[tokio::test]
    async fn test_search_with_rerank_sets_relevance() {
        let context = ingested_context()
            .await
            .with_reranker(Reranker::new(Arc::new(FixedScorer::scores(&[1.0, 5.0, 4.0, 2.0]))));
        let mut options = SearchOptions::from_config(context.config());
        options.top_k = 2;
        options.over_fetch = 2;
        options.rerank = true;
        options.threshold = Some(3.0);

        let results = context.search("神爱世人", &options).await.unwrap();
        assert!(results.reranked);
        let relevance: Vec<_> = results.results.iter().map(|r| r.relevance).collect();
        assert_eq!(relevance, [Some(5.0), Some(4.0)]);
    }

    #[tokio::test]
    async fn test_rerank_without_scorer_is_rejected() {
        let context = ingested_context().await;
        let mut options = SearchOptions::from_config(context.config());
        options.rerank = true;
        assert!(matches!(
            context.search("光", &options).await,
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_library_is_loaded_once_from_config() {
        let temp = tempfile::TempDir::new().unwrap();
        crate::services::loader::testing::write_book(temp.path(), "ruth.json", "ruth", &[(1, 1, "x")]);

        let mut config = Config::default();
        config.corpus.versions = vec![crate::models::VersionSource {
            version: "cuvs".to_string(),
            path: temp.path().to_path_buf(),
        }];
        let context = AppContext::new(
            config,
            Arc::new(crate::services::embedding::testing::FakeEmbedder::new(4)),
            Arc::new(crate::services::MemoryStore::new("bible")),
        );

        let first = context.library().await.unwrap() as *const Library;
        std::fs::remove_file(temp.path().join("ruth.json")).unwrap();
        let second = context.library().await.unwrap() as *const Library;
        assert_eq!(first, second);
    }
}
