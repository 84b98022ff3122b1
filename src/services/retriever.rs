//! Embed-then-search against the vector index.

use std::sync::Arc;

use super::embedding::Embedder;
use super::vector_store::{VectorStore, validate_filters};
use crate::error::SearchError;
use crate::models::{Filters, RetrievedChunk};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Return up to `top_k * over_fetch` candidates ordered by descending
    /// similarity, restricted by conjunctive equality `filters`.
    ///
    /// Arguments are checked before the embedder or index is contacted.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &Filters,
        over_fetch: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if over_fetch == 0 {
            return Err(SearchError::InvalidArgument(
                "over_fetch must be greater than 0".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(SearchError::InvalidArgument("query is empty".to_string()));
        }
        validate_filters(filters)?;

        let limit = top_k.checked_mul(over_fetch).ok_or_else(|| {
            SearchError::InvalidArgument(format!("top_k {top_k} * over_fetch {over_fetch} overflows"))
        })?;

        let vector = self.embedder.embed_query(query).await?;
        let mut results = self.store.search(vector, limit as u64, filters).await?;
        results.truncate(limit);

        tracing::debug!(
            query,
            top_k,
            over_fetch,
            returned = results.len(),
            "retrieved candidates"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, MetadataValue, TextChunk, bible_filters};
    use crate::services::embedding::testing::FakeEmbedder;
    use crate::services::vector_store::{EmbeddedChunk, MemoryStore};
    use std::sync::atomic::Ordering;

    async fn seeded(embedder: &FakeEmbedder) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new("test"));
        store.create_collection(embedder.dim as u64).await.unwrap();
        let texts = [
            ("love love love", "bible"),
            ("love one another", "bible"),
            ("faith hope", "bible"),
            ("love commentary", "commentary"),
            ("grace", "bible"),
        ];
        let points = texts
            .iter()
            .map(|(t, c)| EmbeddedChunk {
                chunk: TextChunk::new(*t, Metadata::new()).with_metadata("category", *c),
                vector: embedder.vector(t),
            })
            .collect();
        store.upsert(points).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_filters_and_limits() {
        let embedder = Arc::new(FakeEmbedder::new(16));
        let store = seeded(&embedder).await;
        let retriever = Retriever::new(embedder.clone(), store);

        let results = retriever
            .search("love", 1, &bible_filters(), 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "love love love");
        assert!(
            results
                .iter()
                .all(|r| r.metadata["category"] == MetadataValue::from("bible"))
        );
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_zero_top_k_fails_before_any_call() {
        let embedder = Arc::new(FakeEmbedder::new(16));
        let store = seeded(&embedder).await;
        let retriever = Retriever::new(embedder.clone(), store);

        let err = retriever
            .search("love", 0, &Filters::new(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

        assert!(retriever.search("love", 2, &Filters::new(), 0).await.is_err());
        assert!(retriever.search("  ", 2, &Filters::new(), 1).await.is_err());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported_as_upstream() {
        let store = Arc::new(MemoryStore::new("test"));
        let retriever = Retriever::new(Arc::new(FakeEmbedder::failing()), store);
        let err = retriever
            .search("love", 2, &Filters::new(), 1)
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }
}
