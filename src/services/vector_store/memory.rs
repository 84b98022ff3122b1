use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CollectionHealth, CollectionInfo, EmbeddedChunk, VectorStore, validate_filters};
use crate::error::VectorStoreError;
use crate::models::{Filters, RetrievedChunk};
use crate::utils::similarity::cosine_similarity;

#[derive(Debug)]
struct Collection {
    dimension: u64,
    health: CollectionHealth,
    points: Vec<(String, EmbeddedChunk)>,
}

/// In-process vector store with brute-force cosine search.
///
/// Behaves like a single collection of the remote index, including a
/// reported health state, so bootstrap and query paths can run without a
/// server.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    collection: RwLock<Option<Collection>>,
    created: RwLock<usize>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: RwLock::new(None),
            created: RwLock::new(0),
        }
    }

    /// How many times `create_collection` actually created something.
    pub async fn created_count(&self) -> usize {
        *self.created.read().await
    }

    pub async fn set_health(&self, health: CollectionHealth) {
        if let Some(collection) = self.collection.write().await.as_mut() {
            collection.health = health;
        }
    }

    pub async fn len(&self) -> usize {
        self.collection
            .read()
            .await
            .as_ref()
            .map_or(0, |c| c.points.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        Ok(self.collection.read().await.as_ref().map(|c| CollectionInfo {
            health: c.health,
            points_count: c.points.len() as u64,
        }))
    }

    async fn create_collection(&self, dimension: u64) -> Result<(), VectorStoreError> {
        let mut collection = self.collection.write().await;
        if collection.is_some() {
            return Err(VectorStoreError::CollectionError(format!(
                "collection '{}' already exists",
                self.name
            )));
        }
        *collection = Some(Collection {
            dimension,
            health: CollectionHealth::Green,
            points: Vec::new(),
        });
        *self.created.write().await += 1;
        Ok(())
    }

    async fn upsert(&self, points: Vec<EmbeddedChunk>) -> Result<(), VectorStoreError> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(|| {
            VectorStoreError::UpsertError(format!("collection '{}' not found", self.name))
        })?;

        if let Some(bad) = points
            .iter()
            .find(|p| p.vector.len() as u64 != collection.dimension)
        {
            return Err(VectorStoreError::UpsertError(format!(
                "expected dimension {}, got {}",
                collection.dimension,
                bad.vector.len()
            )));
        }

        collection.points.extend(
            points
                .into_iter()
                .map(|p| (uuid::Uuid::new_v4().to_string(), p)),
        );
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filters: &Filters,
    ) -> Result<Vec<RetrievedChunk>, VectorStoreError> {
        validate_filters(filters)?;

        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(|| {
            VectorStoreError::SearchError(format!("collection '{}' not found", self.name))
        })?;
        if vector.len() as u64 != collection.dimension {
            return Err(VectorStoreError::SearchError(format!(
                "expected dimension {}, got {}",
                collection.dimension,
                vector.len()
            )));
        }

        let mut results: Vec<RetrievedChunk> = collection
            .points
            .iter()
            .filter(|(_, p)| {
                filters.iter().all(|(key, wanted)| {
                    p.chunk
                        .metadata
                        .get(key)
                        .is_some_and(|value| wanted.matches(value))
                })
            })
            .map(|(id, p)| RetrievedChunk {
                id: id.clone(),
                text: p.chunk.text.clone(),
                metadata: p.chunk.metadata.clone(),
                score: cosine_similarity(&vector, &p.vector),
                relevance: None,
            })
            .collect();

        // stable sort keeps insertion order among equal scores
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit as usize);
        Ok(results)
    }

    fn collection(&self) -> &str {
        &self.name
    }
}
