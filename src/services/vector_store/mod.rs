//! Vector index abstraction.
//!
//! Backends persist `(id, vector, payload)` points and answer nearest-neighbour
//! searches restricted by conjunctive equality filters. Qdrant is the
//! production backend; the in-memory store backs tests and dry runs.

mod memory;
mod qdrant;

pub use memory::MemoryStore;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use std::fmt;

use crate::error::{IndexError, VectorStoreError};
use crate::models::{Filters, RetrievedChunk, TextChunk, VectorStoreConfig};
use crate::services::embedding::Embedder;

/// Health reported by the index for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionHealth {
    /// Fully operational.
    Green,
    /// Operational while optimizing in the background.
    Yellow,
    Red,
    Grey,
    Unknown,
}

impl CollectionHealth {
    /// Green and yellow collections accept reads and writes.
    pub fn is_healthy(self) -> bool {
        matches!(self, CollectionHealth::Green | CollectionHealth::Yellow)
    }
}

impl fmt::Display for CollectionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollectionHealth::Green => "green",
            CollectionHealth::Yellow => "yellow",
            CollectionHealth::Red => "red",
            CollectionHealth::Grey => "grey",
            CollectionHealth::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub health: CollectionHealth,
    pub points_count: u64,
}

/// A chunk paired with its embedding, ready to upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: TextChunk,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check the index server is reachable.
    async fn health_check(&self) -> Result<(), VectorStoreError>;

    /// `None` when the collection does not exist.
    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the collection for vectors of `dimension` (cosine distance).
    async fn create_collection(&self, dimension: u64) -> Result<(), VectorStoreError>;

    /// Store points under fresh random ids. Re-ingesting the same text adds
    /// new points; nothing is deduplicated.
    async fn upsert(&self, points: Vec<EmbeddedChunk>) -> Result<(), VectorStoreError>;

    /// Up to `limit` records ordered by descending similarity.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filters: &Filters,
    ) -> Result<Vec<RetrievedChunk>, VectorStoreError>;

    fn collection(&self) -> &str;
}

/// Reject filters no backend can express.
pub(crate) fn validate_filters(filters: &Filters) -> Result<(), VectorStoreError> {
    if let Some(key) = filters.keys().find(|k| k.trim().is_empty()) {
        return Err(VectorStoreError::InvalidFilter(format!(
            "empty filter key '{key}'"
        )));
    }
    Ok(())
}

pub fn create_backend(config: &VectorStoreConfig) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    Ok(Box::new(QdrantBackend::new(config)?))
}

/// What [`ensure_collection`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    Created { dimension: u64 },
    Existing { health: CollectionHealth },
}

/// Create the backing collection if it is missing, sized by probing the
/// embedder once. An existing healthy collection is left alone; any other
/// health state is a configuration error.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> Result<Bootstrap, IndexError> {
    match store.collection_info().await? {
        None => {
            let dimension = embedder.probe_dimension().await?;
            store.create_collection(dimension).await?;
            tracing::info!(collection = store.collection(), dimension, "created collection");
            Ok(Bootstrap::Created { dimension })
        }
        Some(info) if info.health.is_healthy() => {
            tracing::info!(
                collection = store.collection(),
                health = %info.health,
                points = info.points_count,
                "collection already exists"
            );
            Ok(Bootstrap::Existing {
                health: info.health,
            })
        }
        Some(info) => Err(VectorStoreError::UnhealthyCollection {
            collection: store.collection().to_string(),
            status: info.health.to_string(),
        }
        .into()),
    }
}
