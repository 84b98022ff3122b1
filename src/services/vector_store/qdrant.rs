//! Qdrant vector store backend.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CollectionStatus, Condition, CreateCollectionBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::HashMap;

use super::{
    CollectionHealth, CollectionInfo, EmbeddedChunk, VectorStore, validate_filters,
};
use crate::error::VectorStoreError;
use crate::models::chunk::TEXT_KEY;
use crate::models::{FilterValue, Filters, Metadata, MetadataValue, RetrievedChunk, VectorStoreConfig};

pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

fn health_from_status(status: CollectionStatus) -> CollectionHealth {
    match status {
        CollectionStatus::Green => CollectionHealth::Green,
        CollectionStatus::Yellow => CollectionHealth::Yellow,
        CollectionStatus::Red => CollectionHealth::Red,
        CollectionStatus::Grey => CollectionHealth::Grey,
        CollectionStatus::UnknownCollectionStatus => CollectionHealth::Unknown,
    }
}

fn build_filter(filters: &Filters) -> Option<Filter> {
    if filters.is_empty() {
        return None;
    }
    let conditions: Vec<Condition> = filters
        .iter()
        .map(|(key, value)| match value {
            FilterValue::Keyword(s) => Condition::matches(key.clone(), s.clone()),
            FilterValue::Integer(n) => Condition::matches(key.clone(), *n),
            FilterValue::Bool(b) => Condition::matches(key.clone(), *b),
        })
        .collect();
    Some(Filter::must(conditions))
}

fn to_qdrant_value(value: MetadataValue) -> Value {
    match value {
        MetadataValue::Text(s) => s.into(),
        MetadataValue::Integer(n) => n.into(),
        MetadataValue::Float(x) => x.into(),
        MetadataValue::Bool(b) => b.into(),
        MetadataValue::TextList(v) => v.into_iter().map(Value::from).collect::<Vec<_>>().into(),
        MetadataValue::IntegerList(v) => {
            v.into_iter().map(Value::from).collect::<Vec<_>>().into()
        }
        MetadataValue::FloatList(v) => v.into_iter().map(Value::from).collect::<Vec<_>>().into(),
    }
}

/// Payload for one point: the chunk text plus every metadata key.
fn build_payload(point: EmbeddedChunk) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = point
        .chunk
        .metadata
        .into_iter()
        .map(|(k, v)| (k, to_qdrant_value(v)))
        .collect();
    payload.insert(TEXT_KEY.to_string(), point.chunk.text.into());
    payload
}

fn from_qdrant_value(value: &Value) -> Option<MetadataValue> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(MetadataValue::Text(s.clone())),
        Kind::IntegerValue(n) => Some(MetadataValue::Integer(*n)),
        Kind::DoubleValue(x) => Some(MetadataValue::Float(*x)),
        Kind::BoolValue(b) => Some(MetadataValue::Bool(*b)),
        Kind::ListValue(list) => {
            let kinds: Vec<&Kind> = list.values.iter().filter_map(|v| v.kind.as_ref()).collect();
            if kinds.iter().all(|k| matches!(k, Kind::IntegerValue(_))) && !kinds.is_empty() {
                Some(MetadataValue::IntegerList(
                    kinds
                        .iter()
                        .filter_map(|k| match k {
                            Kind::IntegerValue(n) => Some(*n),
                            _ => None,
                        })
                        .collect(),
                ))
            } else if kinds
                .iter()
                .all(|k| matches!(k, Kind::DoubleValue(_) | Kind::IntegerValue(_)))
                && !kinds.is_empty()
            {
                Some(MetadataValue::FloatList(
                    kinds
                        .iter()
                        .filter_map(|k| match k {
                            Kind::DoubleValue(x) => Some(*x),
                            Kind::IntegerValue(n) => Some(*n as f64),
                            _ => None,
                        })
                        .collect(),
                ))
            } else {
                Some(MetadataValue::TextList(
                    kinds
                        .iter()
                        .filter_map(|k| match k {
                            Kind::StringValue(s) => Some(s.clone()),
                            _ => None,
                        })
                        .collect(),
                ))
            }
        }
        _ => None,
    }
}

/// Split a stored payload back into chunk text and metadata.
fn split_payload(payload: &HashMap<String, Value>) -> (String, Metadata) {
    let mut text = String::new();
    let mut metadata = Metadata::new();
    for (key, value) in payload {
        if key == TEXT_KEY {
            if let Some(Kind::StringValue(s)) = &value.kind {
                text = s.clone();
            }
        } else if let Some(v) = from_qdrant_value(value) {
            metadata.insert(key.clone(), v);
        }
    }
    (text, metadata)
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        if !exists {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(Some(match info.result {
            Some(result) => CollectionInfo {
                health: health_from_status(result.status()),
                points_count: result.points_count.unwrap_or(0),
            },
            None => CollectionInfo {
                health: CollectionHealth::Unknown,
                points_count: 0,
            },
        }))
    }

    async fn create_collection(&self, dimension: u64) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(())
    }

    async fn upsert(&self, points: Vec<EmbeddedChunk>) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let vector = point.vector.clone();
                PointStruct::new(
                    uuid::Uuid::new_v4().to_string(),
                    vector,
                    build_payload(point),
                )
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        tracing::debug!(collection = %self.collection, count, "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filters: &Filters,
    ) -> Result<Vec<RetrievedChunk>, VectorStoreError> {
        validate_filters(filters)?;

        let mut search_builder = SearchPointsBuilder::new(&self.collection, vector, limit)
            .with_payload(true)
            .with_vectors(false);

        if let Some(f) = build_filter(filters) {
            search_builder = search_builder.filter(f);
        }

        let response = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        let results = response
            .result
            .into_iter()
            .map(|point| {
                let (text, metadata) = split_payload(&point.payload);
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid,
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)) => {
                        num.to_string()
                    }
                    None => String::new(),
                };
                RetrievedChunk {
                    id,
                    text,
                    metadata,
                    score: point.score,
                    relevance: None,
                }
            })
            .collect();

        Ok(results)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextChunk;

    #[test]
    fn test_health_mapping() {
        assert!(health_from_status(CollectionStatus::Green).is_healthy());
        assert!(health_from_status(CollectionStatus::Yellow).is_healthy());
        assert!(!health_from_status(CollectionStatus::Red).is_healthy());
        assert!(!health_from_status(CollectionStatus::Grey).is_healthy());
        assert!(!health_from_status(CollectionStatus::UnknownCollectionStatus).is_healthy());
    }

    #[test]
    fn test_payload_round_trip() {
        let chunk = TextChunk::new("起初神创造天地", Metadata::new())
            .with_metadata("category", "bible")
            .with_metadata("range", "genesis 1:1")
            .with_metadata("chapter", 1i64)
            .with_metadata("tags", MetadataValue::TextList(vec!["creation".to_string()]));

        let payload = build_payload(EmbeddedChunk {
            chunk: chunk.clone(),
            vector: vec![0.0],
        });
        assert!(payload.contains_key("text"));

        let (text, metadata) = split_payload(&payload);
        assert_eq!(text, chunk.text);
        assert_eq!(metadata, chunk.metadata);
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter(&Filters::new()).is_none());

        let mut filters = Filters::new();
        filters.insert("category".to_string(), "bible".into());
        filters.insert("chapter".to_string(), FilterValue::Integer(3));
        let filter = build_filter(&filters).unwrap();
        assert_eq!(filter.must.len(), 2);
    }
}
