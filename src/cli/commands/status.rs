use anyhow::Result;

use crate::cli::output::{Formatter, StatusInfo};
use crate::models::{Config, ScorerKind};
use crate::services::{EmbeddingClient, create_backend};

pub async fn handle_status(config: &Config, formatter: &dyn Formatter) -> Result<()> {
    let embedding_connected = match EmbeddingClient::new(&config.embedding) {
        Ok(client) => client.health_check().await.is_ok(),
        Err(_) => false,
    };

    let (vector_store_connected, collection_health, points) =
        match create_backend(&config.vector_store) {
            Ok(store) if store.health_check().await.is_ok() => {
                match store.collection_info().await.ok().flatten() {
                    Some(info) => (true, Some(info.health.to_string()), info.points_count),
                    None => (true, None, 0),
                }
            }
            _ => (false, None, 0),
        };

    let reranker = config.rerank.enabled.then(|| match config.rerank.scorer {
        ScorerKind::Llm => format!("llm ({})", config.rerank.llm.model),
        ScorerKind::CrossEncoder => "cross_encoder".to_string(),
    });

    let status = StatusInfo {
        embedding_url: config.embedding.url.clone(),
        embedding_model: config.embedding.model.clone(),
        embedding_connected,
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        collection: config.vector_store.collection.clone(),
        collection_health,
        points,
        reranker,
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_connected {
        eprintln!(
            "\nWarning: embedding endpoint not reachable. Check embedding.url and ${}.",
            config.embedding.api_key_env
        );
    }
    if !vector_store_connected {
        eprintln!("\nWarning: Qdrant not running. Start with: docker compose up -d qdrant");
    } else if status.collection_health.is_none() {
        eprintln!("\nHint: collection not created yet. Run: bsb ingest");
    }

    Ok(())
}
