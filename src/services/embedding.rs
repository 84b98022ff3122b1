//! Embedding oracle: text in, fixed-length vectors out.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::retry::{RetryConfig, with_retry};
use crate::utils::text::normalize_for_embedding;

/// Fixed input used to discover the embedding dimensionality.
pub const DIMENSION_PROBE: &str = "This is a test";

/// Converts text to vectors. The same instance must serve ingestion and
/// queries so both land in one embedding space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed stored passages, one vector per input in input order.
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Output dimensionality, found by embedding a fixed probe string.
    async fn probe_dimension(&self) -> Result<u64, EmbeddingError> {
        let vector = self.embed_query(DIMENSION_PROBE).await?;
        if vector.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "probe returned an empty vector".to_string(),
            ));
        }
        Ok(vector.len() as u64)
    }
}

/// Request body for the `/embeddings` endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Client for an OpenAI-compatible embeddings API.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
    retry: RetryConfig,
    preprocess: bool,
}

impl EmbeddingClient {
    /// Create a client; the API key is read from the environment variable
    /// named by `api_key_env`. A missing key is allowed for local servers.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            batch_size: (config.batch_size as usize).max(1),
            retry: RetryConfig::new(config.max_attempts),
            preprocess: config.preprocess,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the endpoint answers `GET /models`.
    pub async fn health_check(&self) -> Result<(), EmbeddingError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::ServerError(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn prepare(&self, texts: Vec<String>) -> Vec<String> {
        if self.preprocess {
            texts.iter().map(|t| normalize_for_embedding(t)).collect()
        } else {
            texts
        }
    }

    async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let texts = self.prepare(texts);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = with_retry(&self.retry, || self.embed_single_batch(batch.to_vec()))
                .await
                .into_result()?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    async fn embed_single_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let expected = texts.len();
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        order_embeddings(embed_response.data, expected)
    }
}

/// Put response items back in request order and check the count.
fn order_embeddings(
    mut items: Vec<EmbedItem>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if items.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            items.len()
        )));
    }
    items.sort_by_key(|item| item.index);
    Ok(items.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_all(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_all(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeEmbedder;
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_base_url_trimming() {
        let config = EmbeddingConfig {
            url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
        assert_eq!(client.model(), "text-embedding-3-small");
    }

    #[test]
    fn test_order_embeddings() {
        let items = vec![
            EmbedItem {
                embedding: vec![2.0],
                index: 1,
            },
            EmbedItem {
                embedding: vec![1.0],
                index: 0,
            },
        ];
        assert_eq!(
            order_embeddings(items, 2).unwrap(),
            vec![vec![1.0], vec![2.0]]
        );
        assert!(order_embeddings(Vec::new(), 1).is_err());
    }

    #[test]
    fn test_parse_openai_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2]}],"model":"m"}"#;
        let response: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data[0].embedding, vec![0.1, 0.2]);
    }

    /// Serve `503` on every request and count the requests seen.
    async fn unavailable_endpoint() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let n = match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        buf.extend_from_slice(&chunk[..n]);
                        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                            continue;
                        };
                        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                        let body_len = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + body_len {
                            break;
                        }
                    }
                    seen.fetch_add(1, Ordering::SeqCst);
                    let reply = "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\ndown";
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{addr}/v1"), requests)
    }

    #[tokio::test]
    async fn test_failing_endpoint_is_called_once_by_default() {
        let (url, requests) = unavailable_endpoint().await;
        let config = EmbeddingConfig {
            url,
            api_key_env: "BSB_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        };
        assert_eq!(config.max_attempts, 1);

        let client = EmbeddingClient::new(&config).unwrap();
        let err = client.embed_query("神爱世人").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ServerError(ref msg) if msg.contains("503")));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extra_attempts_are_opt_in() {
        let (url, requests) = unavailable_endpoint().await;
        let config = EmbeddingConfig {
            url,
            api_key_env: "BSB_TEST_UNSET_KEY".to_string(),
            max_attempts: 2,
            ..Default::default()
        };

        let mut client = EmbeddingClient::new(&config).unwrap();
        client.retry = client.retry.with_initial_delay(Duration::from_millis(1));
        assert!(client.embed_query("love").await.is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_probe_dimension() {
        let embedder = FakeEmbedder::new(12);
        assert_eq!(embedder.probe_dimension().await.unwrap(), 12);
    }
}
