//! Local cross-encoder scoring with ONNX Runtime.
//!
//! Expects `model.onnx` and `tokenizer.json` in the model directory. Each
//! `(query, passage)` pair is encoded together and the single logit is
//! squashed to `0..1`.

use async_trait::async_trait;
use ndarray::ArrayViewD;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams, TruncationStrategy};

use super::{RelevanceScorer, ScoredIndex};
use crate::error::{ModelError, SearchError};
use crate::models::CrossEncoderConfig;

struct Model {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    token_types: bool,
}

#[derive(Clone)]
pub struct CrossEncoder {
    model: Arc<Model>,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn intra_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl CrossEncoder {
    pub fn from_config(config: &CrossEncoderConfig) -> Result<Self, ModelError> {
        let dir = config.resolved_model_dir().ok_or_else(|| {
            ModelError::NotFound("no model_dir configured and no data directory".to_string())
        })?;
        Self::load(&dir, config.max_length)
    }

    pub fn load(model_dir: &Path, max_length: usize) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(ModelError::NotFound(path.display().to_string()));
            }
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(intra_threads())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let token_types = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                strategy: TruncationStrategy::OnlySecond,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(dir = %model_dir.display(), "loaded cross-encoder");
        Ok(Self {
            model: Arc::new(Model {
                session: Mutex::new(session),
                tokenizer,
                token_types,
            }),
        })
    }
}

impl Model {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, ModelError> {
        let pairs: Vec<(String, String)> = texts
            .iter()
            .map(|t| (query.to_string(), t.clone()))
            .collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let batch = encodings.len();
        let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut input_ids = vec![0i64; batch * width];
        let mut attention_mask = vec![0i64; batch * width];
        let mut type_ids = vec![0i64; batch * width];
        for (i, encoding) in encodings.iter().enumerate() {
            let row = i * width;
            for (j, ((&id, &mask), &ty)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate()
            {
                input_ids[row + j] = id as i64;
                attention_mask[row + j] = mask as i64;
                type_ids[row + j] = ty as i64;
            }
        }

        let tensor = |data: Vec<i64>| {
            Tensor::from_array(([batch, width], data))
                .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))
        };
        let ids = tensor(input_ids)?;
        let mask = tensor(attention_mask)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = if self.token_types {
            session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => tensor(type_ids)?
            ])
        } else {
            session.run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])
        }
        .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let logits: ArrayViewD<'_, f32> = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        match logits.shape() {
            [n] if *n == batch => Ok((0..batch).map(|i| sigmoid(logits[[i]])).collect()),
            [n, _] if *n == batch => Ok((0..batch).map(|i| sigmoid(logits[[i, 0]])).collect()),
            shape => Err(ModelError::InferenceError(format!(
                "unexpected output shape: {shape:?}"
            ))),
        }
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoder {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<ScoredIndex>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let texts = texts.to_vec();
        let scores = tokio::task::spawn_blocking(move || model.score_pairs(&query, &texts))
            .await
            .map_err(|e| SearchError::Upstream(format!("cross-encoder task failed: {e}")))?
            .map_err(|e| SearchError::Upstream(format!("cross-encoder: {e}")))?;

        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| ScoredIndex::new(i, s))
            .collect())
    }

    fn name(&self) -> &'static str {
        "cross_encoder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(8.0) > 0.99);
        assert!(sigmoid(-8.0) < 0.01);
    }

    #[test]
    fn test_missing_model_files() {
        let temp = TempDir::new().unwrap();
        let err = CrossEncoder::load(temp.path(), 512).err().unwrap();
        assert!(matches!(err, ModelError::NotFound(path) if path.ends_with("model.onnx")));
    }
}
