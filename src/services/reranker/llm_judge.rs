//! Relevance scoring by a chat model asked for JSON.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{RelevanceScorer, ScoredIndex};
use crate::error::SearchError;
use crate::models::LlmJudgeConfig;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. You output valid JSON.";

/// Build the ranking prompt. Candidates are numbered from 0 in submitted
/// order and scored on a 0 to 5 scale.
pub fn judge_prompt(query: &str, texts: &[String]) -> String {
    let documents = texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("ID {i}:\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a relevance ranking assistant.\n\
         Query: \"{query}\"\n\n\
         Documents:\n{documents}\n\n\
         Give every document a relevance score from 0 to 5, where 0 means very \
         irrelevant and 5 means very relevant. Sort them by score from high to low.\n\
         Return only JSON in this form:\n\
         {{\"ranked\": [{{\"index\": <ID>, \"score\": <score>}}]}}"
    )
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the judge's JSON reply. Indices must be whole numbers; scores may
/// be integers, floats or numeric strings. Range checks happen in ranking.
pub fn parse_judgement(content: &str) -> Result<Vec<ScoredIndex>, SearchError> {
    let invalid = |msg: String| SearchError::Upstream(format!("invalid judge response: {msg}"));

    let root: Value = serde_json::from_str(content.trim()).map_err(|e| invalid(e.to_string()))?;
    let ranked = root
        .get("ranked")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing 'ranked' array".to_string()))?;

    ranked
        .iter()
        .map(|entry| {
            let index = entry
                .get("index")
                .and_then(number)
                .filter(|i| i.fract() == 0.0)
                .ok_or_else(|| invalid(format!("bad index in {entry}")))?;
            let score = entry
                .get("score")
                .and_then(number)
                .ok_or_else(|| invalid(format!("bad score in {entry}")))?;
            Ok(ScoredIndex {
                index: index as i64,
                score: score as f32,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client used as a relevance judge.
#[derive(Debug, Clone)]
pub struct LlmJudge {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmJudge {
    pub fn new(config: &LlmJudgeConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.is_empty()),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, SearchError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.0,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SearchError::Upstream(format!("judge request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Upstream(format!(
                "judge returned status {status}: {body}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Upstream(format!("invalid judge response: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SearchError::Upstream("judge returned no content".to_string()))
    }
}

#[async_trait]
impl RelevanceScorer for LlmJudge {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<ScoredIndex>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let content = self.complete(&judge_prompt(query, texts)).await?;
        tracing::debug!(model = %self.model, candidates = texts.len(), "judge replied");
        parse_judgement(&content)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_numbers_candidates_from_zero() {
        let prompt = judge_prompt(
            "what is love",
            &["爱是恒久忍耐".to_string(), "起初神创造天地".to_string()],
        );
        assert!(prompt.contains("Query: \"what is love\""));
        assert!(prompt.contains("ID 0:\n爱是恒久忍耐\n\nID 1:\n起初神创造天地"));
        assert!(prompt.contains("{\"ranked\": [{\"index\": <ID>, \"score\": <score>}]}"));
    }

    #[test]
    fn test_parse_judgement_accepts_mixed_numbers() {
        let parsed = parse_judgement(
            r#"{"ranked": [{"index": 2, "score": 5}, {"index": "0", "score": 3.5}, {"index": 1.0, "score": "1"}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                ScoredIndex { index: 2, score: 5.0 },
                ScoredIndex { index: 0, score: 3.5 },
                ScoredIndex { index: 1, score: 1.0 },
            ]
        );
        assert!(parse_judgement(r#"{"ranked": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_judgement_rejects_malformed() {
        for bad in [
            "not json",
            r#"{"scores": []}"#,
            r#"{"ranked": [{"index": 1.5, "score": 3}]}"#,
            r#"{"ranked": [{"index": 0}]}"#,
            r#"{"ranked": [{"index": 0, "score": "high"}]}"#,
        ] {
            let err = parse_judgement(bad).unwrap_err();
            assert!(err.is_upstream(), "{bad}");
        }
    }
}
