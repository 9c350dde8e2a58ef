//! OpenAI-compatible provider driver.
//!
//! Serves both provider contracts against any OpenAI-compatible API:
//! `/v1/embeddings` for vectors and `/v1/chat/completions` for free-form
//! rule extraction.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, EngineResult};

use super::{EmbeddingProvider, ExtractedRule, RuleExtractor};

/// Extraction calls tolerate a longer deadline than the tight per-message
/// embedding budget; they only run on the batch import path.
const EXTRACTION_TIMEOUT_SECS: u64 = 30;

const EXTRACTION_SYSTEM_PROMPT: &str = "You convert support-desk notes into reusable \
request/response rules. Reply with a JSON array only; each element has the keys \
\"trigger\" (the customer phrasing), \"response\" (the reply text), \"category\" \
(one of booking, tech, faq, hours, access, general) and \"confidence\" (0 to 1). \
Skip anything that is not a clear request/response rule.";

/// OpenAI-compatible embedding and extraction driver.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    config: EmbeddingConfig,
    client: Client,
}

impl OpenAiProvider {
    /// Create a new driver from provider settings.
    ///
    /// The HTTP client carries the configured bounded timeout; on expiry
    /// callers degrade to keyword matching.
    #[must_use]
    pub fn new(config: EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
        });

        let request = self.authorize(self.client.post(self.endpoint("/v1/embeddings")).json(&body));
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::provider(format!(
                "embeddings API error ({status}): {detail}"
            )));
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EngineError::provider("embeddings response contained no vectors"))?;

        if vector.len() != self.config.dimensions {
            tracing::warn!(
                expected = self.config.dimensions,
                actual = vector.len(),
                "Embedding dimensionality differs from configuration"
            );
        }

        Ok(vector)
    }
}

#[async_trait]
impl RuleExtractor for OpenAiProvider {
    async fn extract_rules(&self, text: &str) -> EngineResult<Vec<ExtractedRule>> {
        let body = serde_json::json!({
            "model": self.config.extraction_model,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": EXTRACTION_SYSTEM_PROMPT},
                {"role": "user", "content": text},
            ],
        });

        let request = self
            .authorize(
                self.client
                    .post(self.endpoint("/v1/chat/completions"))
                    .json(&body),
            )
            .timeout(std::time::Duration::from_secs(EXTRACTION_TIMEOUT_SECS));
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::provider(format!(
                "extraction API error ({status}): {detail}"
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::provider("extraction response contained no choices"))?;

        let rules: Vec<ExtractedRule> = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| EngineError::provider(format!("extraction output was not valid JSON: {e}")))?;

        Ok(rules)
    }
}

/// Models wrap JSON in markdown fences often enough to be worth handling.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_plain() {
        assert_eq!(strip_code_fence("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn test_strip_code_fence_fenced() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\n[]\n```"), "[]");
    }

    #[test]
    fn test_endpoint_join_handles_trailing_slash() {
        let mut cfg = EmbeddingConfig::default();
        cfg.base_url = "https://example.test/".to_string();
        let provider = OpenAiProvider::new(cfg);
        assert_eq!(
            provider.endpoint("/v1/embeddings"),
            "https://example.test/v1/embeddings"
        );
    }

    #[test]
    fn test_extracted_rule_parses_with_optional_fields() {
        let json = r#"[{"trigger": "hours?", "response": "9-9"}]"#;
        let rules: Vec<ExtractedRule> = serde_json::from_str(json).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].category.is_none());
    }
}
