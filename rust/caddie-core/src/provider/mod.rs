//! Embedding and extraction provider traits.
//!
//! The engine consumes external AI services strictly through these two
//! contracts: text in, vector out ([`EmbeddingProvider`]) and text in,
//! structured rules out ([`RuleExtractor`]). No vendor API shape leaks
//! past this module.
//!
//! Provider failures surface as [`EngineError::ProviderUnavailable`];
//! callers degrade to keyword matching (matcher) or fail a single row
//! (importer) rather than aborting the whole request.

pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

pub use openai::OpenAiProvider;

/// Converts text into a fixed-length vector via an external model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Stateless, but each call has latency and
    /// monetary cost; see [`CachedEmbeddings`].
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>>;
}

/// Extracts `{trigger, response, category, confidence}` tuples from
/// free-form text via an external text-understanding model.
#[async_trait]
pub trait RuleExtractor: Send + Sync {
    /// Extract candidate rules from unstructured input.
    async fn extract_rules(&self, text: &str) -> EngineResult<Vec<ExtractedRule>>;
}

/// A candidate rule extracted from bulk input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRule {
    /// Representative trigger phrase.
    pub trigger: String,
    /// Response text.
    pub response: String,
    /// Optional category tag.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional confidence estimate from the extractor.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Memoizing wrapper around an [`EmbeddingProvider`].
///
/// Repeated embeddings of identical text within a batch or request hit
/// the cache instead of the provider. The cache is cleared wholesale once
/// it exceeds a fixed capacity; entries are immutable so staleness is not
/// a concern.
pub struct CachedEmbeddings {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<HashMap<String, Vec<f32>>>,
    capacity: usize,
}

impl std::fmt::Debug for CachedEmbeddings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEmbeddings")
            .field("entries", &self.cache.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl CachedEmbeddings {
    /// Wrap a provider with a memo cache.
    #[must_use]
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            capacity: 1024,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddings {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        if let Some(hit) = self.cache.lock().get(text) {
            return Ok(hit.clone());
        }
        let vector = self.inner.embed(text).await?;
        let mut cache = self.cache.lock();
        if cache.len() >= self.capacity {
            cache.clear();
        }
        cache.insert(text.to_string(), vector.clone());
        Ok(vector)
    }
}

/// Cosine similarity between two vectors, in [-1, 1].
///
/// Mismatched or zero-length vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
