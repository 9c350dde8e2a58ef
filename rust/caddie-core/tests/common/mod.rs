//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use caddie_core::error::EngineResult;
use caddie_core::provider::{EmbeddingProvider, ExtractedRule, RuleExtractor};
use caddie_core::MessageSender;

/// Deterministic bag-of-words embedding keyed on 4-letter word stems, so
/// related inflections ("cancel", "cancelled", "cancelling") land in the
/// same bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct StemEmbeddings;

pub fn stem_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 256];
    for word in text.to_lowercase().split_whitespace() {
        let stem: String = word
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(4)
            .collect();
        if stem.is_empty() {
            continue;
        }
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in stem.bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        v[(hash % 256) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for StemEmbeddings {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        Ok(stem_vector(text))
    }
}

/// Extractor that returns a fixed rule set.
#[derive(Debug, Default)]
pub struct FixedExtractor {
    pub rules: Vec<ExtractedRule>,
}

#[async_trait]
impl RuleExtractor for FixedExtractor {
    async fn extract_rules(&self, _text: &str) -> EngineResult<Vec<ExtractedRule>> {
        Ok(self.rules.clone())
    }
}

/// Sender that records everything it delivers.
#[derive(Debug, Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, conversation_id: &str, text: &str) -> EngineResult<()> {
        self.sent
            .lock()
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
