//! Pattern matching over the store.
//!
//! Candidate selection incorporates conversation context, not only the
//! current message: short replies like "thanks" or "ok" are ambiguous on
//! their own and only disambiguate against the preceding exchange. The
//! contextual query folds the trailing history into the embedded text and
//! repeats the newest message to keep current intent dominant.
//!
//! When the embedding provider is unavailable the matcher degrades to
//! keyword (trigram) ranking within the same call; provider trouble never
//! fails a message.

use std::sync::Arc;

use crate::config::MatcherConfig;
use crate::domain::{ConversationMessage, PatternMatch};
use crate::error::EngineResult;
use crate::logging::OpTimer;
use crate::provider::EmbeddingProvider;
use crate::signature;
use crate::store::{PatternDatabase, PatternStore, ScoredPattern};

/// Ranks stored patterns against an inbound message.
pub struct PatternMatcher {
    store: PatternDatabase,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: MatcherConfig,
}

impl std::fmt::Debug for PatternMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternMatcher")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PatternMatcher {
    /// Create a matcher over a store and embedding provider.
    #[must_use]
    pub fn new(
        store: PatternDatabase,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Match a message against the pattern store.
    ///
    /// Returns at most one candidate: the top pattern by combined score,
    /// or `None` when nothing clears the match threshold. Conversation
    /// history may be empty (new conversation); segmentation happens
    /// upstream and the boundaries are trusted as given.
    pub async fn match_message(
        &self,
        message: &str,
        history: &[ConversationMessage],
    ) -> EngineResult<Option<PatternMatch>> {
        let timer = OpTimer::new("matcher", "match_message");

        let sig = signature::normalize(message);
        let query = self.contextual_query(message, history);

        let vector = match self.embeddings.embed(&query).await {
            Ok(vector) => Some(vector),
            Err(e) if e.is_degradable() => {
                tracing::warn!(
                    error = %e,
                    "Embedding unavailable; using keyword ranking for this message"
                );
                None
            }
            Err(e) => {
                timer.finish_with_result::<(), _>(Err(&e));
                return Err(e);
            }
        };
        let semantic = vector.is_some();

        let candidates = self
            .store
            .find_candidates(&sig, vector.as_deref(), self.config.top_k)
            .await?;

        let best = self.rerank(candidates);
        timer.finish();

        match best {
            Some((candidate, combined)) if combined >= self.config.min_match_score => {
                tracing::debug!(
                    pattern_id = %candidate.pattern.id,
                    matched_confidence = combined,
                    semantic,
                    "Pattern matched"
                );
                Ok(Some(PatternMatch {
                    pattern: candidate.pattern,
                    matched_confidence: combined,
                    semantic,
                }))
            }
            Some((candidate, combined)) => {
                tracing::debug!(
                    pattern_id = %candidate.pattern.id,
                    matched_confidence = combined,
                    threshold = self.config.min_match_score,
                    "Best candidate below match threshold"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Build the contextual query: trailing history plus the new message,
    /// with the new message repeated to bias toward current intent.
    fn contextual_query(&self, message: &str, history: &[ConversationMessage]) -> String {
        let start = history.len().saturating_sub(self.config.context_window);
        let mut parts: Vec<&str> = history[start..].iter().map(|m| m.text.as_str()).collect();
        for _ in 0..self.config.recency_boost.max(1) {
            parts.push(message);
        }
        parts.join("\n")
    }

    /// Combined score re-ranking. Ties break deterministically: higher
    /// execution count first (more battle-tested pattern), then id.
    fn rerank(&self, mut candidates: Vec<ScoredPattern>) -> Option<(ScoredPattern, f32)> {
        candidates.sort_by(|a, b| {
            let score_a = self.combined_score(a);
            let score_b = self.combined_score(b);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.pattern.execution_count.cmp(&a.pattern.execution_count))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        candidates.into_iter().next().map(|c| {
            let score = self.combined_score(&c);
            (c, score)
        })
    }

    fn combined_score(&self, candidate: &ScoredPattern) -> f32 {
        self.config.semantic_weight * candidate.similarity
            + self.config.confidence_weight * candidate.pattern.confidence_score
    }
}
