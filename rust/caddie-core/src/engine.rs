//! Engine facade: one inbound message in, one decision out.
//!
//! Wires the matcher, policy, and learning loop behind the narrow
//! interface the surrounding application consumes: `process_message`,
//! `list_pending_suggestions`, and `record_outcome`. Outbound delivery
//! goes through the abstract [`MessageSender`] capability; the engine
//! owns no transport.
//!
//! Messages within one conversation are processed in arrival order by
//! serializing on a per-conversation lock; distinct conversations share
//! nothing but the store and proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::{ActionTaken, ConversationMessage, ExecutionOutcome, ExecutionRecord, PatternMatch};
use crate::error::{EngineError, EngineResult};
use crate::learning::{LearningLoop, OperatorAction};
use crate::matcher::PatternMatcher;
use crate::policy::{Decision, ExecutionPolicy};
use crate::provider::{CachedEmbeddings, EmbeddingProvider};
use crate::store::{ExecutionStore, PatternDatabase, PatternStore};
use crate::template;

/// Outbound delivery capability, implemented by the messaging layer.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver text into a conversation.
    async fn send_message(&self, conversation_id: &str, text: &str) -> EngineResult<()>;
}

/// What the engine did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAction {
    /// A response was delivered without operator review.
    AutoSent,
    /// A response is queued for operator confirmation.
    Suggested,
    /// The message was handed to a human.
    Escalated,
}

/// Result of processing one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReply {
    /// Decision for this message.
    pub action: ReplyAction,
    /// Delivered or proposed response text, if any.
    pub text: Option<String>,
    /// The matched pattern, if any.
    pub pattern_id: Option<String>,
    /// Execution record id, when a record was created.
    pub execution_id: Option<String>,
}

impl EngineReply {
    fn escalated() -> Self {
        Self {
            action: ReplyAction::Escalated,
            text: None,
            pattern_id: None,
            execution_id: None,
        }
    }
}

type ConversationHistory = Arc<tokio::sync::Mutex<Vec<ConversationMessage>>>;

/// The pattern-learning support engine.
pub struct SupportEngine {
    db: PatternDatabase,
    matcher: PatternMatcher,
    policy: ExecutionPolicy,
    learning: LearningLoop,
    sender: Arc<dyn MessageSender>,
    conversations: parking_lot::Mutex<HashMap<String, ConversationHistory>>,
}

impl std::fmt::Debug for SupportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportEngine")
            .field("db", &self.db)
            .field("conversations", &self.conversations.lock().len())
            .finish_non_exhaustive()
    }
}

impl SupportEngine {
    /// Build an engine over a store, embedding provider, and sender.
    ///
    /// Validates configuration (including the policy dispatch table) and
    /// fails fast on any problem.
    pub fn new(
        db: PatternDatabase,
        embeddings: Arc<dyn EmbeddingProvider>,
        sender: Arc<dyn MessageSender>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        let cached: Arc<dyn EmbeddingProvider> = Arc::new(CachedEmbeddings::new(embeddings));
        let matcher = PatternMatcher::new(db.clone(), cached, config.matcher);
        let policy = ExecutionPolicy::new(config.policy)?;
        let learning = LearningLoop::new(db.clone(), config.learning);

        Ok(Self {
            db,
            matcher,
            policy,
            learning,
            sender,
            conversations: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Process one inbound customer message.
    ///
    /// Store trouble fails closed into escalation: the message is never
    /// dropped and never answered with a garbled reply.
    pub async fn process_message(
        &self,
        conversation_id: &str,
        channel_id: &str,
        message: &str,
        arrival_ts: DateTime<Utc>,
    ) -> EngineResult<EngineReply> {
        let conversation = self.conversation_entry(conversation_id);
        // Serializes processing per conversation id; later messages see
        // the effects of earlier ones.
        let mut history = conversation.lock().await;

        let matched = match self.matcher.match_message(message, &history).await {
            Ok(matched) => matched,
            Err(e @ EngineError::StoreUnavailable { .. }) => {
                tracing::error!(conversation_id, error = %e, "Store unavailable; escalating");
                history.push(ConversationMessage::customer(message, arrival_ts));
                return Ok(EngineReply::escalated());
            }
            Err(e) => return Err(e),
        };

        history.push(ConversationMessage::customer(message, arrival_ts));

        let Some(matched) = matched else {
            tracing::info!(conversation_id, "No pattern matched; escalating");
            return Ok(EngineReply::escalated());
        };

        let reply = match self
            .apply_match(conversation_id, channel_id, &matched, arrival_ts)
            .await
        {
            Ok(reply) => reply,
            Err(e @ EngineError::StoreUnavailable { .. }) => {
                tracing::error!(conversation_id, error = %e, "Store unavailable; escalating");
                EngineReply::escalated()
            }
            Err(e) => return Err(e),
        };

        if reply.action == ReplyAction::AutoSent {
            if let Some(text) = &reply.text {
                history.push(ConversationMessage::operator(text.clone(), arrival_ts));
            }
        }

        Ok(reply)
    }

    /// Suggestions awaiting an operator decision.
    pub async fn list_pending_suggestions(&self) -> EngineResult<Vec<ExecutionRecord>> {
        self.db.list_pending().await
    }

    /// Record an operator accept/modify/reject for an execution.
    pub async fn record_outcome(
        &self,
        execution_id: &str,
        action: OperatorAction,
    ) -> EngineResult<()> {
        self.learning.record_outcome(execution_id, action).await
    }

    /// The learning loop, for out-of-band jobs (confidence decay sweeps).
    #[must_use]
    pub fn learning(&self) -> &LearningLoop {
        &self.learning
    }

    async fn apply_match(
        &self,
        conversation_id: &str,
        channel_id: &str,
        matched: &PatternMatch,
        arrival_ts: DateTime<Utc>,
    ) -> EngineResult<EngineReply> {
        let decision = self.policy.decide(&matched.pattern, matched.matched_confidence);
        let rendered = template::fill(
            &matched.pattern.response_template,
            &self.context_vars(conversation_id, channel_id),
        );

        match decision {
            Decision::Escalate => {
                tracing::info!(
                    conversation_id,
                    pattern_id = %matched.pattern.id,
                    matched_confidence = matched.matched_confidence,
                    "Match below suggestion bar; escalating"
                );
                Ok(EngineReply::escalated())
            }
            Decision::Suggest => {
                let record = ExecutionRecord::new(
                    &matched.pattern.id,
                    conversation_id,
                    matched.matched_confidence,
                    ActionTaken::Suggested,
                    None,
                    arrival_ts,
                );
                self.db.append_execution(&record).await?;
                self.db.record_execution(&matched.pattern.id, false).await?;
                tracing::info!(
                    conversation_id,
                    pattern_id = %matched.pattern.id,
                    execution_id = %record.id,
                    "Response suggested to operator"
                );
                Ok(EngineReply {
                    action: ReplyAction::Suggested,
                    text: Some(rendered),
                    pattern_id: Some(matched.pattern.id.clone()),
                    execution_id: Some(record.id),
                })
            }
            Decision::AutoExecute => {
                match self.deliver(conversation_id, &rendered).await {
                    Ok(()) => {
                        let record = ExecutionRecord::new(
                            &matched.pattern.id,
                            conversation_id,
                            matched.matched_confidence,
                            ActionTaken::AutoSent,
                            Some(rendered.clone()),
                            arrival_ts,
                        );
                        self.db.append_execution(&record).await?;
                        self.db.record_execution(&matched.pattern.id, false).await?;
                        tracing::info!(
                            conversation_id,
                            pattern_id = %matched.pattern.id,
                            execution_id = %record.id,
                            "Response auto-sent"
                        );
                        Ok(EngineReply {
                            action: ReplyAction::AutoSent,
                            text: Some(rendered),
                            pattern_id: Some(matched.pattern.id.clone()),
                            execution_id: Some(record.id),
                        })
                    }
                    Err(e) => {
                        // Failed delivery surfaces to the human queue; the
                        // record lands terminal so nothing retries it later.
                        tracing::error!(
                            conversation_id,
                            pattern_id = %matched.pattern.id,
                            error = %e,
                            "Auto-send delivery failed; escalating"
                        );
                        let record = ExecutionRecord::new(
                            &matched.pattern.id,
                            conversation_id,
                            matched.matched_confidence,
                            ActionTaken::AutoSent,
                            None,
                            arrival_ts,
                        );
                        self.db.append_execution(&record).await?;
                        self.db
                            .finalize_execution(
                                &record.id,
                                ActionTaken::AutoSent,
                                None,
                                None,
                                ExecutionOutcome::Escalated,
                            )
                            .await?;
                        Ok(EngineReply {
                            action: ReplyAction::Escalated,
                            text: None,
                            pattern_id: Some(matched.pattern.id.clone()),
                            execution_id: Some(record.id),
                        })
                    }
                }
            }
        }
    }

    /// Deliver with at most one retry; a second failure escalates.
    async fn deliver(&self, conversation_id: &str, text: &str) -> EngineResult<()> {
        match self.sender.send_message(conversation_id, text).await {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(
                    conversation_id,
                    error = %first,
                    "Delivery failed; retrying once"
                );
                self.sender
                    .send_message(conversation_id, text)
                    .await
                    .map_err(|second| EngineError::DeliveryFailed {
                        attempts: 2,
                        reason: second.to_string(),
                    })
            }
        }
    }

    fn conversation_entry(&self, conversation_id: &str) -> ConversationHistory {
        let mut conversations = self.conversations.lock();
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    fn context_vars(&self, conversation_id: &str, channel_id: &str) -> HashMap<String, String> {
        HashMap::from([
            ("conversation_id".to_string(), conversation_id.to_string()),
            ("channel_id".to_string(), channel_id.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LearnedFrom, Pattern, PatternType};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for EchoEmbeddings {
        async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
            let mut v = vec![0.0f32; 256];
            for word in text.to_lowercase().split_whitespace() {
                let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
                for b in word.bytes() {
                    hash ^= u64::from(b);
                    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
                }
                v[(hash % 256) as usize] += 1.0;
            }
            Ok(v)
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
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

    #[derive(Default)]
    struct FailingSender {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl MessageSender for FailingSender {
        async fn send_message(&self, _conversation_id: &str, _text: &str) -> EngineResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::provider("downstream send error"))
        }
    }

    fn hours_pattern(confidence: f32, auto: bool) -> Pattern {
        Pattern::new(
            "what are your hours",
            "We're open 9am-9pm",
            PatternType::Hours,
            confidence,
            LearnedFrom::Manual,
            Utc::now(),
        )
        .with_auto_executable(auto)
    }

    async fn engine_with(
        patterns: Vec<Pattern>,
        sender: Arc<dyn MessageSender>,
    ) -> (SupportEngine, PatternDatabase) {
        let db = PatternDatabase::in_memory();
        for p in patterns {
            db.insert(&p).await.unwrap();
        }
        let engine = SupportEngine::new(
            db.clone(),
            Arc::new(EchoEmbeddings),
            sender,
            EngineConfig::default(),
        )
        .unwrap();
        (engine, db)
    }

    #[tokio::test]
    async fn test_confident_pattern_auto_sends() {
        let sender = Arc::new(RecordingSender::default());
        let (engine, db) = engine_with(vec![hours_pattern(0.8, true)], sender.clone()).await;

        let reply = engine
            .process_message("conv-1", "chan-1", "what are your hours?", Utc::now())
            .await
            .unwrap();

        assert_eq!(reply.action, ReplyAction::AutoSent);
        assert_eq!(reply.text.as_deref(), Some("We're open 9am-9pm"));
        assert_eq!(sender.sent.lock().len(), 1);

        let pattern = db.get(reply.pattern_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(pattern.execution_count, 1);
    }

    #[tokio::test]
    async fn test_moderate_confidence_suggests() {
        let sender = Arc::new(RecordingSender::default());
        let (engine, _db) = engine_with(vec![hours_pattern(0.6, true)], sender.clone()).await;

        let reply = engine
            .process_message("conv-1", "chan-1", "what are your hours?", Utc::now())
            .await
            .unwrap();

        assert_eq!(reply.action, ReplyAction::Suggested);
        assert!(reply.execution_id.is_some());
        // Nothing was delivered.
        assert!(sender.sent.lock().is_empty());

        let pending = engine.list_pending_suggestions().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_message_escalates() {
        let sender = Arc::new(RecordingSender::default());
        let (engine, _db) = engine_with(vec![hours_pattern(0.8, true)], sender).await;

        let reply = engine
            .process_message("conv-1", "chan-1", "my dog ate the scorecard", Utc::now())
            .await
            .unwrap();

        assert_eq!(reply.action, ReplyAction::Escalated);
        assert!(reply.execution_id.is_none());
    }

    #[tokio::test]
    async fn test_delivery_failure_retries_once_then_escalates() {
        let sender = Arc::new(FailingSender::default());
        let (engine, db) = engine_with(vec![hours_pattern(0.8, true)], sender.clone()).await;

        let reply = engine
            .process_message("conv-1", "chan-1", "what are your hours?", Utc::now())
            .await
            .unwrap();

        assert_eq!(reply.action, ReplyAction::Escalated);
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 2);

        let record = db
            .get_execution(reply.execution_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.outcome, ExecutionOutcome::Escalated);
    }

    #[tokio::test]
    async fn test_accept_feedback_reaches_pattern_counters() {
        let sender = Arc::new(RecordingSender::default());
        let (engine, db) = engine_with(vec![hours_pattern(0.6, true)], sender).await;

        let reply = engine
            .process_message("conv-1", "chan-1", "what are your hours?", Utc::now())
            .await
            .unwrap();
        let execution_id = reply.execution_id.unwrap();

        engine
            .record_outcome(&execution_id, OperatorAction::Accept)
            .await
            .unwrap();

        let pattern = db.get(&reply.pattern_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(pattern.execution_count, 1);
        assert_eq!(pattern.success_count, 1);
        assert!(pattern.confidence_score > 0.6);
        assert!(engine.list_pending_suggestions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_accumulates_per_conversation() {
        let sender = Arc::new(RecordingSender::default());
        let (engine, _db) = engine_with(vec![hours_pattern(0.8, true)], sender).await;

        engine
            .process_message("conv-1", "chan-1", "hi there", Utc::now())
            .await
            .unwrap();
        engine
            .process_message("conv-1", "chan-1", "what are your hours?", Utc::now())
            .await
            .unwrap();

        let history = engine.conversation_entry("conv-1");
        let history = history.lock().await;
        // Customer messages plus the auto-sent reply.
        assert_eq!(history.len(), 3);
    }
}
