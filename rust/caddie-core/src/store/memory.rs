//! In-memory store for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{ActionTaken, ExecutionOutcome, ExecutionRecord, Pattern};
use crate::error::{EngineError, EngineResult};
use crate::signature::Signature;

use super::{find_merge_target, score_candidates, ExecutionStore, PatternStore, ScoredPattern, UpsertOutcome};

/// In-memory pattern and execution store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPatternStore {
    patterns: Arc<RwLock<HashMap<String, Pattern>>>,
    executions: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl InMemoryPatternStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn insert(&self, pattern: &Pattern) -> EngineResult<String> {
        let mut patterns = self.patterns.write();
        patterns.insert(pattern.id.clone(), pattern.clone());
        Ok(pattern.id.clone())
    }

    async fn get(&self, id: &str) -> EngineResult<Option<Pattern>> {
        Ok(self.patterns.read().get(id).cloned())
    }

    async fn find_candidates(
        &self,
        signature: &Signature,
        vector: Option<&[f32]>,
        top_k: usize,
    ) -> EngineResult<Vec<ScoredPattern>> {
        let active: Vec<Pattern> = self
            .patterns
            .read()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        Ok(score_candidates(active, signature, vector, top_k))
    }

    async fn upsert_merging(
        &self,
        pattern: Pattern,
        dedup_threshold: f32,
        reinforcement: f32,
    ) -> EngineResult<UpsertOutcome> {
        let mut patterns = self.patterns.write();
        let snapshot: Vec<Pattern> = patterns.values().cloned().collect();
        if let Some(target_id) = find_merge_target(&snapshot, &pattern, dedup_threshold) {
            let target = patterns
                .get_mut(&target_id)
                .ok_or_else(|| EngineError::UnknownPattern {
                    id: target_id.clone(),
                })?;
            target.confidence_score = (target.confidence_score + reinforcement).clamp(0.0, 1.0);
            target.last_seen_at = pattern.last_seen_at;
            if target.embedding.is_none() {
                target.embedding = pattern.embedding;
            }
            return Ok(UpsertOutcome::Merged(target_id));
        }
        let id = pattern.id.clone();
        patterns.insert(id.clone(), pattern);
        Ok(UpsertOutcome::Created(id))
    }

    async fn record_execution(&self, pattern_id: &str, success: bool) -> EngineResult<()> {
        let mut patterns = self.patterns.write();
        let pattern = patterns
            .get_mut(pattern_id)
            .ok_or_else(|| EngineError::UnknownPattern {
                id: pattern_id.to_string(),
            })?;
        pattern.execution_count += 1;
        if success {
            pattern.success_count += 1;
        }
        pattern.last_seen_at = chrono::Utc::now();
        Ok(())
    }

    async fn record_success(&self, pattern_id: &str) -> EngineResult<()> {
        let mut patterns = self.patterns.write();
        let pattern = patterns
            .get_mut(pattern_id)
            .ok_or_else(|| EngineError::UnknownPattern {
                id: pattern_id.to_string(),
            })?;
        pattern.success_count += 1;
        Ok(())
    }

    async fn update_confidence(&self, pattern_id: &str, delta: f32) -> EngineResult<f32> {
        let mut patterns = self.patterns.write();
        let pattern = patterns
            .get_mut(pattern_id)
            .ok_or_else(|| EngineError::UnknownPattern {
                id: pattern_id.to_string(),
            })?;
        pattern.confidence_score = (pattern.confidence_score + delta).clamp(0.0, 1.0);
        Ok(pattern.confidence_score)
    }

    async fn set_active(&self, pattern_id: &str, active: bool) -> EngineResult<()> {
        let mut patterns = self.patterns.write();
        let pattern = patterns
            .get_mut(pattern_id)
            .ok_or_else(|| EngineError::UnknownPattern {
                id: pattern_id.to_string(),
            })?;
        pattern.is_active = active;
        Ok(())
    }

    async fn set_response_template(&self, pattern_id: &str, template: &str) -> EngineResult<()> {
        let mut patterns = self.patterns.write();
        let pattern = patterns
            .get_mut(pattern_id)
            .ok_or_else(|| EngineError::UnknownPattern {
                id: pattern_id.to_string(),
            })?;
        pattern.response_template = template.to_string();
        Ok(())
    }

    async fn list_active(&self) -> EngineResult<Vec<Pattern>> {
        Ok(self
            .patterns
            .read()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryPatternStore {
    async fn append_execution(&self, record: &ExecutionRecord) -> EngineResult<String> {
        let mut executions = self.executions.write();
        executions.push(record.clone());
        Ok(record.id.clone())
    }

    async fn get_execution(&self, id: &str) -> EngineResult<Option<ExecutionRecord>> {
        Ok(self
            .executions
            .read()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn finalize_execution(
        &self,
        id: &str,
        action: ActionTaken,
        response_sent: Option<&str>,
        modification: Option<&str>,
        outcome: ExecutionOutcome,
    ) -> EngineResult<()> {
        let mut executions = self.executions.write();
        let record = executions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EngineError::UnknownExecution { id: id.to_string() })?;
        if record.is_terminal() {
            tracing::warn!(execution_id = %id, "Ignoring update to already-finalized execution");
            return Ok(());
        }
        record.action_taken = action;
        if let Some(sent) = response_sent {
            record.response_sent = Some(sent.to_string());
        }
        record.operator_modification = modification.map(ToString::to_string);
        record.outcome = outcome;
        Ok(())
    }

    async fn list_pending(&self) -> EngineResult<Vec<ExecutionRecord>> {
        Ok(self
            .executions
            .read()
            .iter()
            .filter(|r| r.action_taken == ActionTaken::Suggested && !r.is_terminal())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LearnedFrom, PatternType};
    use chrono::Utc;

    fn sample_pattern(trigger: &str, response: &str) -> Pattern {
        Pattern::new(
            trigger,
            response,
            PatternType::General,
            0.5,
            LearnedFrom::Manual,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryPatternStore::new();
        let pattern = sample_pattern("what are your hours", "9-9");
        let id = store.insert(&pattern).await.unwrap();
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.trigger_text, "what are your hours");
    }

    #[tokio::test]
    async fn test_find_candidates_excludes_inactive() {
        let store = InMemoryPatternStore::new();
        let pattern = sample_pattern("what are your hours", "9-9");
        let id = store.insert(&pattern).await.unwrap();
        store.set_active(&id, false).await.unwrap();

        let sig = crate::signature::normalize("what are your hours");
        let found = store.find_candidates(&sig, None, 5).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_path_excludes_null_embeddings() {
        let store = InMemoryPatternStore::new();
        store
            .insert(&sample_pattern("simulator is frozen", "try restarting"))
            .await
            .unwrap();

        let sig = crate::signature::normalize("screen stuck");
        let query = vec![1.0, 0.0, 0.0];
        let found = store.find_candidates(&sig, Some(&query), 5).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_exact_signature_match_survives_semantic_path() {
        let store = InMemoryPatternStore::new();
        store
            .insert(&sample_pattern("simulator is frozen", "try restarting"))
            .await
            .unwrap();

        let sig = crate::signature::normalize("Simulator is FROZEN!");
        let query = vec![1.0, 0.0, 0.0];
        let found = store.find_candidates(&sig, Some(&query), 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!((found[0].similarity - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_upsert_merges_near_duplicates() {
        let store = InMemoryPatternStore::new();
        let original = sample_pattern("what are your hours", "9-9");
        store.insert(&original).await.unwrap();

        let duplicate = sample_pattern("what are your hours?", "9 to 9");
        let outcome = store.upsert_merging(duplicate, 0.9, 0.02).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Merged(original.id.clone()));

        let merged = store.get(&original.id).await.unwrap().unwrap();
        assert!(merged.confidence_score > original.confidence_score);
    }

    #[tokio::test]
    async fn test_upsert_creates_distinct_patterns() {
        let store = InMemoryPatternStore::new();
        store
            .insert(&sample_pattern("what are your hours", "9-9"))
            .await
            .unwrap();

        let distinct = sample_pattern("my card got declined", "let me retry that");
        let outcome = store.upsert_merging(distinct, 0.9, 0.02).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Created(_)));
    }

    #[tokio::test]
    async fn test_update_confidence_clamps() {
        let store = InMemoryPatternStore::new();
        let pattern = sample_pattern("hi", "hello");
        let id = store.insert(&pattern).await.unwrap();

        let up = store.update_confidence(&id, 5.0).await.unwrap();
        assert!((up - 1.0).abs() < f32::EPSILON);
        let down = store.update_confidence(&id, -5.0).await.unwrap();
        assert!((down - 0.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_concurrent_record_execution_loses_no_updates() {
        let store = InMemoryPatternStore::new();
        let pattern = sample_pattern("hi", "hello");
        let id = store.insert(&pattern).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.record_execution(&id, false).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.execution_count, 50);
    }

    #[tokio::test]
    async fn test_finalize_is_single_shot() {
        let store = InMemoryPatternStore::new();
        let record = ExecutionRecord::new(
            "pat-1",
            "conv-1",
            0.7,
            ActionTaken::Suggested,
            None,
            Utc::now(),
        );
        store.append_execution(&record).await.unwrap();

        store
            .finalize_execution(
                &record.id,
                ActionTaken::Rejected,
                None,
                None,
                ExecutionOutcome::Escalated,
            )
            .await
            .unwrap();

        // A second update must not overwrite the terminal state.
        store
            .finalize_execution(
                &record.id,
                ActionTaken::Modified,
                Some("changed"),
                Some("changed"),
                ExecutionOutcome::Resolved,
            )
            .await
            .unwrap();

        let fetched = store.get_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.action_taken, ActionTaken::Rejected);
        assert_eq!(fetched.outcome, ExecutionOutcome::Escalated);
    }

    #[tokio::test]
    async fn test_list_pending_only_returns_open_suggestions() {
        let store = InMemoryPatternStore::new();
        let open = ExecutionRecord::new(
            "pat-1",
            "conv-1",
            0.7,
            ActionTaken::Suggested,
            None,
            Utc::now(),
        );
        let auto = ExecutionRecord::new(
            "pat-2",
            "conv-2",
            0.9,
            ActionTaken::AutoSent,
            Some("hi".to_string()),
            Utc::now(),
        );
        store.append_execution(&open).await.unwrap();
        store.append_execution(&auto).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, open.id);
    }
}
