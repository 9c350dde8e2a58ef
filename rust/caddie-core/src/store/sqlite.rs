//! `SQLite` backend for the pattern store.
//!
//! Counter and confidence updates run as single `UPDATE` statements so
//! concurrent conversations never lose increments, and confidence is
//! clamped into [0, 1] inside the statement itself.
//!
//! # Thread Safety
//!
//! Each operation opens its own connection in a blocking thread pool;
//! `SQLite`'s WAL mode plus a busy timeout handles concurrent access.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use crate::domain::{
    ActionTaken, ExecutionOutcome, ExecutionRecord, LearnedFrom, Pattern, PatternType,
};
use crate::error::{EngineError, EngineResult};
use crate::signature::Signature;

use super::{find_merge_target, score_candidates, ExecutionStore, PatternStore, ScoredPattern, UpsertOutcome};

/// SQLite-backed pattern and execution store.
///
/// Supports both in-memory (`:memory:`) and file-based databases.
#[derive(Debug, Clone)]
pub struct SqlitePatternStore {
    /// Path to the database file, or `file::memory:?cache=shared`.
    db_path: PathBuf,
}

impl SqlitePatternStore {
    /// Open a store and migrate its schema.
    pub async fn new<P: Into<PathBuf>>(path: P) -> EngineResult<Self> {
        let mut db_path = path.into();

        // Shared cache mode so every connection sees the same in-memory data
        if db_path.to_str() == Some(":memory:") {
            db_path = PathBuf::from("file::memory:?cache=shared");
        }

        let store = Self { db_path };
        store.migrate_schema().await?;
        Ok(store)
    }

    async fn migrate_schema(&self) -> EngineResult<()> {
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || -> EngineResult<()> {
            let conn = open_connection(&db_path)?;
            conn.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS patterns (
                    id TEXT PRIMARY KEY,
                    trigger_signature TEXT NOT NULL,
                    trigger_text TEXT NOT NULL,
                    response_template TEXT NOT NULL,
                    pattern_type TEXT NOT NULL,
                    embedding BLOB,
                    confidence_score REAL NOT NULL,
                    auto_executable INTEGER NOT NULL DEFAULT 0,
                    execution_count INTEGER NOT NULL DEFAULT 0,
                    success_count INTEGER NOT NULL DEFAULT 0,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    learned_from TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_seen_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_patterns_signature
                    ON patterns(trigger_signature);
                CREATE INDEX IF NOT EXISTS idx_patterns_active
                    ON patterns(is_active);

                CREATE TABLE IF NOT EXISTS executions (
                    id TEXT PRIMARY KEY,
                    pattern_id TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    matched_confidence REAL NOT NULL,
                    action_taken TEXT NOT NULL,
                    response_sent TEXT,
                    operator_modification TEXT,
                    outcome TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_executions_pattern
                    ON executions(pattern_id);
                CREATE INDEX IF NOT EXISTS idx_executions_pending
                    ON executions(action_taken, outcome);
                ",
            )?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn load_patterns(&self, active_only: bool) -> EngineResult<Vec<Pattern>> {
        let db_path = self.db_path.clone();

        let patterns = task::spawn_blocking(move || -> EngineResult<Vec<Pattern>> {
            let conn = open_connection(&db_path)?;
            let sql = if active_only {
                "SELECT * FROM patterns WHERE is_active = 1"
            } else {
                "SELECT * FROM patterns"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], pattern_from_row)?;
            let mut patterns = Vec::new();
            for row in rows {
                patterns.push(row?);
            }
            Ok(patterns)
        })
        .await??;

        Ok(patterns)
    }
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn insert(&self, pattern: &Pattern) -> EngineResult<String> {
        let db_path = self.db_path.clone();
        let pattern = pattern.clone();

        let id = task::spawn_blocking(move || -> EngineResult<String> {
            let conn = open_connection(&db_path)?;
            insert_pattern(&conn, &pattern)?;
            Ok(pattern.id)
        })
        .await??;

        Ok(id)
    }

    async fn get(&self, id: &str) -> EngineResult<Option<Pattern>> {
        let db_path = self.db_path.clone();
        let id = id.to_string();

        let pattern = task::spawn_blocking(move || -> EngineResult<Option<Pattern>> {
            let conn = open_connection(&db_path)?;
            let pattern = conn
                .query_row(
                    "SELECT * FROM patterns WHERE id = ?1",
                    params![&id],
                    pattern_from_row,
                )
                .optional()?;
            Ok(pattern)
        })
        .await??;

        Ok(pattern)
    }

    async fn find_candidates(
        &self,
        signature: &Signature,
        vector: Option<&[f32]>,
        top_k: usize,
    ) -> EngineResult<Vec<ScoredPattern>> {
        let active = self.load_patterns(true).await?;
        Ok(score_candidates(active, signature, vector, top_k))
    }

    async fn upsert_merging(
        &self,
        pattern: Pattern,
        dedup_threshold: f32,
        reinforcement: f32,
    ) -> EngineResult<UpsertOutcome> {
        let db_path = self.db_path.clone();

        let outcome = task::spawn_blocking(move || -> EngineResult<UpsertOutcome> {
            let conn = open_connection(&db_path)?;
            conn.execute("BEGIN IMMEDIATE", [])?;

            let result = (|| -> EngineResult<UpsertOutcome> {
                let mut stmt = conn.prepare("SELECT * FROM patterns")?;
                let rows = stmt.query_map([], pattern_from_row)?;
                let mut existing = Vec::new();
                for row in rows {
                    existing.push(row?);
                }
                drop(stmt);

                if let Some(target_id) = find_merge_target(&existing, &pattern, dedup_threshold) {
                    conn.execute(
                        r"
                        UPDATE patterns SET
                            confidence_score = MIN(1.0, MAX(0.0, confidence_score + ?2)),
                            last_seen_at = ?3,
                            embedding = COALESCE(embedding, ?4)
                        WHERE id = ?1
                        ",
                        params![
                            &target_id,
                            f64::from(reinforcement),
                            pattern.last_seen_at.to_rfc3339(),
                            pattern.embedding.as_deref().map(vector_to_blob),
                        ],
                    )?;
                    Ok(UpsertOutcome::Merged(target_id))
                } else {
                    insert_pattern(&conn, &pattern)?;
                    Ok(UpsertOutcome::Created(pattern.id.clone()))
                }
            })();

            match result {
                Ok(outcome) => {
                    conn.execute("COMMIT", [])?;
                    Ok(outcome)
                }
                Err(e) => {
                    conn.execute("ROLLBACK", []).ok();
                    Err(e)
                }
            }
        })
        .await??;

        Ok(outcome)
    }

    async fn record_execution(&self, pattern_id: &str, success: bool) -> EngineResult<()> {
        let db_path = self.db_path.clone();
        let pattern_id = pattern_id.to_string();
        let now = Utc::now().to_rfc3339();

        task::spawn_blocking(move || -> EngineResult<()> {
            let conn = open_connection(&db_path)?;
            let updated = conn.execute(
                r"
                UPDATE patterns SET
                    execution_count = execution_count + 1,
                    success_count = success_count + (CASE WHEN ?2 THEN 1 ELSE 0 END),
                    last_seen_at = ?3
                WHERE id = ?1
                ",
                params![&pattern_id, success, &now],
            )?;
            if updated == 0 {
                return Err(EngineError::UnknownPattern { id: pattern_id });
            }
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn record_success(&self, pattern_id: &str) -> EngineResult<()> {
        let db_path = self.db_path.clone();
        let pattern_id = pattern_id.to_string();

        task::spawn_blocking(move || -> EngineResult<()> {
            let conn = open_connection(&db_path)?;
            let updated = conn.execute(
                "UPDATE patterns SET success_count = success_count + 1 WHERE id = ?1",
                params![&pattern_id],
            )?;
            if updated == 0 {
                return Err(EngineError::UnknownPattern { id: pattern_id });
            }
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn update_confidence(&self, pattern_id: &str, delta: f32) -> EngineResult<f32> {
        let db_path = self.db_path.clone();
        let pattern_id = pattern_id.to_string();

        let confidence = task::spawn_blocking(move || -> EngineResult<f32> {
            let conn = open_connection(&db_path)?;
            let updated = conn.execute(
                r"
                UPDATE patterns SET
                    confidence_score = MIN(1.0, MAX(0.0, confidence_score + ?2))
                WHERE id = ?1
                ",
                params![&pattern_id, f64::from(delta)],
            )?;
            if updated == 0 {
                return Err(EngineError::UnknownPattern { id: pattern_id });
            }
            let confidence: f32 = conn.query_row(
                "SELECT confidence_score FROM patterns WHERE id = ?1",
                params![&pattern_id],
                |row| row.get(0),
            )?;
            Ok(confidence)
        })
        .await??;

        Ok(confidence)
    }

    async fn set_active(&self, pattern_id: &str, active: bool) -> EngineResult<()> {
        let db_path = self.db_path.clone();
        let pattern_id = pattern_id.to_string();

        task::spawn_blocking(move || -> EngineResult<()> {
            let conn = open_connection(&db_path)?;
            let updated = conn.execute(
                "UPDATE patterns SET is_active = ?2 WHERE id = ?1",
                params![&pattern_id, active],
            )?;
            if updated == 0 {
                return Err(EngineError::UnknownPattern { id: pattern_id });
            }
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn set_response_template(&self, pattern_id: &str, template: &str) -> EngineResult<()> {
        let db_path = self.db_path.clone();
        let pattern_id = pattern_id.to_string();
        let template = template.to_string();

        task::spawn_blocking(move || -> EngineResult<()> {
            let conn = open_connection(&db_path)?;
            let updated = conn.execute(
                "UPDATE patterns SET response_template = ?2 WHERE id = ?1",
                params![&pattern_id, &template],
            )?;
            if updated == 0 {
                return Err(EngineError::UnknownPattern { id: pattern_id });
            }
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn list_active(&self) -> EngineResult<Vec<Pattern>> {
        self.load_patterns(true).await
    }
}

#[async_trait]
impl ExecutionStore for SqlitePatternStore {
    async fn append_execution(&self, record: &ExecutionRecord) -> EngineResult<String> {
        let db_path = self.db_path.clone();
        let record = record.clone();

        let id = task::spawn_blocking(move || -> EngineResult<String> {
            let conn = open_connection(&db_path)?;
            conn.execute(
                r"
                INSERT INTO executions (
                    id, pattern_id, conversation_id, matched_confidence,
                    action_taken, response_sent, operator_modification,
                    outcome, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
                params![
                    &record.id,
                    &record.pattern_id,
                    &record.conversation_id,
                    f64::from(record.matched_confidence),
                    record.action_taken.as_str(),
                    &record.response_sent,
                    &record.operator_modification,
                    record.outcome.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(record.id)
        })
        .await??;

        Ok(id)
    }

    async fn get_execution(&self, id: &str) -> EngineResult<Option<ExecutionRecord>> {
        let db_path = self.db_path.clone();
        let id = id.to_string();

        let record = task::spawn_blocking(move || -> EngineResult<Option<ExecutionRecord>> {
            let conn = open_connection(&db_path)?;
            let record = conn
                .query_row(
                    "SELECT * FROM executions WHERE id = ?1",
                    params![&id],
                    execution_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await??;

        Ok(record)
    }

    async fn finalize_execution(
        &self,
        id: &str,
        action: ActionTaken,
        response_sent: Option<&str>,
        modification: Option<&str>,
        outcome: ExecutionOutcome,
    ) -> EngineResult<()> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        let response_sent = response_sent.map(ToString::to_string);
        let modification = modification.map(ToString::to_string);

        task::spawn_blocking(move || -> EngineResult<()> {
            let conn = open_connection(&db_path)?;
            conn.execute("BEGIN IMMEDIATE", [])?;

            let result = (|| -> EngineResult<()> {
                let current = conn
                    .query_row(
                        "SELECT * FROM executions WHERE id = ?1",
                        params![&id],
                        execution_from_row,
                    )
                    .optional()?
                    .ok_or_else(|| EngineError::UnknownExecution { id: id.clone() })?;

                if current.is_terminal() {
                    tracing::warn!(
                        execution_id = %id,
                        "Ignoring update to already-finalized execution"
                    );
                    return Ok(());
                }

                conn.execute(
                    r"
                    UPDATE executions SET
                        action_taken = ?2,
                        response_sent = COALESCE(?3, response_sent),
                        operator_modification = ?4,
                        outcome = ?5
                    WHERE id = ?1
                    ",
                    params![
                        &id,
                        action.as_str(),
                        &response_sent,
                        &modification,
                        outcome.as_str(),
                    ],
                )?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    conn.execute("COMMIT", [])?;
                    Ok(())
                }
                Err(e) => {
                    conn.execute("ROLLBACK", []).ok();
                    Err(e)
                }
            }
        })
        .await??;

        Ok(())
    }

    async fn list_pending(&self) -> EngineResult<Vec<ExecutionRecord>> {
        let db_path = self.db_path.clone();

        let records = task::spawn_blocking(move || -> EngineResult<Vec<ExecutionRecord>> {
            let conn = open_connection(&db_path)?;
            let mut stmt = conn.prepare(
                r"
                SELECT * FROM executions
                WHERE action_taken = 'suggested' AND outcome = 'unknown'
                ORDER BY created_at ASC
                ",
            )?;
            let rows = stmt.query_map([], execution_from_row)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await??;

        Ok(records)
    }
}

fn open_connection(db_path: &PathBuf) -> EngineResult<Connection> {
    let conn = Connection::open(db_path)?;
    // WAL must be set per connection for shared in-memory databases
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn insert_pattern(conn: &Connection, pattern: &Pattern) -> rusqlite::Result<()> {
    conn.execute(
        r"
        INSERT INTO patterns (
            id, trigger_signature, trigger_text, response_template,
            pattern_type, embedding, confidence_score, auto_executable,
            execution_count, success_count, is_active, learned_from,
            created_at, last_seen_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ",
        params![
            &pattern.id,
            &pattern.trigger_signature,
            &pattern.trigger_text,
            &pattern.response_template,
            pattern.pattern_type.as_str(),
            pattern.embedding.as_deref().map(vector_to_blob),
            f64::from(pattern.confidence_score),
            pattern.auto_executable,
            pattern.execution_count,
            pattern.success_count,
            pattern.is_active,
            pattern.learned_from.as_str(),
            pattern.created_at.to_rfc3339(),
            pattern.last_seen_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn pattern_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pattern> {
    let pattern_type_tag: String = row.get("pattern_type")?;
    let learned_from_tag: String = row.get("learned_from")?;
    let embedding: Option<Vec<u8>> = row.get("embedding")?;

    Ok(Pattern {
        id: row.get("id")?,
        trigger_signature: row.get("trigger_signature")?,
        trigger_text: row.get("trigger_text")?,
        response_template: row.get("response_template")?,
        pattern_type: PatternType::parse(&pattern_type_tag)
            .ok_or_else(|| conversion_error("pattern_type", &pattern_type_tag))?,
        embedding: embedding.map(|blob| blob_to_vector(&blob)),
        confidence_score: row.get("confidence_score")?,
        auto_executable: row.get("auto_executable")?,
        execution_count: row.get("execution_count")?,
        success_count: row.get("success_count")?,
        is_active: row.get("is_active")?,
        learned_from: LearnedFrom::parse(&learned_from_tag)
            .ok_or_else(|| conversion_error("learned_from", &learned_from_tag))?,
        created_at: timestamp_from_column(row, "created_at")?,
        last_seen_at: timestamp_from_column(row, "last_seen_at")?,
    })
}

fn execution_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let action_tag: String = row.get("action_taken")?;
    let outcome_tag: String = row.get("outcome")?;

    Ok(ExecutionRecord {
        id: row.get("id")?,
        pattern_id: row.get("pattern_id")?,
        conversation_id: row.get("conversation_id")?,
        matched_confidence: row.get("matched_confidence")?,
        action_taken: ActionTaken::parse(&action_tag)
            .ok_or_else(|| conversion_error("action_taken", &action_tag))?,
        response_sent: row.get("response_sent")?,
        operator_modification: row.get("operator_modification")?,
        outcome: ExecutionOutcome::parse(&outcome_tag)
            .ok_or_else(|| conversion_error("outcome", &outcome_tag))?,
        created_at: timestamp_from_column(row, "created_at")?,
    })
}

fn timestamp_from_column(
    row: &rusqlite::Row<'_>,
    column: &str,
) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn conversion_error(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unrecognized {column} tag '{value}'").into(),
    )
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LearnedFrom, PatternType};
    use tempfile::NamedTempFile;

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

    async fn create_test_store() -> (SqlitePatternStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = SqlitePatternStore::new(temp_file.path()).await.unwrap();
        (store, temp_file)
    }

    #[tokio::test]
    async fn test_insert_round_trips_all_fields() {
        let (store, _temp) = create_test_store().await;
        let pattern = sample_pattern("what are your hours", "9-9")
            .with_embedding(vec![0.25, -0.5, 1.0])
            .with_auto_executable(true);
        store.insert(&pattern).await.unwrap();

        let fetched = store.get(&pattern.id).await.unwrap().unwrap();
        assert_eq!(fetched.trigger_signature, pattern.trigger_signature);
        assert_eq!(fetched.embedding, Some(vec![0.25, -0.5, 1.0]));
        assert!(fetched.auto_executable);
        assert_eq!(fetched.learned_from, LearnedFrom::Manual);
    }

    #[tokio::test]
    async fn test_get_missing_pattern_is_none() {
        let (store, _temp) = create_test_store().await;
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confidence_clamped_in_sql() {
        let (store, _temp) = create_test_store().await;
        let pattern = sample_pattern("hi", "hello");
        store.insert(&pattern).await.unwrap();

        let up = store.update_confidence(&pattern.id, 2.0).await.unwrap();
        assert!((up - 1.0).abs() < 1e-6);
        let down = store.update_confidence(&pattern.id, -3.0).await.unwrap();
        assert!((down - 0.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_concurrent_record_execution_loses_no_updates() {
        let (store, _temp) = create_test_store().await;
        let pattern = sample_pattern("hi", "hello");
        store.insert(&pattern).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            let id = pattern.id.clone();
            handles.push(tokio::spawn(async move {
                store.record_execution(&id, false).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fetched = store.get(&pattern.id).await.unwrap().unwrap();
        assert_eq!(fetched.execution_count, 20);
    }

    #[tokio::test]
    async fn test_upsert_merge_backfills_embedding() {
        let (store, _temp) = create_test_store().await;
        let original = sample_pattern("what are your hours", "9-9");
        store.insert(&original).await.unwrap();

        let duplicate =
            sample_pattern("what are your hours?", "9 to 9").with_embedding(vec![1.0, 2.0]);
        let outcome = store.upsert_merging(duplicate, 0.9, 0.02).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Merged(original.id.clone()));

        let merged = store.get(&original.id).await.unwrap().unwrap();
        assert_eq!(merged.embedding, Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn test_find_candidates_keyword_path() {
        let (store, _temp) = create_test_store().await;
        store
            .insert(&sample_pattern("what are your hours", "9-9"))
            .await
            .unwrap();
        store
            .insert(&sample_pattern("my simulator is frozen", "restart it"))
            .await
            .unwrap();

        let sig = crate::signature::normalize("what are your hours today?");
        let found = store.find_candidates(&sig, None, 5).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].pattern.trigger_text, "what are your hours");
        assert!(found[0].similarity > found[1].similarity);
    }

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let (store, _temp) = create_test_store().await;
        let record = ExecutionRecord::new(
            "pat-1",
            "conv-1",
            0.7,
            ActionTaken::Suggested,
            None,
            Utc::now(),
        );
        store.append_execution(&record).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);

        store
            .finalize_execution(
                &record.id,
                ActionTaken::Modified,
                Some("edited"),
                Some("edited"),
                ExecutionOutcome::Resolved,
            )
            .await
            .unwrap();

        let finalized = store.get_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(finalized.action_taken, ActionTaken::Modified);
        assert_eq!(finalized.response_sent.as_deref(), Some("edited"));
        assert!(store.list_pending().await.unwrap().is_empty());

        // Terminal records never change again.
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
        let unchanged = store.get_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(unchanged.action_taken, ActionTaken::Modified);
    }

    #[tokio::test]
    async fn test_retired_patterns_are_invisible_to_candidates() {
        let (store, _temp) = create_test_store().await;
        let pattern = sample_pattern("what are your hours", "9-9");
        store.insert(&pattern).await.unwrap();
        store.set_active(&pattern.id, false).await.unwrap();

        let sig = crate::signature::normalize("what are your hours");
        assert!(store.find_candidates(&sig, None, 5).await.unwrap().is_empty());
    }
}
