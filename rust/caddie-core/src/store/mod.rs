//! Pattern and execution storage.
//!
//! Provides trait-based abstractions for data access that work across
//! storage backends, dispatched through [`PatternDatabase`]. The SQLite
//! backend is the production store; the in-memory store backs tests.
//!
//! Counter updates (`record_execution`, `update_confidence`) are applied
//! as atomic delta operations at the storage layer, never read-modify-write
//! from application code, so concurrent conversations cannot lose updates.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryPatternStore;
pub use sqlite::SqlitePatternStore;

use async_trait::async_trait;

use crate::domain::{ActionTaken, ExecutionOutcome, ExecutionRecord, Pattern};
use crate::error::EngineResult;
use crate::signature::Signature;

/// A candidate pattern with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredPattern {
    /// The candidate.
    pub pattern: Pattern,
    /// Similarity in [0, 1]: cosine over embeddings on the semantic path,
    /// trigram Jaccard over signatures on the keyword path.
    pub similarity: f32,
}

/// Result of a deduplicating upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No near-duplicate existed; a new pattern was inserted.
    Created(String),
    /// A near-duplicate existed and was reinforced instead.
    Merged(String),
}

impl UpsertOutcome {
    /// The id of the created or merged pattern.
    #[must_use]
    pub fn pattern_id(&self) -> &str {
        match self {
            Self::Created(id) | Self::Merged(id) => id,
        }
    }
}

/// Repository trait for pattern operations.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Insert a pattern without deduplication.
    async fn insert(&self, pattern: &Pattern) -> EngineResult<String>;

    /// Get a pattern by id.
    async fn get(&self, id: &str) -> EngineResult<Option<Pattern>>;

    /// Rank active patterns against a query.
    ///
    /// With a vector, ranks by cosine similarity over embeddings; patterns
    /// without an embedding are excluded from that path (exact signature
    /// equality still surfaces them). Without a vector, ranks by trigram
    /// similarity between `signature` and `trigger_signature`.
    async fn find_candidates(
        &self,
        signature: &Signature,
        vector: Option<&[f32]>,
        top_k: usize,
    ) -> EngineResult<Vec<ScoredPattern>>;

    /// Insert a pattern, or merge it into an existing near-duplicate.
    ///
    /// Near-duplicate conflicts resolve automatically into the existing
    /// (battle-tested) pattern: its confidence is reinforced, its
    /// last-seen timestamp advances, and a missing embedding is filled
    /// from the incoming pattern. Never surfaced as an error.
    async fn upsert_merging(
        &self,
        pattern: Pattern,
        dedup_threshold: f32,
        reinforcement: f32,
    ) -> EngineResult<UpsertOutcome>;

    /// Atomically increment `execution_count` (always) and `success_count`
    /// (when `success`), and advance `last_seen_at`.
    async fn record_execution(&self, pattern_id: &str, success: bool) -> EngineResult<()>;

    /// Atomically increment `success_count` alone (operator confirmation
    /// arriving after the execution was recorded).
    async fn record_success(&self, pattern_id: &str) -> EngineResult<()>;

    /// Apply a confidence delta, clamped into [0, 1] at the storage layer.
    /// Returns the new value.
    async fn update_confidence(&self, pattern_id: &str, delta: f32) -> EngineResult<f32>;

    /// Enable or disable a pattern (soft retirement, not deletion).
    async fn set_active(&self, pattern_id: &str, active: bool) -> EngineResult<()>;

    /// Replace a pattern's response template (operator-driven revision).
    async fn set_response_template(&self, pattern_id: &str, template: &str) -> EngineResult<()>;

    /// All active patterns (decay sweeps, dashboards).
    async fn list_active(&self) -> EngineResult<Vec<Pattern>>;
}

/// Repository trait for the execution audit trail.
///
/// Records reference patterns by id only; deactivating a pattern never
/// touches its execution history.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Append a new execution record.
    async fn append_execution(&self, record: &ExecutionRecord) -> EngineResult<String>;

    /// Get an execution record by id.
    async fn get_execution(&self, id: &str) -> EngineResult<Option<ExecutionRecord>>;

    /// Apply the single terminal update to a record. A record that is
    /// already terminal is left untouched.
    async fn finalize_execution(
        &self,
        id: &str,
        action: ActionTaken,
        response_sent: Option<&str>,
        modification: Option<&str>,
        outcome: ExecutionOutcome,
    ) -> EngineResult<()>;

    /// Suggestions still waiting for an operator decision.
    async fn list_pending(&self) -> EngineResult<Vec<ExecutionRecord>>;
}

/// Storage backend dispatch.
#[derive(Clone)]
pub enum PatternDatabase {
    /// SQLite-backed store.
    Sqlite(SqlitePatternStore),
    /// In-memory store for testing.
    InMemory(InMemoryPatternStore),
}

impl std::fmt::Debug for PatternDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(_) => write!(f, "PatternDatabase::Sqlite"),
            Self::InMemory(_) => write!(f, "PatternDatabase::InMemory"),
        }
    }
}

impl PatternDatabase {
    /// Open (and migrate) a SQLite-backed database.
    pub async fn sqlite<P: Into<std::path::PathBuf>>(path: P) -> EngineResult<Self> {
        Ok(Self::Sqlite(SqlitePatternStore::new(path).await?))
    }

    /// Create an in-memory database for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::InMemory(InMemoryPatternStore::new())
    }
}

#[async_trait]
impl PatternStore for PatternDatabase {
    async fn insert(&self, pattern: &Pattern) -> EngineResult<String> {
        match self {
            Self::Sqlite(store) => store.insert(pattern).await,
            Self::InMemory(store) => store.insert(pattern).await,
        }
    }

    async fn get(&self, id: &str) -> EngineResult<Option<Pattern>> {
        match self {
            Self::Sqlite(store) => store.get(id).await,
            Self::InMemory(store) => store.get(id).await,
        }
    }

    async fn find_candidates(
        &self,
        signature: &Signature,
        vector: Option<&[f32]>,
        top_k: usize,
    ) -> EngineResult<Vec<ScoredPattern>> {
        match self {
            Self::Sqlite(store) => store.find_candidates(signature, vector, top_k).await,
            Self::InMemory(store) => store.find_candidates(signature, vector, top_k).await,
        }
    }

    async fn upsert_merging(
        &self,
        pattern: Pattern,
        dedup_threshold: f32,
        reinforcement: f32,
    ) -> EngineResult<UpsertOutcome> {
        match self {
            Self::Sqlite(store) => {
                store
                    .upsert_merging(pattern, dedup_threshold, reinforcement)
                    .await
            }
            Self::InMemory(store) => {
                store
                    .upsert_merging(pattern, dedup_threshold, reinforcement)
                    .await
            }
        }
    }

    async fn record_execution(&self, pattern_id: &str, success: bool) -> EngineResult<()> {
        match self {
            Self::Sqlite(store) => store.record_execution(pattern_id, success).await,
            Self::InMemory(store) => store.record_execution(pattern_id, success).await,
        }
    }

    async fn record_success(&self, pattern_id: &str) -> EngineResult<()> {
        match self {
            Self::Sqlite(store) => store.record_success(pattern_id).await,
            Self::InMemory(store) => store.record_success(pattern_id).await,
        }
    }

    async fn update_confidence(&self, pattern_id: &str, delta: f32) -> EngineResult<f32> {
        match self {
            Self::Sqlite(store) => store.update_confidence(pattern_id, delta).await,
            Self::InMemory(store) => store.update_confidence(pattern_id, delta).await,
        }
    }

    async fn set_active(&self, pattern_id: &str, active: bool) -> EngineResult<()> {
        match self {
            Self::Sqlite(store) => store.set_active(pattern_id, active).await,
            Self::InMemory(store) => store.set_active(pattern_id, active).await,
        }
    }

    async fn set_response_template(&self, pattern_id: &str, template: &str) -> EngineResult<()> {
        match self {
            Self::Sqlite(store) => store.set_response_template(pattern_id, template).await,
            Self::InMemory(store) => store.set_response_template(pattern_id, template).await,
        }
    }

    async fn list_active(&self) -> EngineResult<Vec<Pattern>> {
        match self {
            Self::Sqlite(store) => store.list_active().await,
            Self::InMemory(store) => store.list_active().await,
        }
    }
}

#[async_trait]
impl ExecutionStore for PatternDatabase {
    async fn append_execution(&self, record: &ExecutionRecord) -> EngineResult<String> {
        match self {
            Self::Sqlite(store) => store.append_execution(record).await,
            Self::InMemory(store) => store.append_execution(record).await,
        }
    }

    async fn get_execution(&self, id: &str) -> EngineResult<Option<ExecutionRecord>> {
        match self {
            Self::Sqlite(store) => store.get_execution(id).await,
            Self::InMemory(store) => store.get_execution(id).await,
        }
    }

    async fn finalize_execution(
        &self,
        id: &str,
        action: ActionTaken,
        response_sent: Option<&str>,
        modification: Option<&str>,
        outcome: ExecutionOutcome,
    ) -> EngineResult<()> {
        match self {
            Self::Sqlite(store) => {
                store
                    .finalize_execution(id, action, response_sent, modification, outcome)
                    .await
            }
            Self::InMemory(store) => {
                store
                    .finalize_execution(id, action, response_sent, modification, outcome)
                    .await
            }
        }
    }

    async fn list_pending(&self) -> EngineResult<Vec<ExecutionRecord>> {
        match self {
            Self::Sqlite(store) => store.list_pending().await,
            Self::InMemory(store) => store.list_pending().await,
        }
    }
}

/// Shared candidate scoring used by both backends.
///
/// Exact signature equality always surfaces the pattern with full
/// similarity (the fast pre-filter), even when its embedding is missing on
/// the semantic path.
pub(crate) fn score_candidates(
    patterns: Vec<Pattern>,
    signature: &Signature,
    vector: Option<&[f32]>,
    top_k: usize,
) -> Vec<ScoredPattern> {
    let mut scored: Vec<ScoredPattern> = patterns
        .into_iter()
        .filter_map(|pattern| {
            let exact = pattern.trigger_signature == signature.as_str();
            let similarity = match vector {
                Some(query) => match (&pattern.embedding, exact) {
                    (_, true) => 1.0,
                    (Some(embedding), false) => {
                        crate::provider::cosine_similarity(query, embedding).max(0.0)
                    }
                    // Patterns without embeddings are invisible to
                    // semantic search.
                    (None, false) => return None,
                },
                None => {
                    if exact {
                        1.0
                    } else {
                        signature.similarity(&Signature::from_normalized(
                            pattern.trigger_signature.clone(),
                        ))
                    }
                }
            };
            Some(ScoredPattern {
                pattern,
                similarity,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

/// Pick the merge target for an incoming pattern: the most similar active
/// pattern above the dedup threshold, preferring higher confidence and
/// execution counts on ties.
pub(crate) fn find_merge_target(
    existing: &[Pattern],
    incoming: &Pattern,
    dedup_threshold: f32,
) -> Option<String> {
    let incoming_sig = Signature::from_normalized(incoming.trigger_signature.clone());
    existing
        .iter()
        .filter(|p| p.is_active)
        .filter_map(|p| {
            let sim =
                incoming_sig.similarity(&Signature::from_normalized(p.trigger_signature.clone()));
            (sim >= dedup_threshold).then_some((p, sim))
        })
        .max_by(|(a, sa), (b, sb)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.confidence_score
                        .partial_cmp(&b.confidence_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.execution_count.cmp(&b.execution_count))
        })
        .map(|(p, _)| p.id.clone())
}
