//! Learned request/response patterns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signature;

/// A learned request/response rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique pattern identifier.
    pub id: String,
    /// Canonical normalized form of the trigger text, used for fast
    /// pre-filtering and deduplication.
    pub trigger_signature: String,
    /// Original representative trigger phrase (human-readable).
    pub trigger_text: String,
    /// Response text; may contain named placeholders (e.g. `{{bay_number}}`)
    /// filled at response time from conversation context.
    pub response_template: String,
    /// Category tag used for routing and reporting, not for matching.
    pub pattern_type: PatternType,
    /// Embedding vector for `trigger_text`; `None` until generated.
    ///
    /// A pattern without an embedding is invisible to semantic search and
    /// only reachable through the keyword fallback.
    pub embedding: Option<Vec<f32>>,
    /// Learned reliability estimate in [0, 1].
    pub confidence_score: f32,
    /// Whether this pattern may fire without operator confirmation.
    pub auto_executable: bool,
    /// Times this pattern was applied to a live conversation.
    pub execution_count: u32,
    /// Times the applied response was confirmed by an operator.
    pub success_count: u32,
    /// Soft-delete / disable flag.
    pub is_active: bool,
    /// Provenance tag.
    pub learned_from: LearnedFrom,
    /// When the pattern was created.
    pub created_at: DateTime<Utc>,
    /// When the pattern last matched or merged.
    pub last_seen_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a new pattern from a trigger phrase and response template.
    ///
    /// The trigger signature is derived from the trigger text; the
    /// embedding starts empty and must be generated before the pattern is
    /// considered fully searchable.
    pub fn new(
        trigger_text: impl Into<String>,
        response_template: impl Into<String>,
        pattern_type: PatternType,
        initial_confidence: f32,
        learned_from: LearnedFrom,
        now: DateTime<Utc>,
    ) -> Self {
        let trigger_text = trigger_text.into();
        Self {
            id: Uuid::new_v4().to_string(),
            trigger_signature: signature::normalize(&trigger_text).as_str().to_string(),
            trigger_text,
            response_template: response_template.into(),
            pattern_type,
            embedding: None,
            confidence_score: initial_confidence.clamp(0.0, 1.0),
            auto_executable: false,
            execution_count: 0,
            success_count: 0,
            is_active: true,
            learned_from,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Attach an embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Mark the pattern as eligible for unattended execution.
    #[must_use]
    pub fn with_auto_executable(mut self, auto: bool) -> Self {
        self.auto_executable = auto;
        self
    }

    /// Whether the pattern is reachable through semantic search.
    #[must_use]
    pub fn is_semantic(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Pattern category, used for routing and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Booking, availability, and scheduling questions.
    Booking,
    /// Simulator or hardware problems.
    Tech,
    /// Frequently-asked informational questions.
    Faq,
    /// Opening hours.
    Hours,
    /// Facility entry and door access.
    Access,
    /// Anything else.
    General,
}

impl PatternType {
    /// Stable string tag used in storage and configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Tech => "tech",
            Self::Faq => "faq",
            Self::Hours => "hours",
            Self::Access => "access",
            Self::General => "general",
        }
    }

    /// Parse a storage/config tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "booking" => Some(Self::Booking),
            "tech" => Some(Self::Tech),
            "faq" => Some(Self::Faq),
            "hours" => Some(Self::Hours),
            "access" => Some(Self::Access),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// All known pattern types.
    #[must_use]
    pub fn all() -> &'static [PatternType] {
        &[
            Self::Booking,
            Self::Tech,
            Self::Faq,
            Self::Hours,
            Self::Access,
            Self::General,
        ]
    }
}

/// Where a pattern was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnedFrom {
    /// Seeded by a bulk import batch.
    CsvBatchImport,
    /// Learned from a live conversation.
    Conversation,
    /// Entered by hand.
    Manual,
}

impl LearnedFrom {
    /// Stable string tag used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CsvBatchImport => "csv_batch_import",
            Self::Conversation => "conversation",
            Self::Manual => "manual",
        }
    }

    /// Parse a storage tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "csv_batch_import" => Some(Self::CsvBatchImport),
            "conversation" => Some(Self::Conversation),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}
