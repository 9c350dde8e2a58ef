//! Core domain types for the pattern engine.

pub mod execution;
pub mod pattern;

pub use execution::{ActionTaken, ExecutionOutcome, ExecutionRecord};
pub use pattern::{LearnedFrom, Pattern, PatternType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// Inbound customer message.
    Customer,
    /// Outbound operator (or auto-sent) reply.
    Operator,
}

/// One message in a conversation's history.
///
/// Conversation segmentation (the inactivity-gap grouping) happens
/// upstream; the engine trusts the boundaries it is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message author.
    pub speaker: Speaker,
    /// Raw message text.
    pub text: String,
    /// Arrival timestamp.
    pub at: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a customer message.
    pub fn customer(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Customer,
            text: text.into(),
            at,
        }
    }

    /// Create an operator message.
    pub fn operator(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Operator,
            text: text.into(),
            at,
        }
    }
}

/// A matched pattern with the score computed at match time.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    /// The winning pattern.
    pub pattern: Pattern,
    /// Combined score at match time (distinct from the pattern's stored
    /// aggregate confidence).
    pub matched_confidence: f32,
    /// Whether the semantic (embedding) path produced this match, as
    /// opposed to the keyword fallback.
    pub semantic: bool,
}
