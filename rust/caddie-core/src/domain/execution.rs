//! Execution records: one attempt to apply a pattern to a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One attempt to apply a pattern to a live conversation.
///
/// Created at match time with [`ActionTaken::Suggested`] or
/// [`ActionTaken::AutoSent`], updated once to a terminal state when an
/// operator acts, and immutable thereafter (append-only audit trail).
///
/// References patterns by id only; deactivating or deleting a pattern
/// never cascades into its execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique record identifier.
    pub id: String,
    /// The applied pattern (weak reference).
    pub pattern_id: String,
    /// Conversation the pattern was applied to.
    pub conversation_id: String,
    /// Combined score at match time.
    pub matched_confidence: f32,
    /// What the engine did with the match.
    pub action_taken: ActionTaken,
    /// Actual text delivered, if any (may differ from the template after
    /// operator modification).
    pub response_sent: Option<String>,
    /// Edited text if a human changed the suggested response.
    pub operator_modification: Option<String>,
    /// Final disposition, set asynchronously.
    pub outcome: ExecutionOutcome,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Create a record for a match, in its initial (non-terminal) state.
    pub fn new(
        pattern_id: impl Into<String>,
        conversation_id: impl Into<String>,
        matched_confidence: f32,
        action_taken: ActionTaken,
        response_sent: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pattern_id: pattern_id.into(),
            conversation_id: conversation_id.into(),
            matched_confidence,
            action_taken,
            response_sent,
            operator_modification: None,
            outcome: ExecutionOutcome::Unknown,
            created_at: now,
        }
    }

    /// Whether an operator action or timeout has already finalized this
    /// record.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.outcome != ExecutionOutcome::Unknown
            || matches!(self.action_taken, ActionTaken::Rejected | ActionTaken::Modified)
    }
}

/// What the engine did when a pattern matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    /// Response delivered without operator review.
    AutoSent,
    /// Response queued for operator confirmation.
    Suggested,
    /// Operator rejected the suggestion.
    Rejected,
    /// Operator edited the suggestion before sending.
    Modified,
}

impl ActionTaken {
    /// Stable string tag used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoSent => "auto_sent",
            Self::Suggested => "suggested",
            Self::Rejected => "rejected",
            Self::Modified => "modified",
        }
    }

    /// Parse a storage tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "auto_sent" => Some(Self::AutoSent),
            "suggested" => Some(Self::Suggested),
            "rejected" => Some(Self::Rejected),
            "modified" => Some(Self::Modified),
            _ => None,
        }
    }
}

/// Final disposition of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// No terminal action yet.
    Unknown,
    /// The customer's request was handled.
    Resolved,
    /// Handed off to a human operator.
    Escalated,
}

impl ExecutionOutcome {
    /// Stable string tag used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    /// Parse a storage tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "unknown" => Some(Self::Unknown),
            "resolved" => Some(Self::Resolved),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_not_terminal() {
        let rec = ExecutionRecord::new(
            "pat-1",
            "conv-1",
            0.8,
            ActionTaken::Suggested,
            None,
            Utc::now(),
        );
        assert!(!rec.is_terminal());
        assert_eq!(rec.outcome, ExecutionOutcome::Unknown);
    }

    #[test]
    fn test_resolved_record_is_terminal() {
        let mut rec = ExecutionRecord::new(
            "pat-1",
            "conv-1",
            0.8,
            ActionTaken::AutoSent,
            Some("hi".to_string()),
            Utc::now(),
        );
        rec.outcome = ExecutionOutcome::Resolved;
        assert!(rec.is_terminal());
    }
}
