//! Learning feedback loop.
//!
//! Operator accept/modify/reject actions close the loop on executions:
//! they finalize the audit record, nudge pattern confidence (always as a
//! clamped delta at the storage layer), retire patterns that keep getting
//! rejected, and revise templates the operators keep correcting the same
//! way. A periodic decay sweep, driven by the caller's scheduler outside
//! the request path, erodes confidence of patterns with no recent
//! executions so stale patterns cannot keep auto-firing unvalidated.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::config::LearningConfig;
use crate::domain::{ActionTaken, ExecutionOutcome, Pattern};
use crate::error::{EngineError, EngineResult};
use crate::signature::{self, Signature};
use crate::store::{ExecutionStore, PatternDatabase, PatternStore};

/// Modified texts this similar count toward the same revision streak.
const MODIFICATION_SIMILARITY: f32 = 0.6;

/// What the operator did with a suggestion or auto-sent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorAction {
    /// Sent (or endorsed) the response as proposed.
    Accept,
    /// Edited the response before sending.
    Modify {
        /// The text actually sent.
        final_text: String,
    },
    /// Discarded the suggestion.
    Reject,
}

/// Records operator feedback and maintains pattern confidence.
pub struct LearningLoop {
    db: PatternDatabase,
    config: LearningConfig,
    /// Consecutive similar-modification streaks per pattern id.
    modification_streaks: Mutex<HashMap<String, (Signature, u32)>>,
}

impl std::fmt::Debug for LearningLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningLoop")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LearningLoop {
    /// Create a learning loop over the store.
    #[must_use]
    pub fn new(db: PatternDatabase, config: LearningConfig) -> Self {
        Self {
            db,
            config,
            modification_streaks: Mutex::new(HashMap::new()),
        }
    }

    /// Record an operator decision for an execution.
    ///
    /// Finalizing is single-shot: feedback for an already-terminal record
    /// is ignored with a warning, so double-clicks in the operator UI
    /// cannot double-count.
    pub async fn record_outcome(
        &self,
        execution_id: &str,
        action: OperatorAction,
    ) -> EngineResult<()> {
        let record = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::UnknownExecution {
                id: execution_id.to_string(),
            })?;

        if record.is_terminal() {
            tracing::warn!(
                execution_id,
                "Feedback for an already-finalized execution ignored"
            );
            return Ok(());
        }

        match action {
            OperatorAction::Accept => {
                // For a suggestion the accepted text is the pattern's
                // current template; auto-sent records already carry it.
                let sent = match record.action_taken {
                    ActionTaken::Suggested => self
                        .db
                        .get(&record.pattern_id)
                        .await?
                        .map(|p| p.response_template),
                    _ => None,
                };
                self.db
                    .finalize_execution(
                        execution_id,
                        record.action_taken,
                        sent.as_deref(),
                        None,
                        ExecutionOutcome::Resolved,
                    )
                    .await?;
                self.db.record_success(&record.pattern_id).await?;
                let confidence = self
                    .db
                    .update_confidence(&record.pattern_id, self.config.accept_step)
                    .await?;
                self.clear_streak(&record.pattern_id);
                tracing::debug!(
                    pattern_id = %record.pattern_id,
                    confidence,
                    "Suggestion accepted"
                );
            }
            OperatorAction::Modify { final_text } => {
                self.db
                    .finalize_execution(
                        execution_id,
                        ActionTaken::Modified,
                        Some(&final_text),
                        Some(&final_text),
                        ExecutionOutcome::Resolved,
                    )
                    .await?;
                // Partial success: smaller nudge than a clean accept.
                let confidence = self
                    .db
                    .update_confidence(&record.pattern_id, self.config.modify_step)
                    .await?;
                tracing::debug!(
                    pattern_id = %record.pattern_id,
                    confidence,
                    "Suggestion modified before sending"
                );
                self.track_modification(&record.pattern_id, &final_text)
                    .await?;
            }
            OperatorAction::Reject => {
                self.db
                    .finalize_execution(
                        execution_id,
                        ActionTaken::Rejected,
                        None,
                        None,
                        ExecutionOutcome::Escalated,
                    )
                    .await?;
                let confidence = self
                    .db
                    .update_confidence(&record.pattern_id, -self.config.reject_step)
                    .await?;
                self.clear_streak(&record.pattern_id);
                if confidence < self.config.retirement_threshold {
                    self.db.set_active(&record.pattern_id, false).await?;
                    tracing::info!(
                        pattern_id = %record.pattern_id,
                        confidence,
                        "Pattern retired after repeated rejection"
                    );
                } else {
                    tracing::debug!(
                        pattern_id = %record.pattern_id,
                        confidence,
                        "Suggestion rejected"
                    );
                }
            }
        }

        Ok(())
    }

    /// Decay confidence of patterns with no executions inside the decay
    /// window. Returns how many patterns were decayed.
    ///
    /// Runs from a scheduled job outside the request path.
    pub async fn decay_idle(&self, now: DateTime<Utc>) -> EngineResult<u32> {
        let cutoff = now - Duration::days(self.config.decay_window_days);
        let mut decayed = 0;
        for pattern in self.db.list_active().await? {
            if pattern.last_seen_at < cutoff {
                let confidence = self
                    .db
                    .update_confidence(&pattern.id, -self.config.decay_step)
                    .await?;
                decayed += 1;
                tracing::debug!(
                    pattern_id = %pattern.id,
                    confidence,
                    "Idle pattern decayed"
                );
            }
        }
        Ok(decayed)
    }

    /// Track consecutive similar modifications; once the streak reaches
    /// the configured length, fold the operators' preferred wording back
    /// into the pattern (after a dedup check against existing patterns).
    async fn track_modification(&self, pattern_id: &str, final_text: &str) -> EngineResult<()> {
        let sig = signature::normalize(final_text);
        let streak = {
            let mut streaks = self.modification_streaks.lock();
            let entry = streaks
                .entry(pattern_id.to_string())
                .or_insert_with(|| (sig.clone(), 0));
            if entry.0.similarity(&sig) >= MODIFICATION_SIMILARITY {
                entry.1 += 1;
            } else {
                *entry = (sig.clone(), 1);
            }
            entry.0 = sig;
            entry.1
        };

        if streak < self.config.variant_after_modifications {
            return Ok(());
        }

        let Some(source) = self.db.get(pattern_id).await? else {
            return Ok(());
        };

        // Dedup check: if another active pattern already answers the same
        // trigger with this wording, reinforce it instead of duplicating.
        if let Some(existing) = self.find_equivalent(&source, final_text).await? {
            self.db
                .update_confidence(&existing.id, self.config.modify_step)
                .await?;
            tracing::info!(
                pattern_id = %existing.id,
                "Repeated operator edits reinforce an existing pattern"
            );
        } else {
            self.db.set_response_template(pattern_id, final_text).await?;
            tracing::info!(
                pattern_id,
                "Response template revised after repeated similar operator edits"
            );
        }
        self.clear_streak(pattern_id);
        Ok(())
    }

    async fn find_equivalent(
        &self,
        source: &Pattern,
        final_text: &str,
    ) -> EngineResult<Option<Pattern>> {
        let trigger_sig = Signature::from_normalized(source.trigger_signature.clone());
        let response_sig = signature::normalize(final_text);
        for candidate in self.db.list_active().await? {
            if candidate.id == source.id {
                continue;
            }
            let same_trigger = trigger_sig
                .similarity(&Signature::from_normalized(candidate.trigger_signature.clone()))
                >= MODIFICATION_SIMILARITY;
            let same_response = response_sig
                .similarity(&signature::normalize(&candidate.response_template))
                >= MODIFICATION_SIMILARITY;
            if same_trigger && same_response {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn clear_streak(&self, pattern_id: &str) {
        self.modification_streaks.lock().remove(pattern_id);
    }
}
