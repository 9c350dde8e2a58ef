//! Shadow-mode comparison harness.
//!
//! Runs a candidate engine alongside the primary for the same input and
//! writes the comparison to the `shadow` log target. The candidate's
//! output never reaches a customer: construct it with [`NoopSender`] so
//! even an auto-execute decision delivers nothing. This stays an outer
//! decorator; the matcher and policy know nothing about shadow mode.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::{EngineReply, MessageSender, SupportEngine};
use crate::error::EngineResult;

/// Sender that drops everything; used for candidate engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSender;

#[async_trait]
impl MessageSender for NoopSender {
    async fn send_message(&self, _conversation_id: &str, _text: &str) -> EngineResult<()> {
        Ok(())
    }
}

/// Dual-execution harness: the primary acts, the candidate is observed.
pub struct ShadowHarness {
    primary: Arc<SupportEngine>,
    candidate: Arc<SupportEngine>,
}

impl std::fmt::Debug for ShadowHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowHarness").finish_non_exhaustive()
    }
}

impl ShadowHarness {
    /// Pair a live engine with a shadow candidate.
    ///
    /// The candidate must have been built with [`NoopSender`] (or another
    /// sender with no external effect); the harness cannot verify that.
    #[must_use]
    pub fn new(primary: Arc<SupportEngine>, candidate: Arc<SupportEngine>) -> Self {
        Self { primary, candidate }
    }

    /// Process a message on the live engine, mirror it to the candidate,
    /// and log any divergence. The live reply is returned unchanged; a
    /// candidate failure is logged and otherwise ignored.
    pub async fn process_message(
        &self,
        conversation_id: &str,
        channel_id: &str,
        message: &str,
        arrival_ts: DateTime<Utc>,
    ) -> EngineResult<EngineReply> {
        let live = self
            .primary
            .process_message(conversation_id, channel_id, message, arrival_ts)
            .await?;

        match self
            .candidate
            .process_message(conversation_id, channel_id, message, arrival_ts)
            .await
        {
            Ok(shadow) => {
                if shadow.action == live.action && shadow.pattern_id == live.pattern_id {
                    tracing::debug!(
                        target: "shadow",
                        conversation_id,
                        action = ?live.action,
                        "Shadow agrees"
                    );
                } else {
                    tracing::info!(
                        target: "shadow",
                        conversation_id,
                        live_action = ?live.action,
                        shadow_action = ?shadow.action,
                        live_pattern = ?live.pattern_id,
                        shadow_pattern = ?shadow.pattern_id,
                        "Shadow diverged"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "shadow",
                    conversation_id,
                    error = %e,
                    "Shadow engine failed"
                );
            }
        }

        Ok(live)
    }
}
