//! Execution policy: auto-execute, suggest, or escalate.
//!
//! The policy is a value object built from [`PolicyConfig`] at
//! construction time; it never reads ambient environment state, so
//! decisions are deterministic under test. The pattern-type to action
//! routing table is validated up front: an unrecognized action tag fails
//! configuration load instead of silently no-opping at runtime.

use std::collections::{HashMap, HashSet};

use crate::config::PolicyConfig;
use crate::domain::{Pattern, PatternType};
use crate::error::{EngineError, EngineResult};

/// Closed set of actions a pattern can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Deliver a canned informational reply.
    SendMessage,
    /// Share an FAQ answer.
    ShareFaq,
    /// Send a booking/rebooking link.
    BookingLink,
    /// Unlock a facility door.
    DoorUnlock,
    /// Reboot a simulator bay.
    SimulatorReboot,
    /// Open a ticket for staff.
    EscalateTicket,
}

impl ActionType {
    /// Stable configuration tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::ShareFaq => "share_faq",
            Self::BookingLink => "booking_link",
            Self::DoorUnlock => "door_unlock",
            Self::SimulatorReboot => "simulator_reboot",
            Self::EscalateTicket => "escalate_ticket",
        }
    }

    /// Parse a configuration tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "send_message" => Some(Self::SendMessage),
            "share_faq" => Some(Self::ShareFaq),
            "booking_link" => Some(Self::BookingLink),
            "door_unlock" => Some(Self::DoorUnlock),
            "simulator_reboot" => Some(Self::SimulatorReboot),
            "escalate_ticket" => Some(Self::EscalateTicket),
            _ => None,
        }
    }

    /// Actions with real-world side effects. These always require human
    /// confirmation, whatever the confidence.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DoorUnlock | Self::SimulatorReboot)
    }
}

/// Terminal decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Deliver the response without operator review.
    AutoExecute,
    /// Queue the response for operator confirmation.
    Suggest,
    /// Hand the conversation to a human.
    Escalate,
}

/// Confidence- and action-aware execution policy.
#[derive(Debug)]
pub struct ExecutionPolicy {
    config: PolicyConfig,
    routes: HashMap<PatternType, ActionType>,
    auto_safe: HashSet<ActionType>,
}

impl ExecutionPolicy {
    /// Build a policy, validating the routing table and allow-list.
    ///
    /// Fails fast with [`EngineError::InvalidActionTag`] on any tag that
    /// does not name a known action.
    pub fn new(config: PolicyConfig) -> EngineResult<Self> {
        let mut routes = HashMap::new();
        for pattern_type in PatternType::all() {
            let tag = config
                .action_routes
                .get(pattern_type.as_str())
                .ok_or_else(|| EngineError::Config(format!(
                    "policy.action_routes is missing an entry for pattern type '{}'",
                    pattern_type.as_str()
                )))?;
            let action = ActionType::parse(tag).ok_or_else(|| EngineError::InvalidActionTag {
                tag: tag.clone(),
                pattern_type: pattern_type.as_str().to_string(),
            })?;
            routes.insert(*pattern_type, action);
        }

        let mut auto_safe = HashSet::new();
        for tag in &config.auto_safe_actions {
            let action = ActionType::parse(tag).ok_or_else(|| EngineError::InvalidActionTag {
                tag: tag.clone(),
                pattern_type: "auto_safe_actions".to_string(),
            })?;
            if action.is_destructive() {
                return Err(EngineError::Config(format!(
                    "destructive action '{tag}' cannot be on the auto-safe list"
                )));
            }
            auto_safe.insert(action);
        }

        Ok(Self {
            config,
            routes,
            auto_safe,
        })
    }

    /// The action a matched pattern would drive.
    #[must_use]
    pub fn action_for(&self, pattern_type: PatternType) -> ActionType {
        // Every type is present: `new` refuses a partial table.
        self.routes
            .get(&pattern_type)
            .copied()
            .unwrap_or(ActionType::EscalateTicket)
    }

    /// Decide what to do with a matched pattern.
    pub fn decide(&self, pattern: &Pattern, matched_confidence: f32) -> Decision {
        let action = self.action_for(pattern.pattern_type);

        if matched_confidence < self.config.suggest_threshold {
            return Decision::Escalate;
        }

        if action.is_destructive() {
            // Real-world side effects always go through a human.
            return Decision::Suggest;
        }

        if pattern.auto_executable
            && matched_confidence >= self.config.auto_threshold
            && self.auto_safe.contains(&action)
        {
            return Decision::AutoExecute;
        }

        Decision::Suggest
    }

    /// Decision when no pattern matched.
    #[must_use]
    pub fn decide_no_match(&self) -> Decision {
        Decision::Escalate
    }
}
