//! Configuration for the pattern engine.
//!
//! All thresholds and weights are tunable configuration, never hard-coded
//! at use sites. Configuration is loaded from defaults, an optional config
//! file, and `CADDIE__`-prefixed environment variables, then validated
//! before the engine is constructed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Matcher weighting and thresholds.
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Execution policy thresholds and action routing.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Learning feedback steps and decay.
    #[serde(default)]
    pub learning: LearningConfig,
    /// Embedding/extraction provider connection settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Bulk import settings.
    #[serde(default)]
    pub import: ImportConfig,
}

impl EngineConfig {
    /// Load configuration from defaults, `config/caddie.*` if present, and
    /// `CADDIE__`-prefixed environment variables.
    ///
    /// The result is validated; use [`Self::validate`] separately when
    /// constructing a config by hand.
    pub fn load() -> EngineResult<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let loaded = config::Config::builder()
            .add_source(config::File::with_name("config/caddie").required(false))
            .add_source(
                config::Environment::with_prefix("CADDIE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let mut cfg: EngineConfig = loaded
            .try_deserialize()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        // Provider API key from the conventional variable
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            cfg.embedding.api_key = Some(key);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate threshold ranges and cross-field constraints.
    pub fn validate(&self) -> EngineResult<()> {
        let unit = |name: &str, v: f32| -> EngineResult<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(EngineError::Config(format!(
                    "{name} must be within [0, 1], got {v}"
                )))
            }
        };

        unit("matcher.min_match_score", self.matcher.min_match_score)?;
        unit("policy.auto_threshold", self.policy.auto_threshold)?;
        unit("policy.suggest_threshold", self.policy.suggest_threshold)?;
        unit("learning.initial_confidence", self.learning.initial_confidence)?;
        unit(
            "learning.retirement_threshold",
            self.learning.retirement_threshold,
        )?;
        unit("import.dedup_threshold", self.import.dedup_threshold)?;

        if self.policy.auto_threshold < self.policy.suggest_threshold {
            return Err(EngineError::Config(format!(
                "policy.auto_threshold ({}) must not be below policy.suggest_threshold ({})",
                self.policy.auto_threshold, self.policy.suggest_threshold
            )));
        }
        if self.matcher.context_window == 0 {
            return Err(EngineError::Config(
                "matcher.context_window must be at least 1".to_string(),
            ));
        }
        if self.matcher.top_k == 0 {
            return Err(EngineError::Config(
                "matcher.top_k must be at least 1".to_string(),
            ));
        }
        if self.matcher.semantic_weight + self.matcher.confidence_weight <= 0.0 {
            return Err(EngineError::Config(
                "matcher weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pattern matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// How many trailing history messages join the contextual query.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// How many times the newest message is repeated in the contextual
    /// query to bias toward current intent.
    #[serde(default = "default_recency_boost")]
    pub recency_boost: usize,
    /// Candidate pool size fetched from the store.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Weight of semantic/keyword similarity in the combined score.
    #[serde(default = "default_half")]
    pub semantic_weight: f32,
    /// Weight of the pattern's stored confidence in the combined score.
    #[serde(default = "default_half")]
    pub confidence_weight: f32,
    /// Minimum combined score; below this the matcher reports no match.
    #[serde(default = "default_min_match_score")]
    pub min_match_score: f32,
}

fn default_context_window() -> usize {
    4
}

fn default_recency_boost() -> usize {
    2
}

fn default_top_k() -> usize {
    5
}

fn default_half() -> f32 {
    0.5
}

fn default_min_match_score() -> f32 {
    0.55
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            recency_boost: default_recency_boost(),
            top_k: default_top_k(),
            semantic_weight: default_half(),
            confidence_weight: default_half(),
            min_match_score: default_min_match_score(),
        }
    }
}

/// Execution policy configuration.
///
/// An explicit value object handed to the policy at construction time;
/// business logic never reads ambient environment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Confidence required for unattended execution.
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: f32,
    /// Confidence required to surface a suggestion at all.
    #[serde(default = "default_suggest_threshold")]
    pub suggest_threshold: f32,
    /// Action tags that may run without confirmation.
    #[serde(default = "default_auto_safe_actions")]
    pub auto_safe_actions: Vec<String>,
    /// Pattern-type tag to action tag routing, validated at startup.
    #[serde(default = "default_action_routes")]
    pub action_routes: HashMap<String, String>,
}

fn default_auto_threshold() -> f32 {
    0.85
}

fn default_suggest_threshold() -> f32 {
    0.55
}

fn default_auto_safe_actions() -> Vec<String> {
    vec![
        "send_message".to_string(),
        "share_faq".to_string(),
        "booking_link".to_string(),
    ]
}

fn default_action_routes() -> HashMap<String, String> {
    [
        ("booking", "booking_link"),
        ("tech", "simulator_reboot"),
        ("faq", "share_faq"),
        ("hours", "send_message"),
        ("access", "door_unlock"),
        ("general", "send_message"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_threshold: default_auto_threshold(),
            suggest_threshold: default_suggest_threshold(),
            auto_safe_actions: default_auto_safe_actions(),
            action_routes: default_action_routes(),
        }
    }
}

/// Learning feedback loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Confidence assigned to newly created patterns.
    #[serde(default = "default_initial_confidence")]
    pub initial_confidence: f32,
    /// Upward nudge when an operator accepts a suggestion.
    #[serde(default = "default_accept_step")]
    pub accept_step: f32,
    /// Smaller upward nudge when an operator edits before sending.
    #[serde(default = "default_modify_step")]
    pub modify_step: f32,
    /// Downward nudge when an operator rejects a suggestion.
    #[serde(default = "default_reject_step")]
    pub reject_step: f32,
    /// Confidence below which a repeatedly rejected pattern is retired.
    #[serde(default = "default_retirement_threshold")]
    pub retirement_threshold: f32,
    /// Consecutive similar modifications before the template is revised.
    #[serde(default = "default_variant_after_modifications")]
    pub variant_after_modifications: u32,
    /// Days without execution before a pattern starts decaying.
    #[serde(default = "default_decay_window_days")]
    pub decay_window_days: i64,
    /// Confidence lost per decay sweep for idle patterns.
    #[serde(default = "default_decay_step")]
    pub decay_step: f32,
    /// Reinforcement applied to an existing pattern when an import merges
    /// a near-duplicate into it.
    #[serde(default = "default_merge_reinforcement")]
    pub merge_reinforcement: f32,
}

fn default_initial_confidence() -> f32 {
    0.5
}

fn default_accept_step() -> f32 {
    0.02
}

fn default_modify_step() -> f32 {
    0.01
}

fn default_reject_step() -> f32 {
    0.05
}

fn default_retirement_threshold() -> f32 {
    0.3
}

fn default_variant_after_modifications() -> u32 {
    3
}

fn default_decay_window_days() -> i64 {
    30
}

fn default_decay_step() -> f32 {
    0.05
}

fn default_merge_reinforcement() -> f32 {
    0.02
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            initial_confidence: default_initial_confidence(),
            accept_step: default_accept_step(),
            modify_step: default_modify_step(),
            reject_step: default_reject_step(),
            retirement_threshold: default_retirement_threshold(),
            variant_after_modifications: default_variant_after_modifications(),
            decay_window_days: default_decay_window_days(),
            decay_step: default_decay_step(),
            merge_reinforcement: default_merge_reinforcement(),
        }
    }
}

/// Embedding/extraction provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL for the provider API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for authentication.
    pub api_key: Option<String>,
    /// Embedding model identifier.
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Expected vector dimensionality.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Model used for free-form rule extraction.
    #[serde(default = "default_extract_model")]
    pub extraction_model: String,
    /// Bounded request timeout; on expiry the caller degrades to keyword
    /// matching rather than blocking the conversation pipeline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_extract_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_embed_model(),
            dimensions: default_dimensions(),
            extraction_model: default_extract_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Bulk import configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Provider calls allowed per minute during a batch.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Burst allowance on top of the steady rate.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Signature similarity above which two patterns are merged.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_burst() -> u32 {
    10
}

fn default_dedup_threshold() -> f32 {
    0.9
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.policy.auto_threshold = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("auto_threshold"));
    }

    #[test]
    fn test_auto_below_suggest_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.policy.auto_threshold = 0.4;
        cfg.policy.suggest_threshold = 0.6;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_context_window_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.matcher.context_window = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_default_routes_cover_all_pattern_types() {
        let cfg = PolicyConfig::default();
        for ty in crate::domain::PatternType::all() {
            assert!(cfg.action_routes.contains_key(ty.as_str()), "{}", ty.as_str());
        }
    }
}
