//! Caddie Core - Pattern-Learning Support Engine
//!
//! This crate is the decision core of Caddie's AI customer-support layer:
//! it learns reusable request/response patterns from historical support
//! conversations, matches incoming messages against the pattern store
//! using semantic (embedding) similarity with a keyword fallback, tracks
//! per-pattern confidence, and decides whether to auto-respond, suggest a
//! reply to an operator, or escalate to a human:
//!
//! - **Contextual matching**: candidate selection folds recent
//!   conversation history into the query, so short replies ("thanks",
//!   "ok") disambiguate against the preceding exchange
//! - **Confidence lifecycle**: operator accept/modify/reject feedback
//!   nudges pattern confidence inside [0, 1]; repeatedly rejected
//!   patterns retire, idle patterns decay
//! - **Bounded degradation**: provider timeouts fall back to keyword
//!   ranking, failed auto-sends escalate after a single retry, store
//!   trouble fails closed into the human queue
//! - **Bulk import**: CSV, `Q:`/`A:` pairs, or free-form notes seed the
//!   store, rate-limited, resumable, and idempotent
//!
//! # Architecture
//!
//! - [`config`]: Tunable thresholds, weights, and provider settings
//! - [`signature`]: Canonical trigger-text normalization
//! - [`provider`]: Embedding and extraction provider contracts
//! - [`store`]: Pattern and execution persistence (SQLite or in-memory)
//! - [`matcher`]: Context-aware candidate ranking
//! - [`policy`]: Auto-execute / suggest / escalate decisions
//! - [`learning`]: Operator feedback loop and confidence decay
//! - [`importer`]: Bulk seeding of the pattern store
//! - [`engine`]: The facade the surrounding application consumes
//! - [`shadow`]: Dual-execution comparison harness
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use caddie_core::config::EngineConfig;
//! use caddie_core::engine::SupportEngine;
//! use caddie_core::provider::OpenAiProvider;
//! use caddie_core::store::PatternDatabase;
//!
//! async fn build() -> caddie_core::EngineResult<SupportEngine> {
//!     let config = EngineConfig::load()?;
//!     let db = PatternDatabase::sqlite("./data/caddie.sqlite").await?;
//!     let provider = Arc::new(OpenAiProvider::new(config.embedding.clone()));
//!     SupportEngine::new(db, provider, my_sender(), config)
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod importer;
pub mod learning;
pub mod logging;
pub mod matcher;
pub mod policy;
pub mod provider;
pub mod shadow;
pub mod signature;
pub mod store;
pub mod template;

pub use config::EngineConfig;
pub use domain::{
    ActionTaken, ConversationMessage, ExecutionOutcome, ExecutionRecord, LearnedFrom, Pattern,
    PatternMatch, PatternType, Speaker,
};
pub use engine::{EngineReply, MessageSender, ReplyAction, SupportEngine};
pub use error::{EngineError, EngineResult};
pub use importer::{ImportResult, Importer};
pub use learning::{LearningLoop, OperatorAction};
pub use matcher::PatternMatcher;
pub use policy::{ActionType, Decision, ExecutionPolicy};
pub use provider::{CachedEmbeddings, EmbeddingProvider, ExtractedRule, OpenAiProvider, RuleExtractor};
pub use shadow::{NoopSender, ShadowHarness};
pub use signature::{normalize, Signature};
pub use store::{ExecutionStore, PatternDatabase, PatternStore, ScoredPattern, UpsertOutcome};
