//! Bulk conversation/rule import.
//!
//! Seeds the pattern store from operator-provided data. The input shape is
//! auto-detected: a CSV with recognizable headers, `Q:`/`A:` pairs, or
//! free-form notes. Free-form text is first mined locally for
//! condition/action sentences ("if X, do Y"); anything that resists the
//! local heuristics goes to the external extraction model.
//!
//! Every created pattern gets its embedding before it is stored, so an
//! imported pattern is never active-but-invisible to semantic search. A
//! row whose embedding fails counts as `failed` and creates nothing.
//!
//! Batches run out-of-band: provider calls are rate-limited, the future is
//! cancellable, and `next_offset` in the result makes a partial batch
//! resumable without re-importing processed rows. Re-importing the same
//! input is idempotent (near-duplicates merge instead of duplicating).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::OnceLock;

use chrono::Utc;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ImportConfig, LearningConfig};
use crate::domain::{LearnedFrom, Pattern, PatternType};
use crate::error::EngineResult;
use crate::logging::OpTimer;
use crate::provider::{EmbeddingProvider, ExtractedRule, RuleExtractor};
use crate::store::{PatternDatabase, PatternStore, UpsertOutcome};

/// Rate limiter over provider calls during a batch.
type ProviderRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

const TRIGGER_HEADERS: &[&str] = &["trigger", "question", "q", "message", "customer_message"];
const RESPONSE_HEADERS: &[&str] = &["response", "answer", "a", "reply"];
const CATEGORY_HEADERS: &[&str] = &["category", "type", "pattern_type"];
const CONFIDENCE_HEADERS: &[&str] = &["confidence", "score"];

/// Detected input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// Structured CSV with a header row.
    Csv,
    /// `Q:` / `A:` marker pairs.
    QaPairs,
    /// Unstructured notes.
    FreeForm,
}

/// Outcome of an import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// New patterns created.
    pub created: u32,
    /// Rows merged into existing near-duplicates.
    pub merged: u32,
    /// Rows that could not be imported.
    pub failed: u32,
    /// First unprocessed row index; pass back to resume a partial batch.
    pub next_offset: usize,
}

struct ParsedInput {
    rules: Vec<ExtractedRule>,
    failed: u32,
}

/// Bulk importer over the pattern store.
pub struct Importer {
    db: PatternDatabase,
    embeddings: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn RuleExtractor>,
    limiter: ProviderRateLimiter,
    config: ImportConfig,
    learning: LearningConfig,
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Importer {
    /// Create an importer.
    #[must_use]
    pub fn new(
        db: PatternDatabase,
        embeddings: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn RuleExtractor>,
        config: ImportConfig,
        learning: LearningConfig,
    ) -> Self {
        let per_minute =
            NonZeroU32::new(config.requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute).allow_burst(burst));

        Self {
            db,
            embeddings,
            extractor,
            limiter,
            config,
            learning,
        }
    }

    /// Import a whole input from the beginning.
    pub async fn import(&self, raw_text: &str) -> EngineResult<ImportResult> {
        self.import_from(raw_text, 0).await
    }

    /// Import starting at `offset` (rows before it are assumed done).
    ///
    /// Provider trouble fails individual rows; store trouble aborts the
    /// batch with an error (re-running the same input is safe either way).
    pub async fn import_from(&self, raw_text: &str, offset: usize) -> EngineResult<ImportResult> {
        let timer = OpTimer::new("importer", "import");
        let format = detect_format(raw_text);
        tracing::info!(?format, offset, "Import batch started");

        let parsed = match format {
            ImportFormat::Csv => parse_csv(raw_text),
            ImportFormat::QaPairs => parse_qa(raw_text),
            ImportFormat::FreeForm => self.parse_free_form(raw_text).await,
        };

        let mut result = ImportResult {
            failed: parsed.failed,
            next_offset: offset,
            ..ImportResult::default()
        };

        for (index, rule) in parsed.rules.into_iter().enumerate().skip(offset) {
            match self.import_rule(rule).await {
                Ok(UpsertOutcome::Created(_)) => result.created += 1,
                Ok(UpsertOutcome::Merged(_)) => result.merged += 1,
                Err(e) if e.is_degradable() => {
                    tracing::warn!(row = index, error = %e, "Import row failed");
                    result.failed += 1;
                }
                Err(e) => {
                    timer.finish_with_result::<(), _>(Err(&e));
                    return Err(e);
                }
            }
            result.next_offset = index + 1;
        }

        tracing::info!(
            created = result.created,
            merged = result.merged,
            failed = result.failed,
            "Import batch finished"
        );
        timer.finish();
        Ok(result)
    }

    async fn import_rule(&self, rule: ExtractedRule) -> EngineResult<UpsertOutcome> {
        self.limiter.until_ready().await;
        // Embedding comes first: a pattern is only stored once it is
        // semantically searchable.
        let embedding = self.embeddings.embed(&rule.trigger).await?;

        let pattern_type = rule
            .category
            .as_deref()
            .and_then(PatternType::parse)
            .unwrap_or(PatternType::General);
        let confidence = rule
            .confidence
            .unwrap_or(self.learning.initial_confidence);

        let pattern = Pattern::new(
            rule.trigger,
            rule.response,
            pattern_type,
            confidence,
            LearnedFrom::CsvBatchImport,
            Utc::now(),
        )
        .with_embedding(embedding);

        self.db
            .upsert_merging(
                pattern,
                self.config.dedup_threshold,
                self.learning.merge_reinforcement,
            )
            .await
    }

    async fn parse_free_form(&self, raw: &str) -> ParsedInput {
        let local = parse_rule_sentences(raw);
        if !local.rules.is_empty() {
            return local;
        }

        self.limiter.until_ready().await;
        match self.extractor.extract_rules(raw).await {
            Ok(rules) => ParsedInput { rules, failed: 0 },
            Err(e) => {
                tracing::warn!(error = %e, "Free-form extraction failed");
                ParsedInput {
                    rules: Vec::new(),
                    failed: 1,
                }
            }
        }
    }
}

/// Detect the input shape with cheap heuristics.
#[must_use]
pub fn detect_format(raw: &str) -> ImportFormat {
    let first_line = raw
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .to_lowercase();
    if first_line.contains(',') {
        let fields: Vec<&str> = first_line.split(',').map(str::trim).collect();
        let has_trigger = fields.iter().any(|f| TRIGGER_HEADERS.contains(f));
        let has_response = fields.iter().any(|f| RESPONSE_HEADERS.contains(f));
        if has_trigger && has_response {
            return ImportFormat::Csv;
        }
    }

    let mut has_q = false;
    let mut has_a = false;
    for line in raw.lines() {
        let lower = line.trim_start().to_lowercase();
        has_q |= lower.starts_with("q:");
        has_a |= lower.starts_with("a:");
    }
    if has_q && has_a {
        return ImportFormat::QaPairs;
    }

    ImportFormat::FreeForm
}

fn parse_csv(raw: &str) -> ParsedInput {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "CSV header row unreadable");
            return ParsedInput {
                rules: Vec::new(),
                failed: 1,
            };
        }
    };

    let trigger_idx = find_column(&headers, TRIGGER_HEADERS);
    let response_idx = find_column(&headers, RESPONSE_HEADERS);
    let category_idx = find_column(&headers, CATEGORY_HEADERS);
    let confidence_idx = find_column(&headers, CONFIDENCE_HEADERS);

    let (Some(trigger_idx), Some(response_idx)) = (trigger_idx, response_idx) else {
        tracing::warn!("CSV input is missing trigger/response columns");
        return ParsedInput {
            rules: Vec::new(),
            failed: 1,
        };
    };

    let mut rules = Vec::new();
    let mut failed = 0;
    for record in reader.records() {
        let Ok(record) = record else {
            failed += 1;
            continue;
        };
        let trigger = record.get(trigger_idx).unwrap_or("").trim();
        let response = record.get(response_idx).unwrap_or("").trim();
        if trigger.is_empty() || response.is_empty() {
            failed += 1;
            continue;
        }
        rules.push(ExtractedRule {
            trigger: trigger.to_string(),
            response: response.to_string(),
            category: category_idx
                .and_then(|i| record.get(i))
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
            confidence: confidence_idx
                .and_then(|i| record.get(i))
                .and_then(|s| s.trim().parse::<f32>().ok()),
        });
    }

    ParsedInput { rules, failed }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
}

fn parse_qa(raw: &str) -> ParsedInput {
    let mut rules = Vec::new();
    let mut failed = 0;
    let mut trigger: Option<String> = None;
    let mut response: Option<String> = None;

    let flush = |trigger: &mut Option<String>, response: &mut Option<String>, failed: &mut u32| {
        match (trigger.take(), response.take()) {
            (Some(t), Some(r)) => Some((t, r)),
            (Some(_), None) => {
                *failed += 1;
                None
            }
            _ => None,
        }
    };

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if lower.starts_with("q:") {
            if let Some((t, r)) = flush(&mut trigger, &mut response, &mut failed) {
                rules.push(ExtractedRule {
                    trigger: t,
                    response: r,
                    category: None,
                    confidence: None,
                });
            }
            trigger = Some(trimmed[2..].trim().to_string());
        } else if lower.starts_with("a:") {
            if trigger.is_some() {
                let answer = trimmed[2..].trim();
                match response.as_mut() {
                    Some(r) => {
                        r.push(' ');
                        r.push_str(answer);
                    }
                    None => response = Some(answer.to_string()),
                }
            } else {
                failed += 1;
            }
        } else if let Some(r) = response.as_mut() {
            r.push(' ');
            r.push_str(trimmed);
        } else if let Some(t) = trigger.as_mut() {
            t.push(' ');
            t.push_str(trimmed);
        }
    }

    if let Some((t, r)) = flush(&mut trigger, &mut response, &mut failed) {
        rules.push(ExtractedRule {
            trigger: t,
            response: r,
            category: None,
            confidence: None,
        });
    }

    ParsedInput { rules, failed }
}

fn rule_sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:if|when|whenever|every time)\s+(.+?),\s*(?:then\s+)?(.+)")
            .expect("rule sentence regex is valid")
    })
}

/// Mine free-form notes for condition/action sentences locally before
/// spending an extraction call.
fn parse_rule_sentences(raw: &str) -> ParsedInput {
    let mut rules = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = rule_sentence_re().captures(trimmed) {
            let trigger = caps[1].trim().to_string();
            let response = caps[2].trim().trim_end_matches('.').to_string();
            if !trigger.is_empty() && !response.is_empty() {
                rules.push(ExtractedRule {
                    trigger,
                    response,
                    category: None,
                    confidence: None,
                });
            }
        }
    }
    ParsedInput { rules, failed: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for StaticEmbeddings {
        async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0, 0.5])
        }
    }

    struct FailingEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbeddings {
        async fn embed(&self, _text: &str) -> EngineResult<Vec<f32>> {
            Err(EngineError::provider("synthetic outage"))
        }
    }

    #[derive(Default)]
    struct TrackingExtractor {
        called: AtomicBool,
        rules: Vec<ExtractedRule>,
    }

    #[async_trait]
    impl RuleExtractor for TrackingExtractor {
        async fn extract_rules(&self, _text: &str) -> EngineResult<Vec<ExtractedRule>> {
            self.called.store(true, Ordering::SeqCst);
            Ok(self.rules.clone())
        }
    }

    fn importer_with(
        db: PatternDatabase,
        embeddings: Arc<dyn EmbeddingProvider>,
        extractor: Arc<TrackingExtractor>,
    ) -> Importer {
        Importer::new(
            db,
            embeddings,
            extractor,
            ImportConfig::default(),
            LearningConfig::default(),
        )
    }

    const CSV_INPUT: &str = "\
trigger,response,category,confidence
what are your hours,We're open 9am-9pm,hours,0.8
my screen is frozen,Try restarting the bay PC,tech,0.6
do you sell gift cards,Yes! Ask at the front desk,faq,0.7
";

    #[tokio::test]
    async fn test_csv_import_creates_patterns_with_embeddings() {
        let db = PatternDatabase::in_memory();
        let importer = importer_with(
            db.clone(),
            Arc::new(StaticEmbeddings),
            Arc::new(TrackingExtractor::default()),
        );

        let result = importer.import(CSV_INPUT).await.unwrap();
        assert_eq!(result.created, 3);
        assert_eq!(result.merged, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(result.next_offset, 3);

        let active = db.list_active().await.unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(Pattern::is_semantic));
        assert!(active
            .iter()
            .all(|p| p.learned_from == LearnedFrom::CsvBatchImport));
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let db = PatternDatabase::in_memory();
        let importer = importer_with(
            db.clone(),
            Arc::new(StaticEmbeddings),
            Arc::new(TrackingExtractor::default()),
        );

        importer.import(CSV_INPUT).await.unwrap();
        let second = importer.import(CSV_INPUT).await.unwrap();

        assert_eq!(second.created, 0);
        assert_eq!(second.merged, 3);
        assert_eq!(db.list_active().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_qa_pairs_import() {
        let db = PatternDatabase::in_memory();
        let importer = importer_with(
            db.clone(),
            Arc::new(StaticEmbeddings),
            Arc::new(TrackingExtractor::default()),
        );

        let input = "\
Q: what are your hours
A: We're open 9am-9pm
Q: where do I park
A: The lot behind the building
   is free after 6pm
";
        let result = importer.import(input).await.unwrap();
        assert_eq!(result.created, 2);

        let active = db.list_active().await.unwrap();
        let parking = active
            .iter()
            .find(|p| p.trigger_text == "where do I park")
            .unwrap();
        assert_eq!(
            parking.response_template,
            "The lot behind the building is free after 6pm"
        );
    }

    #[tokio::test]
    async fn test_free_form_uses_local_heuristics_first() {
        let db = PatternDatabase::in_memory();
        let extractor = Arc::new(TrackingExtractor::default());
        let importer = importer_with(db.clone(), Arc::new(StaticEmbeddings), extractor.clone());

        let input = "When the simulator freezes, ask them to restart the bay PC.\n\
                     If someone asks about gift cards, point them to the front desk.";
        let result = importer.import(input).await.unwrap();

        assert_eq!(result.created, 2);
        assert!(!extractor.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_free_form_falls_back_to_extractor() {
        let db = PatternDatabase::in_memory();
        let extractor = Arc::new(TrackingExtractor {
            called: AtomicBool::new(false),
            rules: vec![ExtractedRule {
                trigger: "what are your hours".to_string(),
                response: "We're open 9am-9pm".to_string(),
                category: Some("hours".to_string()),
                confidence: Some(0.8),
            }],
        });
        let importer = importer_with(db.clone(), Arc::new(StaticEmbeddings), extractor.clone());

        let input = "Customers keep asking about opening times and we always tell them \
                     nine to nine.";
        let result = importer.import(input).await.unwrap();

        assert!(extractor.called.load(Ordering::SeqCst));
        assert_eq!(result.created, 1);
        let active = db.list_active().await.unwrap();
        assert_eq!(active[0].pattern_type, PatternType::Hours);
    }

    #[tokio::test]
    async fn test_embedding_failure_never_creates_degraded_patterns() {
        let db = PatternDatabase::in_memory();
        let importer = importer_with(
            db.clone(),
            Arc::new(FailingEmbeddings),
            Arc::new(TrackingExtractor::default()),
        );

        let result = importer.import(CSV_INPUT).await.unwrap();
        assert_eq!(result.created, 0);
        assert_eq!(result.failed, 3);
        assert!(db.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_skips_processed_rows() {
        let db = PatternDatabase::in_memory();
        let importer = importer_with(
            db.clone(),
            Arc::new(StaticEmbeddings),
            Arc::new(TrackingExtractor::default()),
        );

        let result = importer.import_from(CSV_INPUT, 2).await.unwrap();
        assert_eq!(result.created, 1);
        assert_eq!(result.next_offset, 3);
        assert_eq!(db.list_active().await.unwrap().len(), 1);
    }

    #[test]
    fn test_detect_format_csv() {
        assert_eq!(detect_format(CSV_INPUT), ImportFormat::Csv);
    }

    #[test]
    fn test_detect_format_qa() {
        assert_eq!(
            detect_format("Q: hours?\nA: 9-9"),
            ImportFormat::QaPairs
        );
    }

    #[test]
    fn test_detect_format_free_form() {
        assert_eq!(
            detect_format("operators usually say hi back"),
            ImportFormat::FreeForm
        );
        // A comma alone does not make a CSV.
        assert_eq!(
            detect_format("hello, world\nmore text"),
            ImportFormat::FreeForm
        );
    }

    #[test]
    fn test_qa_question_without_answer_counts_failed() {
        let parsed = parse_qa("Q: anyone there\nQ: hours?\nA: 9-9");
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.failed, 1);
    }

    #[test]
    fn test_rule_sentence_extraction() {
        let parsed = parse_rule_sentences(
            "Every time a league night runs long, we comp the next group's first hour.",
        );
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].trigger, "a league night runs long");
        assert_eq!(
            parsed.rules[0].response,
            "we comp the next group's first hour"
        );
    }
}
