//! Trigger signature normalization.
//!
//! Converts raw message text into a canonical form used for fast
//! pre-filtering, keyword ranking, and near-duplicate detection during
//! import. Normalization is pure and deterministic: no I/O, and applying
//! it to its own output returns the same signature.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical normalized form of message text.
///
/// Lowercased, punctuation-stripped, with volatile tokens (phone numbers,
/// times, amounts, bare numbers, self-introduced names) replaced by
/// generic placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(String);

impl Signature {
    /// Wrap text that is already in normalized form (e.g. read back from
    /// the pattern store).
    #[must_use]
    pub fn from_normalized(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The normalized text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Trigram Jaccard similarity against another signature, in [0, 1].
    ///
    /// Used for the keyword ranking path when no embedding is available and
    /// for near-duplicate detection during import.
    #[must_use]
    pub fn similarity(&self, other: &Signature) -> f32 {
        let a = trigrams(&self.0);
        let b = trigrams(&other.0);
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(&b).count();
        let union = a.len() + b.len() - intersection;
        #[allow(clippy::cast_precision_loss, reason = "trigram counts are small")]
        let score = intersection as f32 / union as f32;
        score
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\+?\d{3}[\s.\-]?\d{3}[\s.\-]?\d{4}").expect("phone regex is valid")
    })
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}:\d{2}\s?(?:am|pm)?|\d{1,2}\s?(?:am|pm)\b").expect("time regex is valid"))
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\d+(?:\.\d+)?").expect("money regex is valid"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex is valid"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(im|i am|this is|my name is)\s+([a-z]+)").expect("name regex is valid")
    })
}

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9{}\s]").expect("noise regex is valid"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// Normalize raw message text into its canonical signature.
///
/// Idempotent: `normalize(normalize(t).as_str()) == normalize(t)`.
#[must_use]
pub fn normalize(text: &str) -> Signature {
    let lowered = text.to_lowercase().replace(['\u{2019}', '\''], "");
    let named = name_re().replace_all(&lowered, "$1 {name}");
    let phoned = phone_re().replace_all(&named, "{phone}");
    let timed = time_re().replace_all(&phoned, "{time}");
    let monied = money_re().replace_all(&timed, "{money}");
    let numbered = number_re().replace_all(&monied, "{number}");
    let stripped = noise_re().replace_all(&numbered, " ");
    let collapsed = whitespace_re().replace_all(&stripped, " ");
    Signature(collapsed.trim().to_string())
}

/// Character trigrams of a signature, padded at the boundaries.
fn trigrams(text: &str) -> HashSet<String> {
    if text.is_empty() {
        return HashSet::new();
    }
    let padded: Vec<char> = format!("  {text} ").chars().collect();
    padded.windows(3).map(|w| w.iter().collect()).collect()
}
