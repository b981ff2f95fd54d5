//! Question intake and rule-based rewriting
//!
//! Rewrites a raw question into the canonical phrasing the backends match
//! best ("Tesla 2024" becomes "Tesla 2024 revenue", "who runs tesla" becomes
//! "tesla ceo"). Every rule reads the lower-cased original text, so the
//! outcome of one rule never changes whether a later rule fires.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::NormalizerConfig;
use crate::error::{Error, Result};

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year pattern is valid"));

const CEO_SYNS: &[&str] = &["ceo", "chief executive", "who runs", "head of"];
const REVENUE_SYNS: &[&str] = &["revenue", "sales", "turnover", "top line", "income"];
const SIDE_EFFECT_SYNS: &[&str] = &[
    "side effect",
    "adverse effect",
    "nausea",
    "diarrhea",
    "stomach upset",
];
const INTERACTION_SYNS: &[&str] = &["interact", "interaction", "contraindication", "safe with"];

/// A question as received from the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question(String);

impl Question {
    /// Merge typed text with text extracted from an attached image
    ///
    /// At least one of the two must be non-blank.
    pub fn compose(typed: Option<&str>, image_text: Option<&str>) -> Result<Self> {
        let typed = typed.map(str::trim).filter(|s| !s.is_empty());
        let image_text = image_text.map(str::trim).filter(|s| !s.is_empty());

        match (typed, image_text) {
            (Some(q), Some(ocr)) => Ok(Self(format!("{q}\n\n[Image OCR]: {ocr}"))),
            (Some(q), None) => Ok(Self(q.to_string())),
            (None, Some(ocr)) => Ok(Self(ocr.to_string())),
            (None, None) => Err(Error::EmptyQuestion),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The rewritten question every strategy sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedQuestion {
    pub text: String,
    /// Names of the rules that fired, in evaluation order
    pub applied: Vec<&'static str>,
}

impl NormalizedQuestion {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Lower-cased entity tables the rules match against
#[derive(Debug, Clone)]
struct Lexicon {
    companies: Vec<String>,
    drugs: Vec<String>,
    interaction_pairs: Vec<(String, String)>,
}

impl Lexicon {
    fn first_company<'a>(&'a self, text: &str) -> Option<&'a str> {
        first_in(&self.companies, text)
    }

    fn first_drug<'a>(&'a self, text: &str) -> Option<&'a str> {
        first_in(&self.drugs, text)
    }
}

fn first_in<'a>(terms: &'a [String], text: &str) -> Option<&'a str> {
    terms
        .iter()
        .find(|t| text.contains(t.as_str()))
        .map(String::as_str)
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

/// One rewrite: returns the new text when it fires
///
/// `lowered` is the lower-cased original question, `current` the output of
/// the rules evaluated so far.
struct RewriteRule {
    name: &'static str,
    apply: fn(&Lexicon, &str, &str) -> Option<String>,
}

const RULES: &[RewriteRule] = &[
    RewriteRule {
        name: "revenue_hint",
        apply: |lex, lowered, current| {
            let wants_revenue = lex.first_company(lowered).is_some()
                && YEAR_RE.is_match(lowered)
                && !contains_any(lowered, REVENUE_SYNS);
            wants_revenue.then(|| format!("{current} revenue"))
        },
    },
    RewriteRule {
        name: "ceo",
        apply: |lex, lowered, _| {
            if !contains_any(lowered, CEO_SYNS) || lowered.contains("ceo") {
                return None;
            }
            lex.first_company(lowered).map(|c| format!("{c} ceo"))
        },
    },
    RewriteRule {
        name: "side_effects",
        apply: |lex, lowered, _| {
            if lowered.contains("side effects") || !contains_any(lowered, SIDE_EFFECT_SYNS) {
                return None;
            }
            lex.first_drug(lowered).map(|d| format!("{d} side effects"))
        },
    },
    RewriteRule {
        name: "interaction",
        apply: |lex, lowered, _| {
            if contains_any(lowered, INTERACTION_SYNS) {
                return None;
            }
            lex.interaction_pairs
                .iter()
                .find(|(a, b)| lowered.contains(a.as_str()) && lowered.contains(b.as_str()))
                .map(|(a, b)| format!("does {a} interact with {b}?"))
        },
    },
];

/// Rule-based question normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    lexicon: Lexicon,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizerConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            lexicon: Lexicon {
                companies: lower(&config.companies),
                drugs: lower(&config.drugs),
                interaction_pairs: config
                    .interaction_pairs
                    .iter()
                    .map(|(a, b)| (a.trim().to_lowercase(), b.trim().to_lowercase()))
                    .collect(),
            },
        }
    }

    /// Names of the rules in evaluation order
    pub fn rule_names() -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|r| r.name)
    }

    /// Apply every rule once, in order
    pub fn normalize(&self, question: &str) -> NormalizedQuestion {
        let mut text = question.trim().to_string();
        let lowered = text.to_lowercase();
        let mut applied = Vec::new();

        for rule in RULES {
            if let Some(rewritten) = (rule.apply)(&self.lexicon, &lowered, &text) {
                text = rewritten;
                applied.push(rule.name);
            }
        }

        NormalizedQuestion { text, applied }
    }
}
