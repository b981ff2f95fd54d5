//! Answer strategies
//!
//! Each backend the router can consult implements [`Strategy`]:
//!
//! - **Arithmetic**: evaluates human-number arithmetic such as `97B + 20%`.
//! - **Graph**: templated Cypher queries against a Neo4j HTTP endpoint.
//! - **Lexical**: TF-IDF retrieval over a JSONL document corpus.
//!
//! An `Err` from [`Strategy::attempt`] is a recoverable backend fault; the
//! executor records it and moves on to the next strategy of the plan.

mod arithmetic;
mod graph;
mod lexical;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::routing::StrategyKind;

pub use arithmetic::{
    ArithmeticStrategy, evaluate, find_expression, format_answer, format_human_number,
    format_plain_number, is_pure_expression, pure_expression_value,
};
pub use graph::{GraphQuery, GraphStrategy, match_template};
pub use lexical::{
    CorpusDocument, LexicalHit, LexicalStrategy, TfIdfIndex, ingest_directory, read_text_files,
    snippet, write_corpus,
};

/// What one strategy produced for a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub succeeded: bool,
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub latency_ms: u64,
}

impl AttemptResult {
    /// A usable answer
    pub fn answered(answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            succeeded: true,
            answer: Some(answer.into()),
            sources,
            latency_ms: 0,
        }
    }

    /// Text worth showing if nothing better turns up, but not an answer
    pub fn partial(answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            succeeded: false,
            answer: Some(answer.into()),
            sources,
            latency_ms: 0,
        }
    }

    /// Nothing to say about this question
    pub fn empty() -> Self {
        Self {
            succeeded: false,
            answer: None,
            sources: Vec::new(),
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Successful with a non-blank answer
    pub fn is_answer(&self) -> bool {
        self.succeeded && self.non_blank_answer().is_some()
    }

    pub fn non_blank_answer(&self) -> Option<&str> {
        self.answer
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// A backend that can try to answer a normalized question
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Which arm this backend serves
    fn kind(&self) -> StrategyKind;

    /// Try to answer; called at most once per strategy per routed question
    async fn attempt(&self, question: &str) -> Result<AttemptResult>;
}

/// The registered backends, at most one per strategy kind
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: BTreeMap<StrategyKind, Arc<dyn Strategy>>,
}

impl std::fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategySet")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one of the same kind
    pub fn with(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.insert(strategy);
        self
    }

    pub fn insert(&mut self, strategy: Arc<dyn Strategy>) {
        let kind = strategy.kind();
        if self.strategies.insert(kind, strategy).is_some() {
            debug!(strategy = %kind, "Replaced registered strategy");
        }
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(&kind)
    }

    pub fn contains(&self, kind: StrategyKind) -> bool {
        self.strategies.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Backends described by the configuration
    ///
    /// Arithmetic and lexical retrieval are always registered; the graph
    /// backend only when enabled. A graph client that cannot be built is
    /// left out with a warning rather than failing startup.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut set = Self::new()
            .with(Arc::new(ArithmeticStrategy::new()))
            .with(Arc::new(LexicalStrategy::new(
                config.corpus_path()?,
                config.lexical.top_k,
                config.lexical.snippet_chars,
            )));

        if config.graph.enabled {
            match GraphStrategy::from_config(&config.graph, &config.normalizer) {
                Ok(graph) => set.insert(Arc::new(graph)),
                Err(e) => warn!(error = %e, "Graph backend unavailable"),
            }
        }

        Ok(set)
    }
}
