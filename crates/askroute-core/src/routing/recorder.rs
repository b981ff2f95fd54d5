//! Append-only route log
//!
//! One row per routed question (not per attempt). The CSV file is shared
//! with the stats dashboard and is the source of truth for bandit warm
//! starts, so rows are only ever appended.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::StrategyKind;
use crate::error::{Error, Result};

/// Header of the route log file
pub const ROUTE_LOG_HEADER: [&str; 6] = [
    "ts",
    "question",
    "rewritten",
    "decision",
    "had_answer",
    "latency_ms",
];

/// Outcome of one routed question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLogEntry {
    pub timestamp: DateTime<Utc>,
    pub raw_question: String,
    pub normalized_question: String,
    pub decision: StrategyKind,
    pub had_answer: bool,
    pub latency_ms: u64,
}

impl RouteLogEntry {
    pub fn new(
        raw_question: impl Into<String>,
        normalized_question: impl Into<String>,
        decision: StrategyKind,
        had_answer: bool,
        latency_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            raw_question: raw_question.into(),
            normalized_question: normalized_question.into(),
            decision,
            had_answer,
            latency_ms,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Durable sink for route outcomes
pub trait RouteLog: Send + Sync {
    /// Append one entry; earlier entries are never touched
    fn append(&self, entry: &RouteLogEntry) -> Result<()>;

    /// All entries in append order
    fn entries(&self) -> Result<Vec<RouteLogEntry>>;
}

/// CSV-backed route log
#[derive(Debug, Clone)]
pub struct CsvRouteLog {
    path: PathBuf,
}

/// A row as it appears on disk; validated into a `RouteLogEntry`
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    ts: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    rewritten: String,
    decision: String,
    had_answer: String,
    latency_ms: String,
}

impl CsvRouteLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_row(row: RawRow) -> std::result::Result<RouteLogEntry, String> {
        let decision: StrategyKind = row
            .decision
            .parse()
            .map_err(|_| format!("unknown decision '{}'", row.decision))?;
        let had_answer = parse_flag(&row.had_answer)
            .ok_or_else(|| format!("bad had_answer '{}'", row.had_answer))?;
        let latency: f64 = row
            .latency_ms
            .trim()
            .parse()
            .map_err(|_| format!("bad latency_ms '{}'", row.latency_ms))?;
        if !latency.is_finite() {
            return Err(format!("bad latency_ms '{}'", row.latency_ms));
        }

        Ok(RouteLogEntry {
            timestamp: parse_timestamp(&row.ts),
            raw_question: row.question,
            normalized_question: row.rewritten,
            decision,
            had_answer,
            latency_ms: latency.max(0.0).round() as u64,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

/// RFC 3339, or the naive ISO form older logs used (taken as UTC)
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    debug!(ts = %value, "Unparseable route log timestamp");
    DateTime::<Utc>::default()
}

impl RouteLog for CsvRouteLog {
    fn append(&self, entry: &RouteLogEntry) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(ROUTE_LOG_HEADER)?;
        }

        let latency = entry.latency_ms.to_string();
        writer.write_record([
            entry.timestamp.to_rfc3339().as_str(),
            entry.raw_question.as_str(),
            entry.normalized_question.as_str(),
            entry.decision.as_str(),
            if entry.had_answer { "1" } else { "0" },
            latency.as_str(),
        ])?;
        writer.flush()?;

        debug!(
            path = %self.path.display(),
            decision = %entry.decision,
            had_answer = entry.had_answer,
            "Appended route log entry"
        );
        Ok(())
    }

    fn entries(&self) -> Result<Vec<RouteLogEntry>> {
        if !self.path.exists() || fs::metadata(&self.path)?.len() == 0 {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        for (index, row) in reader.deserialize::<RawRow>().enumerate() {
            let parsed = row
                .map_err(|e| e.to_string())
                .and_then(Self::parse_row);
            match parsed {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    // Header is line 1
                    warn!(line = index + 2, reason = %reason, "Skipping malformed route log row");
                }
            }
        }
        Ok(entries)
    }
}

/// In-memory route log for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryRouteLog {
    entries: RwLock<Vec<RouteLogEntry>>,
}

impl MemoryRouteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<RouteLogEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RouteLog for MemoryRouteLog {
    fn append(&self, entry: &RouteLogEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| Error::RouteLog("route log lock poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<RouteLogEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| Error::RouteLog("route log lock poisoned".to_string()))?
            .clone())
    }
}

/// Writes one outcome row per routed question
#[derive(Clone)]
pub struct OutcomeRecorder {
    log: Arc<dyn RouteLog>,
}

impl OutcomeRecorder {
    pub fn new(log: Arc<dyn RouteLog>) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &Arc<dyn RouteLog> {
        &self.log
    }

    /// Append the outcome; the caller decides what a failure means
    pub fn record(
        &self,
        raw_question: &str,
        normalized_question: &str,
        decision: StrategyKind,
        had_answer: bool,
        latency_ms: u64,
    ) -> Result<RouteLogEntry> {
        let entry = RouteLogEntry::new(
            raw_question,
            normalized_question,
            decision,
            had_answer,
            latency_ms,
        );
        self.log.append(&entry)?;
        Ok(entry)
    }
}
