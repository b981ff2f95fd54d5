//! TF-IDF retrieval over a JSONL corpus
//!
//! Each corpus line is one document:
//! `{"id": "...", "title": "...", "text": "...", "source_file": "...", "url": "..."}`
//! (`source_file` and `url` optional). Documents and queries are turned into
//! l2-normalized TF-IDF vectors with smooth idf, `ln((1 + n) / (1 + df)) + 1`,
//! and ranked by cosine similarity.
//!
//! The corpus is built from a directory of `.txt` files with
//! [`ingest_directory`], one document per file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{AttemptResult, Strategy};
use crate::error::{Error, Result};
use crate::routing::StrategyKind;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "do", "does", "did", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "if", "in", "into", "is", "it", "its", "me", "more", "my", "no", "not",
    "of", "on", "or", "our", "she", "so", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "was", "we", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "your",
];

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// One document of the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CorpusDocument {
    /// `title (source_file)`, or the bare title
    pub fn source_label(&self) -> String {
        match &self.source_file {
            Some(file) => format!("{} ({})", self.title, file),
            None => self.title.clone(),
        }
    }
}

/// One ranked retrieval result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    /// Position of the document in the corpus
    pub index: usize,
    pub id: String,
    pub score: f64,
    /// 1-based
    pub rank: usize,
}

type SparseVector = Vec<(usize, f64)>;

/// In-memory TF-IDF index
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    documents: Vec<CorpusDocument>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    vectors: Vec<SparseVector>,
}

impl TfIdfIndex {
    pub fn build(documents: Vec<CorpusDocument>) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(&d.text)).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        for tokens in &tokenized {
            let mut seen: Vec<usize> = Vec::new();
            for token in tokens {
                let next_id = vocabulary.len();
                let id = *vocabulary.entry(token.clone()).or_insert(next_id);
                if id == document_frequency.len() {
                    document_frequency.push(0);
                }
                if !seen.contains(&id) {
                    seen.push(id);
                    document_frequency[id] += 1;
                }
            }
        }

        let n = documents.len() as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|df| ((1.0 + n) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();

        let mut index = Self {
            documents,
            vocabulary,
            idf,
            vectors: Vec::new(),
        };
        let vectors = tokenized.iter().map(|t| index.vectorize(t)).collect();
        index.vectors = vectors;
        index
    }

    /// Parse a JSONL corpus; blank lines are ignored
    pub fn parse_jsonl(contents: &str, origin: &Path) -> Result<Self> {
        let mut documents = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let document: CorpusDocument = serde_json::from_str(line).map_err(|e| {
                Error::CorpusError(format!("{} line {}: {}", origin.display(), number + 1, e))
            })?;
            documents.push(document);
        }
        Ok(Self::build(documents))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::CorpusError(format!("cannot read corpus {}: {}", path.display(), e))
        })?;
        let index = Self::parse_jsonl(&contents, path)?;
        info!(
            path = %path.display(),
            documents = index.len(),
            terms = index.vocabulary.len(),
            "Loaded lexical corpus"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[CorpusDocument] {
        &self.documents
    }

    pub fn document(&self, index: usize) -> Option<&CorpusDocument> {
        self.documents.get(index)
    }

    /// Number of distinct indexed terms
    pub fn term_count(&self) -> usize {
        self.vocabulary.len()
    }

    /// l2-normalized TF-IDF vector over known terms, sorted by term id
    fn vectorize(&self, tokens: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            if let Some(id) = self.vocabulary.get(token) {
                *counts.entry(*id).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(id, tf)| (id, tf * self.idf[id]))
            .collect();
        vector.sort_by_key(|(id, _)| *id);

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, weight) in &mut vector {
                *weight /= norm;
            }
        }
        vector
    }

    /// Top `k` documents by cosine similarity; zero-score documents are never hits
    pub fn search(&self, query: &str, k: usize) -> Vec<LexicalHit> {
        let query_vector: HashMap<usize, f64> =
            self.vectorize(&tokenize(query)).into_iter().collect();
        if query_vector.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(index, vector)| {
                let score = vector
                    .iter()
                    .filter_map(|(id, w)| query_vector.get(id).map(|q| q * w))
                    .sum::<f64>();
                (index, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        scored
            .into_iter()
            .enumerate()
            .map(|(rank, (index, score))| LexicalHit {
                index,
                id: self.documents[index].id.clone(),
                score,
                rank: rank + 1,
            })
            .collect()
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `side_effects-2024` becomes `Side Effects-2024`
fn title_from_stem(stem: &str) -> String {
    let mut title = String::with_capacity(stem.len());
    let mut previous_is_letter = false;
    for c in stem.replace('_', " ").chars() {
        if previous_is_letter {
            title.extend(c.to_lowercase());
        } else {
            title.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    title
}

/// One document per `.txt` file in `raw_dir`, ordered by file name
///
/// The file name is both the id and the source file; the title is the stem
/// with underscores as spaces, title-cased.
pub fn read_text_files(raw_dir: &Path) -> Result<Vec<CorpusDocument>> {
    let entries = fs::read_dir(raw_dir).map_err(|e| {
        Error::CorpusError(format!("cannot read {}: {}", raw_dir.display(), e))
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let (Some(name), Some(stem)) = (
            path.file_name().and_then(|n| n.to_str()),
            path.file_stem().and_then(|s| s.to_str()),
        ) else {
            debug!(path = %path.display(), "Skipping file with a non UTF-8 name");
            continue;
        };
        let text = fs::read_to_string(&path).map_err(|e| {
            Error::CorpusError(format!("cannot read {}: {}", path.display(), e))
        })?;

        documents.push(CorpusDocument {
            id: name.to_string(),
            title: title_from_stem(stem),
            text: text.trim().to_string(),
            source_file: Some(name.to_string()),
            url: Some(format!("local://{}", name)),
        });
    }
    Ok(documents)
}

/// Replace the JSONL corpus at `path` with `documents`
pub fn write_corpus(path: &Path, documents: &[CorpusDocument]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut contents = String::new();
    for document in documents {
        contents.push_str(&serde_json::to_string(document)?);
        contents.push('\n');
    }

    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    fs::write(&temp, contents)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Build the corpus at `corpus_path` from the `.txt` files in `raw_dir`
///
/// A directory without text files is an error and leaves any existing
/// corpus untouched.
pub fn ingest_directory(raw_dir: &Path, corpus_path: &Path) -> Result<TfIdfIndex> {
    let documents = read_text_files(raw_dir)?;
    if documents.is_empty() {
        return Err(Error::CorpusError(format!(
            "no .txt files found in {}",
            raw_dir.display()
        )));
    }

    write_corpus(corpus_path, &documents)?;
    let index = TfIdfIndex::build(documents);
    info!(
        raw_dir = %raw_dir.display(),
        corpus = %corpus_path.display(),
        documents = index.len(),
        terms = index.term_count(),
        "Ingested lexical corpus"
    );
    Ok(index)
}

/// Answers with the best-matching corpus passage
#[derive(Debug)]
pub struct LexicalStrategy {
    corpus_path: PathBuf,
    top_k: usize,
    snippet_chars: usize,
    index: OnceCell<Arc<TfIdfIndex>>,
}

impl LexicalStrategy {
    /// The corpus is read on first use
    pub fn new(corpus_path: impl Into<PathBuf>, top_k: usize, snippet_chars: usize) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            top_k: top_k.max(1),
            snippet_chars: snippet_chars.max(1),
            index: OnceCell::new(),
        }
    }

    /// Use an index built in memory
    pub fn with_index(index: TfIdfIndex, top_k: usize, snippet_chars: usize) -> Self {
        Self {
            corpus_path: PathBuf::new(),
            top_k: top_k.max(1),
            snippet_chars: snippet_chars.max(1),
            index: OnceCell::from(Arc::new(index)),
        }
    }

    pub fn corpus_path(&self) -> &Path {
        &self.corpus_path
    }

    async fn index(&self) -> Result<&Arc<TfIdfIndex>> {
        self.index
            .get_or_try_init(|| async { TfIdfIndex::load(&self.corpus_path).await.map(Arc::new) })
            .await
    }
}

#[async_trait]
impl Strategy for LexicalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lexical
    }

    async fn attempt(&self, question: &str) -> Result<AttemptResult> {
        let started = Instant::now();
        let index = self.index().await?;

        let hits = index.search(question, self.top_k);
        let best = hits
            .first()
            .and_then(|hit| index.document(hit.index))
            .map(|doc| doc.text.trim())
            .filter(|text| !text.is_empty());

        let result = match best {
            Some(text) => {
                let sources = hits
                    .iter()
                    .filter_map(|hit| index.document(hit.index))
                    .map(CorpusDocument::source_label)
                    .collect();
                AttemptResult::answered(snippet(text, self.snippet_chars), sources)
            }
            None => AttemptResult::empty(),
        };

        debug!(hits = hits.len(), "Lexical retrieval finished");
        Ok(result.with_latency(started.elapsed().as_millis() as u64))
    }
}
