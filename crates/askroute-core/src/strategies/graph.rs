//! Graph lookups over the Neo4j HTTP transactional endpoint
//!
//! Questions are matched against a small table of query templates; a
//! question no template recognizes produces no answer without touching the
//! database.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{AttemptResult, Strategy};
use crate::config::{GraphConfig, NormalizerConfig};
use crate::error::{Error, Result};
use crate::routing::StrategyKind;

const CEO_CYPHER: &str = "MATCH (p:Person)-[:CEO_OF]->(c:Company) \
     WHERE toLower(c.name) = $company \
     RETURN p.name AS ceo, c.name AS company LIMIT 1";

const NODE_COUNT_CYPHER: &str = "MATCH (n) RETURN count(n) AS c";

const INTERACTION_CYPHER: &str = "MATCH (a:Drug)-[:INTERACTS_WITH]-(b:Drug) \
     WHERE toLower(a.name) = $first AND toLower(b.name) = $second \
     RETURN a.name AS a, b.name AS b LIMIT 1";

/// A recognized question and the query that answers it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphQuery {
    /// Who is the CEO of a company
    Ceo { company: String },
    /// Whether two drugs interact
    Interaction { first: String, second: String },
}

impl GraphQuery {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ceo { .. } => "ceo",
            Self::Interaction { .. } => "interaction",
        }
    }

    pub fn cypher(&self) -> &'static str {
        match self {
            Self::Ceo { .. } => CEO_CYPHER,
            Self::Interaction { .. } => INTERACTION_CYPHER,
        }
    }

    pub fn parameters(&self) -> Value {
        match self {
            Self::Ceo { company } => json!({ "company": company }),
            Self::Interaction { first, second } => json!({ "first": first, "second": second }),
        }
    }

    /// Sentence for the first returned row
    pub fn answer(&self, row: &[Value]) -> Option<String> {
        let first = row.first().map(cell_text)?;
        let second = row.get(1).map(cell_text)?;
        Some(match self {
            Self::Ceo { .. } => format!("{} is the CEO of {}.", first, second),
            Self::Interaction { .. } => format!("{} can interact with {}.", first, second),
        })
    }

    /// Message when the query returns no rows
    pub fn not_found(&self) -> String {
        match self {
            Self::Ceo { company } => {
                format!("No CEO found for {} in the graph.", capitalize(company))
            }
            Self::Interaction { first, second } => format!(
                "No interaction between {} and {} found in the graph.",
                capitalize(first),
                capitalize(second)
            ),
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// First template matching the question
///
/// `companies` and `pairs` are the lower-cased entity tables shared with the
/// normalizer.
pub fn match_template(
    question: &str,
    companies: &[String],
    pairs: &[(String, String)],
) -> Option<GraphQuery> {
    let text = question.trim().to_lowercase();

    if text.contains("ceo") {
        if let Some(company) = companies.iter().find(|c| text.contains(c.as_str())) {
            return Some(GraphQuery::Ceo {
                company: company.clone(),
            });
        }
    }

    if text.contains("interact") {
        if let Some((first, second)) = pairs
            .iter()
            .find(|(a, b)| text.contains(a.as_str()) && text.contains(b.as_str()))
        {
            return Some(GraphQuery::Interaction {
                first: first.clone(),
                second: second.clone(),
            });
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

impl CommitResponse {
    fn into_first_row(self) -> Result<Option<Vec<Value>>> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(Error::GraphBackend(format!("{}: {}", error.code, error.message)));
        }
        Ok(self
            .results
            .into_iter()
            .next()
            .and_then(|r| r.data.into_iter().next())
            .map(|d| d.row))
    }
}

/// Answers templated questions from a Neo4j database
#[derive(Debug, Clone)]
pub struct GraphStrategy {
    http_client: HttpClient,
    base_url: String,
    database: String,
    user: String,
    password: Option<String>,
    companies: Vec<String>,
    pairs: Vec<(String, String)>,
}

impl GraphStrategy {
    pub fn new(
        config: &GraphConfig,
        password: Option<String>,
        normalizer: &NormalizerConfig,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: config.uri.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            user: config.user.clone(),
            password,
            companies: normalizer
                .companies
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
            pairs: normalizer
                .interaction_pairs
                .iter()
                .map(|(a, b)| (a.trim().to_lowercase(), b.trim().to_lowercase()))
                .collect(),
        })
    }

    /// Build from configuration, reading the password from `NEO4J_PASSWORD`
    pub fn from_config(config: &GraphConfig, normalizer: &NormalizerConfig) -> Result<Self> {
        let password = config
            .resolved_password()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        Self::new(config, password, normalizer)
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    fn source(&self) -> String {
        format!("Neo4j ({})", self.base_url)
    }

    /// First row of one Cypher statement
    async fn first_row(&self, statement: &str, parameters: Value) -> Result<Option<Vec<Value>>> {
        let body = json!({
            "statements": [{
                "statement": statement,
                "parameters": parameters,
            }]
        });

        let mut request = self.http_client.post(self.commit_url()).json(&body);
        if let Some(password) = &self.password {
            request = request.basic_auth(&self.user, Some(password));
        }

        let response = request.send().await.map_err(Error::NetworkError)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GraphBackend(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| Error::GraphBackend(format!("Failed to parse response: {}", e)))?;
        commit.into_first_row()
    }

    async fn run(&self, query: &GraphQuery) -> Result<Option<Vec<Value>>> {
        debug!(template = query.name(), url = %self.commit_url(), "Sending graph query");
        self.first_row(query.cypher(), query.parameters()).await
    }

    /// Total number of nodes; doubles as a connectivity check
    pub async fn node_count(&self) -> Result<u64> {
        let row = self.first_row(NODE_COUNT_CYPHER, json!({})).await?;
        row.as_deref()
            .and_then(<[Value]>::first)
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::GraphBackend("node count query returned no count".to_string()))
    }

    pub fn uri(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Strategy for GraphStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Graph
    }

    async fn attempt(&self, question: &str) -> Result<AttemptResult> {
        let started = Instant::now();

        let Some(query) = match_template(question, &self.companies, &self.pairs) else {
            return Ok(AttemptResult::empty());
        };

        let sources = vec![self.source()];
        let result = match self.run(&query).await? {
            Some(row) => match query.answer(&row) {
                Some(answer) => AttemptResult::answered(answer, sources),
                None => AttemptResult::partial(query.not_found(), sources),
            },
            None => AttemptResult::partial(query.not_found(), sources),
        };

        Ok(result.with_latency(started.elapsed().as_millis() as u64))
    }
}
