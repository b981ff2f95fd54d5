//! Types shared by the planner, the bandit and the router
//!
//! This module defines the fixed strategy set, the ordered plans built from it
//! and the records produced while a question is routed.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One answer-producing strategy (a bandit arm)
///
/// Declaration order is the deterministic tie-break order for exploitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Human-number arithmetic evaluation
    Arithmetic,
    /// Graph database lookup
    Graph,
    /// Lexical-similarity retrieval
    Lexical,
}

impl StrategyKind {
    /// Every arm, in tie-break order
    pub const ALL: [StrategyKind; 3] = [Self::Arithmetic, Self::Graph, Self::Lexical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arithmetic => "arithmetic",
            Self::Graph => "graph",
            Self::Lexical => "lexical",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `math` and `vector` are the names older route logs used
        match s.trim().to_lowercase().as_str() {
            "arithmetic" | "math" => Ok(Self::Arithmetic),
            "graph" => Ok(Self::Graph),
            "lexical" | "vector" => Ok(Self::Lexical),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Ordered, duplicate-free list of strategies to try for one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan(Vec<StrategyKind>);

impl Plan {
    /// Build a plan, dropping repeated strategies while keeping first occurrence
    pub fn new(kinds: impl IntoIterator<Item = StrategyKind>) -> Self {
        let mut steps = Vec::with_capacity(StrategyKind::ALL.len());
        for kind in kinds {
            if !steps.contains(&kind) {
                steps.push(kind);
            }
        }
        Self(steps)
    }

    /// Single-strategy plan used by manual mode
    pub fn single(kind: StrategyKind) -> Self {
        Self(vec![kind])
    }

    pub fn steps(&self) -> &[StrategyKind] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<StrategyKind> {
        self.0.first().copied()
    }

    pub fn contains(&self, kind: StrategyKind) -> bool {
        self.0.contains(&kind)
    }

    /// Move `kind` to the front, keeping the relative order of the rest
    ///
    /// A strategy that is not part of the plan leaves it unchanged.
    pub fn promote(&self, kind: StrategyKind) -> Self {
        if !self.contains(kind) {
            return self.clone();
        }
        let mut steps = Vec::with_capacity(self.0.len());
        steps.push(kind);
        steps.extend(self.0.iter().copied().filter(|k| *k != kind));
        Self(steps)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(StrategyKind::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// How the caller wants a question routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Plan, let the bandit pick the first strategy, fall through the rest
    #[default]
    Auto,
    /// Run exactly the named strategy
    Manual(StrategyKind),
}

impl std::str::FromStr for RouteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse().map(Self::Manual)
    }
}

impl std::fmt::Display for RouteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual(kind) => write!(f, "{} (manual)", kind),
        }
    }
}

/// How the first strategy of an auto plan was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Random arm drawn with probability epsilon
    Explore,
    /// Arm with the highest running value
    Exploit,
    /// Plan used as produced by the planner (single candidate or manual mode)
    Planner,
    /// Pure arithmetic answered before planning
    FastPath,
}

/// One strategy invocation within a routed question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub strategy: StrategyKind,
    pub succeeded: bool,
    pub answer: Option<String>,
    pub latency_ms: u64,
    /// Backend fault message when the attempt errored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// What `Router::route` hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Correlates log lines for one routed question
    pub route_id: uuid::Uuid,
    pub answer: String,
    pub decision: StrategyKind,
    pub sources: Vec<String>,
    pub latency_ms: u64,
    pub had_answer: bool,
    pub normalized: String,
    pub plan: Plan,
    pub selection: Selection,
    pub attempts: Vec<AttemptOutcome>,
}
