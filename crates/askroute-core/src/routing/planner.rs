//! Task planner: which strategies to try, and in what order
//!
//! Planning is a pure function of the normalized question. The rule table is
//! evaluated top-to-bottom and the first matching rule decides the plan.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::StrategyKind::{Arithmetic, Graph, Lexical};
use super::types::{Plan, StrategyKind};

static MAGNITUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d ?[kmbt]\b").expect("magnitude pattern is valid"));

static OPERATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d[\d.,\s]*[kmbtKMBT]?(\s*[+\-*/×÷]\s*\d|\s*%)").expect("operator pattern is valid")
});

const FACT_KEYWORDS: &[&str] = &["ceo", "who is", "side effect", "interact", "revenue", "earnings"];
const RESTRICTED_FACT_KEYWORDS: &[&str] = &["ceo", "who is", "side effect", "interact", "revenue"];

/// Which rule table the planner uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerProfile {
    /// Every plan lists all three strategies
    #[default]
    Standard,
    /// Shorter plans; unmatched questions only try lexical retrieval
    Restricted,
}

impl std::str::FromStr for PlannerProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "restricted" => Ok(Self::Restricted),
            _ => Err(format!("Unknown planner profile: {}", s)),
        }
    }
}

impl std::fmt::Display for PlannerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Restricted => write!(f, "restricted"),
        }
    }
}

/// One planning rule: a predicate over the lower-cased question and the plan it yields
#[derive(Clone, Copy)]
pub struct PlanRule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub plan: &'static [StrategyKind],
}

impl std::fmt::Debug for PlanRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRule")
            .field("name", &self.name)
            .field("plan", &self.plan)
            .finish()
    }
}

/// A digit together with `%`, or a magnitude letter after a digit (one space allowed)
pub fn has_arithmetic_hint(text: &str) -> bool {
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    has_digit && (text.contains('%') || MAGNITUDE_RE.is_match(text))
}

/// An arithmetic operator or percent following a number
pub fn has_operator_hint(text: &str) -> bool {
    OPERATOR_RE.is_match(text)
}

fn has_fact_keyword(text: &str) -> bool {
    FACT_KEYWORDS.iter().any(|k| text.contains(k))
}

fn has_restricted_fact_keyword(text: &str) -> bool {
    RESTRICTED_FACT_KEYWORDS.iter().any(|k| text.contains(k))
}

const STANDARD_RULES: &[PlanRule] = &[
    PlanRule {
        name: "arithmetic_first",
        matches: has_arithmetic_hint,
        plan: &[Arithmetic, Graph, Lexical],
    },
    PlanRule {
        name: "fact_first",
        matches: has_fact_keyword,
        plan: &[Graph, Lexical, Arithmetic],
    },
    PlanRule {
        name: "lexical_first",
        matches: |_| true,
        plan: &[Lexical, Graph, Arithmetic],
    },
];

const RESTRICTED_RULES: &[PlanRule] = &[
    PlanRule {
        name: "arithmetic_first",
        matches: has_operator_hint,
        plan: &[Arithmetic, Graph, Lexical],
    },
    PlanRule {
        name: "fact_first",
        matches: has_restricted_fact_keyword,
        plan: &[Graph, Lexical],
    },
    PlanRule {
        name: "lexical_only",
        matches: |_| true,
        plan: &[Lexical],
    },
];

/// Deterministic, rule-table driven planner
#[derive(Debug, Clone, Copy)]
pub struct TaskPlanner {
    profile: PlannerProfile,
    rules: &'static [PlanRule],
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self::new(PlannerProfile::Standard)
    }
}

impl TaskPlanner {
    pub fn new(profile: PlannerProfile) -> Self {
        let rules = match profile {
            PlannerProfile::Standard => STANDARD_RULES,
            PlannerProfile::Restricted => RESTRICTED_RULES,
        };
        Self { profile, rules }
    }

    pub fn profile(&self) -> PlannerProfile {
        self.profile
    }

    pub fn rules(&self) -> &'static [PlanRule] {
        self.rules
    }

    /// The first rule matching the question
    pub fn matched_rule(&self, question: &str) -> &'static PlanRule {
        let lowered = question.to_lowercase();
        let rules: &'static [PlanRule] = self.rules;
        rules
            .iter()
            .find(|rule| (rule.matches)(&lowered))
            // Both tables end with a catch-all rule
            .unwrap_or(&rules[rules.len() - 1])
    }

    pub fn plan(&self, question: &str) -> Plan {
        Plan::new(self.matched_rule(question).plan.iter().copied())
    }
}
