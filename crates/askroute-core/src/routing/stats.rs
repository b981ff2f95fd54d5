//! Summary statistics over the route log

use std::collections::BTreeMap;

use serde::Serialize;

use super::recorder::RouteLogEntry;
use super::types::StrategyKind;

/// Success rate reported for a strategy with no logged outcomes
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Aggregates for one decision
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionStats {
    pub queries: u64,
    pub answered: u64,
    pub total_latency_ms: u64,
}

impl DecisionStats {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.queries == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.queries as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.queries == 0 {
            return NEUTRAL_SUCCESS_RATE;
        }
        self.answered as f64 / self.queries as f64
    }
}

/// Summary of routed questions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteStats {
    pub total_queries: u64,
    pub answered: u64,
    pub total_latency_ms: u64,
    pub by_decision: BTreeMap<StrategyKind, DecisionStats>,
}

impl RouteStats {
    /// Aggregate entries, optionally keeping only one decision
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a RouteLogEntry>,
        decision: Option<StrategyKind>,
    ) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            if decision.is_some_and(|d| d != entry.decision) {
                continue;
            }
            stats.total_queries += 1;
            stats.total_latency_ms += entry.latency_ms;
            if entry.had_answer {
                stats.answered += 1;
            }

            let per = stats.by_decision.entry(entry.decision).or_default();
            per.queries += 1;
            per.total_latency_ms += entry.latency_ms;
            if entry.had_answer {
                per.answered += 1;
            }
        }
        stats
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.total_queries as f64
    }

    /// Overall share of answered questions; 0.0 with no data
    pub fn answer_rate(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }
        self.answered as f64 / self.total_queries as f64
    }

    pub fn decision(&self, kind: StrategyKind) -> Option<&DecisionStats> {
        self.by_decision.get(&kind)
    }

    /// Share of answered questions for one strategy, neutral without data
    pub fn success_rate(&self, kind: StrategyKind) -> f64 {
        self.decision(kind)
            .map(DecisionStats::success_rate)
            .unwrap_or(NEUTRAL_SUCCESS_RATE)
    }

    /// Order in which to consult the two fact backends
    ///
    /// Graph goes first unless lexical retrieval has the strictly better record.
    pub fn preferred_fact_order(&self) -> [StrategyKind; 2] {
        if self.success_rate(StrategyKind::Graph) >= self.success_rate(StrategyKind::Lexical) {
            [StrategyKind::Graph, StrategyKind::Lexical]
        } else {
            [StrategyKind::Lexical, StrategyKind::Graph]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(decision: StrategyKind, had_answer: bool, latency_ms: u64) -> RouteLogEntry {
        RouteLogEntry::new("q", "q", decision, had_answer, latency_ms)
    }

    #[test]
    fn test_empty_stats() {
        let stats = RouteStats::from_entries(&Vec::<RouteLogEntry>::new(), None);
        assert_eq!(stats.total_queries, 0);
        assert_eq!(stats.avg_latency_ms(), 0.0);
        assert_eq!(stats.success_rate(StrategyKind::Graph), NEUTRAL_SUCCESS_RATE);
        assert_eq!(
            stats.preferred_fact_order(),
            [StrategyKind::Graph, StrategyKind::Lexical]
        );
    }

    #[test]
    fn test_aggregates_per_decision() {
        let entries = vec![
            entry(StrategyKind::Graph, true, 30),
            entry(StrategyKind::Graph, false, 90),
            entry(StrategyKind::Lexical, true, 120),
            entry(StrategyKind::Arithmetic, true, 0),
        ];
        let stats = RouteStats::from_entries(&entries, None);

        assert_eq!(stats.total_queries, 4);
        assert_eq!(stats.answered, 3);
        assert_eq!(stats.avg_latency_ms(), 60.0);

        let graph = stats.decision(StrategyKind::Graph).unwrap();
        assert_eq!(graph.queries, 2);
        assert_eq!(graph.avg_latency_ms(), 60.0);
        assert_eq!(stats.success_rate(StrategyKind::Graph), 0.5);
        assert_eq!(stats.success_rate(StrategyKind::Lexical), 1.0);
    }

    #[test]
    fn test_decision_filter() {
        let entries = vec![
            entry(StrategyKind::Graph, true, 30),
            entry(StrategyKind::Lexical, true, 120),
        ];
        let stats = RouteStats::from_entries(&entries, Some(StrategyKind::Lexical));
        assert_eq!(stats.total_queries, 1);
        assert!(stats.decision(StrategyKind::Graph).is_none());
    }

    #[test]
    fn test_fact_order_follows_success_rate() {
        let entries = vec![
            entry(StrategyKind::Graph, false, 10),
            entry(StrategyKind::Graph, false, 10),
            entry(StrategyKind::Lexical, true, 10),
        ];
        let stats = RouteStats::from_entries(&entries, None);
        assert_eq!(
            stats.preferred_fact_order(),
            [StrategyKind::Lexical, StrategyKind::Graph]
        );

        // Equal records keep graph first
        let tied = vec![
            entry(StrategyKind::Graph, true, 10),
            entry(StrategyKind::Lexical, true, 10),
        ];
        assert_eq!(
            RouteStats::from_entries(&tied, None).preferred_fact_order(),
            [StrategyKind::Graph, StrategyKind::Lexical]
        );
    }
}
