//! Runs a plan: one strategy at a time, stopping at the first real answer

use std::time::Instant;

use tracing::{debug, warn};

use super::types::{AttemptOutcome, Plan, StrategyKind};
use crate::strategies::StrategySet;

/// Text a strategy produced without answering
#[derive(Debug, Clone, PartialEq)]
pub struct Partial {
    pub answer: String,
    pub sources: Vec<String>,
}

/// What happened while running a plan
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Strategy that answered, if any
    pub decision: Option<StrategyKind>,
    pub answer: Option<String>,
    pub sources: Vec<String>,
    /// Attempts actually made, in order
    pub attempts: Vec<AttemptOutcome>,
    pub graph_partial: Option<Partial>,
    pub lexical_partial: Option<Partial>,
}

impl ExecutionReport {
    pub fn answered(&self) -> bool {
        self.decision.is_some()
    }

    /// First strategy that was actually invoked
    pub fn first_attempted(&self) -> Option<StrategyKind> {
        self.attempts.first().map(|a| a.strategy)
    }
}

/// Sequential plan runner
pub struct Executor;

impl Executor {
    /// Try each strategy of the plan in order
    ///
    /// Faults count as "no answer" and never stop the loop. Strategies with
    /// no registered backend are skipped without an attempt.
    pub async fn run(plan: &Plan, question: &str, strategies: &StrategySet) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for kind in plan.steps().iter().copied() {
            let Some(strategy) = strategies.get(kind) else {
                debug!(strategy = %kind, "No backend registered, skipping");
                continue;
            };

            let started = Instant::now();
            let outcome = strategy.attempt(question).await;
            let measured = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    let latency_ms = result.latency_ms.max(measured);
                    let succeeded = result.is_answer();
                    debug!(strategy = %kind, succeeded, latency_ms, "Strategy attempt finished");

                    report.attempts.push(AttemptOutcome {
                        strategy: kind,
                        succeeded,
                        answer: result.answer.clone(),
                        latency_ms,
                        fault: None,
                    });

                    if succeeded {
                        report.decision = Some(kind);
                        report.answer = result.answer;
                        report.sources = result.sources;
                        break;
                    }

                    if let Some(text) = result.non_blank_answer() {
                        let partial = Partial {
                            answer: text.to_string(),
                            sources: result.sources.clone(),
                        };
                        match kind {
                            StrategyKind::Graph => report.graph_partial = Some(partial),
                            StrategyKind::Lexical => report.lexical_partial = Some(partial),
                            // Arithmetic either answers or contributes nothing
                            StrategyKind::Arithmetic => {}
                        }
                    }
                }
                Err(e) => {
                    warn!(strategy = %kind, error = %e, code = e.code(), "Strategy fault");
                    report.attempts.push(AttemptOutcome {
                        strategy: kind,
                        succeeded: false,
                        answer: None,
                        latency_ms: measured,
                        fault: Some(e.to_string()),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::strategies::{AttemptResult, Strategy};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: StrategyKind,
        reply: fn() -> Result<AttemptResult>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(kind: StrategyKind, reply: fn() -> Result<AttemptResult>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn attempt(&self, _question: &str) -> Result<AttemptResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
    }

    fn plan_all() -> Plan {
        Plan::new([
            StrategyKind::Lexical,
            StrategyKind::Graph,
            StrategyKind::Arithmetic,
        ])
    }

    #[tokio::test]
    async fn test_stops_at_first_answer() {
        let lexical = Scripted::new(StrategyKind::Lexical, || {
            Ok(AttemptResult::answered("passage", vec!["Doc (doc.txt)".to_string()]))
        });
        let graph = Scripted::new(StrategyKind::Graph, || Ok(AttemptResult::empty()));
        let strategies = StrategySet::new().with(lexical.clone()).with(graph.clone());

        let report = Executor::run(&plan_all(), "q", &strategies).await;

        assert_eq!(report.decision, Some(StrategyKind::Lexical));
        assert_eq!(report.answer.as_deref(), Some("passage"));
        assert_eq!(report.sources, vec!["Doc (doc.txt)"]);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(graph.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fault_continues_loop() {
        let lexical = Scripted::new(StrategyKind::Lexical, || {
            Err(Error::CorpusError("missing".to_string()))
        });
        let graph = Scripted::new(StrategyKind::Graph, || {
            Ok(AttemptResult::answered("Elon Musk is the CEO of Tesla.", vec![]))
        });
        let strategies = StrategySet::new().with(lexical).with(graph);

        let report = Executor::run(&plan_all(), "tesla ceo", &strategies).await;

        assert_eq!(report.decision, Some(StrategyKind::Graph));
        assert_eq!(report.attempts.len(), 2);
        assert!(!report.attempts[0].succeeded);
        assert!(report.attempts[0].fault.as_deref().unwrap().contains("missing"));
        assert_eq!(report.first_attempted(), Some(StrategyKind::Lexical));
    }

    #[tokio::test]
    async fn test_collects_partials_and_skips_missing_backends() {
        let graph = Scripted::new(StrategyKind::Graph, || {
            Ok(AttemptResult::partial("No CEO found for Tesla in the graph.", vec![]))
        });
        let lexical = Scripted::new(StrategyKind::Lexical, || {
            Ok(AttemptResult::answered("   ", vec![]))
        });
        // No arithmetic backend registered
        let strategies = StrategySet::new().with(graph).with(lexical);

        let report = Executor::run(&plan_all(), "q", &strategies).await;

        assert!(!report.answered());
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(
            report.graph_partial.as_ref().map(|p| p.answer.as_str()),
            Some("No CEO found for Tesla in the graph.")
        );
        assert!(report.lexical_partial.is_none());
    }

    #[tokio::test]
    async fn test_arithmetic_partials_are_discarded() {
        let arithmetic = Scripted::new(StrategyKind::Arithmetic, || {
            Ok(AttemptResult::partial("maybe 42", vec![]))
        });
        let strategies = StrategySet::new().with(arithmetic);

        let report = Executor::run(&Plan::single(StrategyKind::Arithmetic), "q", &strategies).await;
        assert!(report.graph_partial.is_none() && report.lexical_partial.is_none());
        assert_eq!(report.attempts[0].answer.as_deref(), Some("maybe 42"));
    }
}
