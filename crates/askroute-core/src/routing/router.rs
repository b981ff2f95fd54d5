//! Question Router - plans, explores, executes and learns
//!
//! One call to [`Router::route`] takes a question through the whole loop:
//! normalization, the arithmetic fast path, planning, bandit selection,
//! sequential execution, combining partial answers, and finally recording
//! the outcome and updating the policy.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bandit::{DEFAULT_EPSILON, EpsilonGreedyBandit, PolicyState, reward};
use super::combiner::combine;
use super::executor::Executor;
use super::normalizer::{Normalizer, Question};
use super::planner::TaskPlanner;
use super::recorder::{CsvRouteLog, MemoryRouteLog, OutcomeRecorder, RouteLog};
use super::store::{JsonPolicyStore, MemoryPolicyStore, PolicyStore};
use super::types::{AttemptOutcome, Plan, RouteMode, RouteResponse, Selection, StrategyKind};
use crate::config::Config;
use crate::error::Result;
use crate::strategies::{StrategySet, format_answer, pure_expression_value};

/// Rebuild the policy from the route log and save it
///
/// Epsilon is kept from the saved policy when there is one.
pub fn warm_start_policy(
    store: &dyn PolicyStore,
    log: &dyn RouteLog,
    default_epsilon: f64,
) -> Result<PolicyState> {
    let epsilon = store
        .load()?
        .map(|s| s.epsilon)
        .unwrap_or(default_epsilon);
    let entries = log.entries()?;
    let bandit = EpsilonGreedyBandit::warm_start(epsilon, &entries);
    store.save(bandit.state())?;
    info!(replayed = entries.len(), "Rebuilt policy from route log");
    Ok(bandit.state().clone())
}

/// Final answer before it is recorded
struct Settled {
    answer: String,
    decision: StrategyKind,
    sources: Vec<String>,
    had_answer: bool,
    plan: Plan,
    selection: Selection,
    attempts: Vec<AttemptOutcome>,
}

/// Routes questions to answer strategies and learns from the outcomes
pub struct Router {
    normalizer: Normalizer,
    planner: TaskPlanner,
    strategies: StrategySet,
    bandit: Arc<RwLock<EpsilonGreedyBandit>>,
    policy_store: Arc<dyn PolicyStore>,
    recorder: OutcomeRecorder,
    fast_path: bool,
}

impl Router {
    /// Start building a router
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// File-backed router described by the configuration, warm-started
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let strategies = StrategySet::from_config(config)?;
        let router = RouterBuilder::new()
            .normalizer(Normalizer::new(&config.normalizer))
            .planner(TaskPlanner::new(config.router.planner))
            .strategies(strategies)
            .epsilon(config.router.epsilon)
            .fast_path(config.router.fast_path)
            .policy_store(Arc::new(JsonPolicyStore::new(config.policy_path()?)))
            .route_log(Arc::new(CsvRouteLog::new(config.route_log_path()?)))
            .bootstrap()
            .await;
        Ok(router)
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn planner(&self) -> &TaskPlanner {
        &self.planner
    }

    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    /// Snapshot of the learned policy
    pub async fn policy_state(&self) -> PolicyState {
        self.bandit.read().await.state().clone()
    }

    /// Replace the learned state with a replay of the route log
    pub async fn warm_start(&self) -> Result<PolicyState> {
        let entries = self.recorder.log().entries()?;
        let mut bandit = self.bandit.write().await;
        let rebuilt = EpsilonGreedyBandit::warm_start(bandit.epsilon(), &entries);
        let state = rebuilt.state().clone();
        *bandit = rebuilt;
        self.policy_store.save(&state)?;
        info!(replayed = entries.len(), "Warm-started policy");
        Ok(state)
    }

    /// Route one question
    ///
    /// Never fails: backend faults fall through to the next strategy, and
    /// recording or persistence failures are logged.
    ///
    /// When nothing answers, the decision credited with the failure is the
    /// first strategy actually attempted, so an arm promoted by the bandit
    /// is the one penalized. A plan that attempted nothing falls back to its
    /// first member.
    pub async fn route(&self, question: &Question, mode: RouteMode) -> RouteResponse {
        let route_id = Uuid::new_v4();
        let started = Instant::now();

        let normalized = self.normalizer.normalize(question.as_str());
        debug!(
            route_id = %route_id,
            normalized = %normalized.text,
            rules = ?normalized.applied,
            "Normalized question"
        );

        let settled = match self.fast_path_answer(&normalized.text, mode) {
            Some(settled) => settled,
            None => self.plan_and_execute(route_id, &normalized.text, mode).await,
        };

        self.finish(route_id, question, normalized.text, started, settled)
            .await
    }

    fn fast_path_answer(&self, normalized: &str, mode: RouteMode) -> Option<Settled> {
        if !self.fast_path || mode != RouteMode::Auto {
            return None;
        }
        let value = pure_expression_value(normalized)?;
        let answer = format_answer(value);

        Some(Settled {
            attempts: vec![AttemptOutcome {
                strategy: StrategyKind::Arithmetic,
                succeeded: true,
                answer: Some(answer.clone()),
                latency_ms: 0,
                fault: None,
            }],
            answer,
            decision: StrategyKind::Arithmetic,
            sources: Vec::new(),
            had_answer: true,
            plan: Plan::single(StrategyKind::Arithmetic),
            selection: Selection::FastPath,
        })
    }

    async fn plan_and_execute(&self, route_id: Uuid, normalized: &str, mode: RouteMode) -> Settled {
        let (plan, selection) = match mode {
            RouteMode::Manual(kind) => (Plan::single(kind), Selection::Planner),
            RouteMode::Auto => {
                let planned = self.planner.plan(normalized);
                if planned.len() > 1 {
                    let (arm, selection) = self.bandit.write().await.select_with_reason();
                    (planned.promote(arm), selection)
                } else {
                    (planned, Selection::Planner)
                }
            }
        };
        debug!(route_id = %route_id, plan = %plan, selection = ?selection, "Planned route");

        let report = Executor::run(&plan, normalized, &self.strategies).await;

        if let (Some(decision), Some(answer)) = (report.decision, report.answer.clone()) {
            return Settled {
                answer,
                decision,
                sources: report.sources,
                had_answer: true,
                plan,
                selection,
                attempts: report.attempts,
            };
        }

        let combined = combine(
            report.graph_partial.as_ref().map(|p| p.answer.as_str()),
            report.lexical_partial.as_ref().map(|p| p.answer.as_str()),
        );

        let mut sources: Vec<String> = Vec::new();
        for partial in [&report.graph_partial, &report.lexical_partial]
            .into_iter()
            .flatten()
        {
            for source in &partial.sources {
                if !sources.contains(source) {
                    sources.push(source.clone());
                }
            }
        }

        let decision = report
            .first_attempted()
            .or_else(|| plan.first())
            .unwrap_or(StrategyKind::Lexical);

        Settled {
            answer: combined.answer,
            decision,
            sources,
            had_answer: combined.had_answer,
            plan,
            selection,
            attempts: report.attempts,
        }
    }

    async fn finish(
        &self,
        route_id: Uuid,
        question: &Question,
        normalized: String,
        started: Instant,
        settled: Settled,
    ) -> RouteResponse {
        let latency_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = self.recorder.record(
            question.as_str(),
            &normalized,
            settled.decision,
            settled.had_answer,
            latency_ms,
        ) {
            warn!(route_id = %route_id, error = %e, "Failed to record route outcome");
        }

        let reward = reward(settled.had_answer, latency_ms);
        {
            let mut bandit = self.bandit.write().await;
            bandit.update_arm(settled.decision, reward);
            if let Err(e) = self.policy_store.save(bandit.state()) {
                warn!(route_id = %route_id, error = %e, "Failed to save policy");
            }
        }

        info!(
            route_id = %route_id,
            decision = %settled.decision,
            had_answer = settled.had_answer,
            latency_ms,
            reward,
            "Routed question"
        );

        RouteResponse {
            route_id,
            answer: settled.answer,
            decision: settled.decision,
            sources: settled.sources,
            latency_ms,
            had_answer: settled.had_answer,
            normalized,
            plan: settled.plan,
            selection: settled.selection,
            attempts: settled.attempts,
        }
    }
}

/// Builder for Router
pub struct RouterBuilder {
    normalizer: Option<Normalizer>,
    planner: TaskPlanner,
    strategies: StrategySet,
    policy_store: Option<Arc<dyn PolicyStore>>,
    route_log: Option<Arc<dyn RouteLog>>,
    epsilon: f64,
    seed: Option<u64>,
    fast_path: bool,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            normalizer: None,
            planner: TaskPlanner::default(),
            strategies: StrategySet::new(),
            policy_store: None,
            route_log: None,
            epsilon: DEFAULT_EPSILON,
            seed: None,
            fast_path: true,
        }
    }

    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn planner(mut self, planner: TaskPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = strategies;
        self
    }

    /// Exploration rate used when the store holds no policy yet
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Fixed random seed for reproducible selection
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn fast_path(mut self, enabled: bool) -> Self {
        self.fast_path = enabled;
        self
    }

    /// Defaults to an in-memory store
    pub fn policy_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.policy_store = Some(store);
        self
    }

    /// Defaults to an in-memory log
    pub fn route_log(mut self, log: Arc<dyn RouteLog>) -> Self {
        self.route_log = Some(log);
        self
    }

    fn assemble(
        self,
        bandit: EpsilonGreedyBandit,
        store: Arc<dyn PolicyStore>,
        log: Arc<dyn RouteLog>,
    ) -> Router {
        let bandit = match self.seed {
            Some(seed) => bandit.reseed(seed),
            None => bandit,
        };
        Router {
            normalizer: self.normalizer.unwrap_or_default(),
            planner: self.planner,
            strategies: self.strategies,
            bandit: Arc::new(RwLock::new(bandit)),
            policy_store: store,
            recorder: OutcomeRecorder::new(log),
            fast_path: self.fast_path,
        }
    }

    fn stores(&self) -> (Arc<dyn PolicyStore>, Arc<dyn RouteLog>) {
        let store: Arc<dyn PolicyStore> = match &self.policy_store {
            Some(store) => store.clone(),
            None => Arc::new(MemoryPolicyStore::new()),
        };
        let log: Arc<dyn RouteLog> = match &self.route_log {
            Some(log) => log.clone(),
            None => Arc::new(MemoryRouteLog::new()),
        };
        (store, log)
    }

    /// Build with a fresh policy, ignoring anything persisted
    pub fn build(self) -> Router {
        let (store, log) = self.stores();
        let bandit = EpsilonGreedyBandit::new(self.epsilon);
        self.assemble(bandit, store, log)
    }

    /// Build, restoring the policy from the store and the route log
    ///
    /// Epsilon comes from the saved policy when there is one. A non-empty
    /// route log is replayed from the default arm table; otherwise saved
    /// counts and values are used as they are. Unreadable state is logged
    /// and replaced by defaults. The resulting policy is saved once.
    pub async fn bootstrap(self) -> Router {
        let (store, log) = self.stores();

        let persisted = match store.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable policy; starting from defaults");
                None
            }
        };
        let epsilon = persisted.as_ref().map(|s| s.epsilon).unwrap_or(self.epsilon);

        let entries = match log.entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not read route log for warm start");
                Vec::new()
            }
        };

        let bandit = if !entries.is_empty() {
            EpsilonGreedyBandit::warm_start(epsilon, &entries)
        } else if let Some(state) = persisted {
            EpsilonGreedyBandit::from_state(state)
        } else {
            EpsilonGreedyBandit::new(epsilon)
        };

        if let Err(e) = store.save(bandit.state()) {
            warn!(error = %e, "Failed to save bootstrapped policy");
        }
        info!(
            epsilon = bandit.epsilon(),
            replayed = entries.len(),
            "Router bootstrapped"
        );

        self.assemble(bandit, store, log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::ArithmeticStrategy;

    fn question(text: &str) -> Question {
        Question::compose(Some(text), None).unwrap()
    }

    #[tokio::test]
    async fn test_fast_path_answers_pure_arithmetic() {
        let log = Arc::new(MemoryRouteLog::new());
        let router = Router::builder()
            .seed(1)
            .route_log(log.clone())
            .build();

        let response = router.route(&question("97B + 20%"), RouteMode::Auto).await;

        assert_eq!(response.answer, "116400000000 (116.4B)");
        assert_eq!(response.decision, StrategyKind::Arithmetic);
        assert_eq!(response.selection, Selection::FastPath);
        assert!(response.had_answer);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_mode_skips_fast_path() {
        let router = Router::builder()
            .seed(1)
            .strategies(StrategySet::new().with(Arc::new(ArithmeticStrategy::new())))
            .build();

        let response = router
            .route(&question("97B + 20%"), RouteMode::Manual(StrategyKind::Lexical))
            .await;

        // No lexical backend registered: nothing attempted, sentinel answer
        assert_eq!(response.decision, StrategyKind::Lexical);
        assert!(!response.had_answer);
        assert!(response.attempts.is_empty());
        assert_eq!(response.plan, Plan::single(StrategyKind::Lexical));
    }

    #[tokio::test]
    async fn test_route_updates_policy() {
        let store = Arc::new(MemoryPolicyStore::new());
        let router = Router::builder()
            .seed(3)
            .policy_store(store.clone())
            .build();

        router.route(&question("12M + 3.5B"), RouteMode::Auto).await;

        let state = router.policy_state().await;
        assert_eq!(state.count(StrategyKind::Arithmetic), 2);
        assert!(state.value(StrategyKind::Arithmetic) > 0.0);
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_bootstrap_replaces_malformed_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("router_bandit.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let router = Router::builder()
            .epsilon(0.3)
            .policy_store(Arc::new(JsonPolicyStore::new(&path)))
            .bootstrap()
            .await;

        assert_eq!(router.policy_state().await, PolicyState::with_epsilon(0.3));
        let rewritten: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["epsilon"], 0.3);
        assert_eq!(
            JsonPolicyStore::new(&path).load().unwrap(),
            Some(PolicyState::with_epsilon(0.3))
        );
    }

    #[tokio::test]
    async fn test_bootstrap_rebuilds_from_log_over_saved_state() {
        let store = Arc::new(MemoryPolicyStore::new());
        let log = Arc::new(MemoryRouteLog::new());
        let first = Router::builder()
            .policy_store(store.clone())
            .route_log(log.clone())
            .build();
        for text in ["1 + 1", "2 + 2", "3 + 3"] {
            first.route(&question(text), RouteMode::Auto).await;
        }
        drop(first);

        // Overwriting the saved policy does not survive a restart
        store.save(&PolicyState::default()).unwrap();

        let second = Router::builder()
            .policy_store(store.clone())
            .route_log(log)
            .bootstrap()
            .await;
        assert_eq!(
            second.policy_state().await.count(StrategyKind::Arithmetic),
            4
        );
        assert_eq!(store.load().unwrap(), Some(second.policy_state().await));
    }

    #[tokio::test]
    async fn test_bootstrap_prefers_persisted_epsilon() {
        let store = Arc::new(MemoryPolicyStore::with_state(PolicyState::with_epsilon(0.05)));
        let router = Router::builder()
            .epsilon(0.5)
            .policy_store(store)
            .bootstrap()
            .await;
        assert_eq!(router.policy_state().await.epsilon, 0.05);
    }

    #[tokio::test]
    async fn test_bootstrap_without_log_keeps_saved_estimates() {
        let mut saved = PolicyState::with_epsilon(0.1);
        saved.counts.insert(StrategyKind::Graph, 12);
        saved.values.insert(StrategyKind::Graph, 0.5);
        let store = Arc::new(MemoryPolicyStore::with_state(saved.clone()));

        let router = Router::builder().policy_store(store).bootstrap().await;
        assert_eq!(router.policy_state().await, saved);
    }
}
