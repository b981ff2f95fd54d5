//! Epsilon-greedy multi-armed bandit over the answer strategies
//!
//! Each strategy (arm) keeps a pull count and a running mean of the rewards
//! it earned. Selection explores a uniformly random arm with probability
//! epsilon and otherwise exploits the arm with the highest running value.
//!
//! ## Reward
//!
//! `reward = clamp(-1, 1, (1 if answered else 0) - 0.001 * latency_ms)`, so a
//! fast answer scores close to 1 and a slow or missing one scores at or
//! below 0.
//!
//! ## Warm start
//!
//! The learned state is defined by the route log: replaying every logged
//! outcome through [`EpsilonGreedyBandit::update_arm`] in file order yields
//! exactly the state an uninterrupted process would hold.

use std::collections::BTreeMap;

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::recorder::RouteLogEntry;
use super::types::{Selection, StrategyKind};

/// Exploration rate used when nothing else is configured
pub const DEFAULT_EPSILON: f64 = 0.2;

/// Latency penalty per millisecond
const LATENCY_PENALTY_PER_MS: f64 = 0.001;

/// Reward for one routed question
pub fn reward(had_answer: bool, latency_ms: u64) -> f64 {
    let base = if had_answer { 1.0 } else { 0.0 };
    (base - LATENCY_PENALTY_PER_MS * latency_ms as f64).clamp(-1.0, 1.0)
}

/// Learned per-arm estimates plus the exploration rate
///
/// Every arm always has an entry; counts start at 1 with a value of 0.0, which
/// acts as one implicit zero-reward sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    pub counts: BTreeMap<StrategyKind, u64>,
    pub values: BTreeMap<StrategyKind, f64>,
    pub epsilon: f64,
}

impl Default for PolicyState {
    fn default() -> Self {
        Self::with_epsilon(DEFAULT_EPSILON)
    }
}

impl PolicyState {
    /// Default arm table with the given exploration rate
    pub fn with_epsilon(epsilon: f64) -> Self {
        Self {
            counts: StrategyKind::ALL.iter().map(|k| (*k, 1)).collect(),
            values: StrategyKind::ALL.iter().map(|k| (*k, 0.0)).collect(),
            epsilon: epsilon.clamp(0.0, 1.0),
        }
    }

    pub fn count(&self, kind: StrategyKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(1)
    }

    pub fn value(&self, kind: StrategyKind) -> f64 {
        self.values.get(&kind).copied().unwrap_or(0.0)
    }

    /// Restore the invariants after loading from an untrusted source
    pub fn sanitized(mut self) -> Self {
        for kind in StrategyKind::ALL {
            let count = self.counts.entry(kind).or_insert(1);
            *count = (*count).max(1);
            let value = self.values.entry(kind).or_insert(0.0);
            if !value.is_finite() {
                *value = 0.0;
            }
            *value = value.clamp(-1.0, 1.0);
        }
        if !self.epsilon.is_finite() {
            self.epsilon = DEFAULT_EPSILON;
        }
        self.epsilon = self.epsilon.clamp(0.0, 1.0);
        self
    }
}

/// Epsilon-greedy bandit for strategy selection
#[derive(Debug)]
pub struct EpsilonGreedyBandit {
    state: PolicyState,
    rng: StdRng,
}

impl Default for EpsilonGreedyBandit {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON)
    }
}

impl EpsilonGreedyBandit {
    /// Create a bandit with the default arm table
    pub fn new(epsilon: f64) -> Self {
        Self::from_state(PolicyState::with_epsilon(epsilon))
    }

    /// Create a bandit with a fixed seed (for reproducibility in tests)
    pub fn with_seed(epsilon: f64, seed: u64) -> Self {
        Self {
            state: PolicyState::with_epsilon(epsilon),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Resume from previously learned state
    pub fn from_state(state: PolicyState) -> Self {
        Self {
            state: state.sanitized(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source, keeping the learned state
    pub fn reseed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn epsilon(&self) -> f64 {
        self.state.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.state.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn value(&self, kind: StrategyKind) -> f64 {
        self.state.value(kind)
    }

    pub fn count(&self, kind: StrategyKind) -> u64 {
        self.state.count(kind)
    }

    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    /// Arm with the highest value; ties go to the earliest declared arm
    pub fn best(&self) -> StrategyKind {
        let mut best = StrategyKind::ALL[0];
        let mut best_value = self.state.value(best);
        for kind in &StrategyKind::ALL[1..] {
            let value = self.state.value(*kind);
            if value > best_value {
                best = *kind;
                best_value = value;
            }
        }
        best
    }

    /// Pick an arm
    pub fn select(&mut self) -> StrategyKind {
        self.select_with_reason().0
    }

    /// Pick an arm and report whether it was exploration or exploitation
    pub fn select_with_reason(&mut self) -> (StrategyKind, Selection) {
        if self.state.epsilon > 0.0 && self.rng.gen_bool(self.state.epsilon) {
            let index = self.rng.gen_range(0..StrategyKind::ALL.len());
            return (StrategyKind::ALL[index], Selection::Explore);
        }
        (self.best(), Selection::Exploit)
    }

    /// Update by arm name; unknown names are ignored
    ///
    /// Returns whether an arm was updated.
    pub fn update(&mut self, arm: &str, reward: f64) -> bool {
        match arm.parse::<StrategyKind>() {
            Ok(kind) => {
                self.update_arm(kind, reward);
                true
            }
            Err(_) => {
                debug!(arm = %arm, "Ignoring reward for unknown arm");
                false
            }
        }
    }

    /// Incremental-mean update of one arm
    pub fn update_arm(&mut self, kind: StrategyKind, reward: f64) {
        if reward.is_nan() {
            debug!(strategy = %kind, "Ignoring NaN reward");
            return;
        }
        let reward = reward.clamp(-1.0, 1.0);

        let count = self.state.counts.entry(kind).or_insert(1);
        *count += 1;
        let n = *count as f64;

        let value = self.state.values.entry(kind).or_insert(0.0);
        *value += (reward - *value) / n;
    }

    /// Rebuild learned state by replaying logged outcomes in order
    pub fn warm_start<'a>(
        epsilon: f64,
        entries: impl IntoIterator<Item = &'a RouteLogEntry>,
    ) -> Self {
        let mut bandit = Self::new(epsilon);
        let mut replayed = 0usize;
        for entry in entries {
            bandit.update_arm(entry.decision, reward(entry.had_answer, entry.latency_ms));
            replayed += 1;
        }
        debug!(replayed, "Warm-started bandit from route log");
        bandit
    }
}
