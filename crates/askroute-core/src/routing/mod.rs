//! Question routing with a learned first choice
//!
//! The key components are:
//!
//! - **Normalizer**: rewrites a raw question into a canonical form (case,
//!   whitespace, known company and drug names, shorthand like "Tesla 2024").
//!
//! - **Task Planner**: ordered keyword rules that turn the normalized text
//!   into a plan, an ordered list of strategies to try.
//!
//! - **Epsilon-Greedy Bandit**: one arm per strategy. With probability
//!   epsilon a random arm is explored, otherwise the arm with the highest
//!   running mean reward is exploited. The chosen arm is promoted to the
//!   front of the plan.
//!
//! - **Executor and Combiner**: strategies run one after another until one
//!   answers; if none does, partial graph and lexical text is merged.
//!
//! - **Recorder and Policy Store**: every routed question is appended to a
//!   CSV route log and the arm table is saved as JSON, so learning carries
//!   across runs.
//!
//! ## How It Works
//!
//! 1. The question is normalized
//! 2. Pure arithmetic is answered immediately (auto mode only)
//! 3. The planner produces a plan and the bandit picks which strategy leads
//! 4. The executor runs the plan, stopping at the first real answer
//! 5. The outcome is logged and the chosen arm is rewarded
//!
//! ## Example
//!
//! ```rust,ignore
//! use askroute_core::routing::{Question, RouteMode, Router};
//!
//! let router = Router::from_config(&config).await?;
//! let question = Question::compose(Some("Who is the CEO of Tesla?"), None)?;
//! let response = router.route(&question, RouteMode::Auto).await;
//! println!("{} [{}]", response.answer, response.decision);
//! ```

mod bandit;
mod combiner;
mod executor;
mod normalizer;
mod planner;
mod recorder;
mod router;
mod stats;
mod store;
mod types;

pub use bandit::{DEFAULT_EPSILON, EpsilonGreedyBandit, PolicyState, reward};
pub use combiner::{ADDITIONAL_CONTEXT_LABEL, Combined, NO_ANSWER, combine};
pub use executor::{ExecutionReport, Executor, Partial};
pub use normalizer::{NormalizedQuestion, Normalizer, Question};
pub use planner::{PlanRule, PlannerProfile, TaskPlanner, has_arithmetic_hint, has_operator_hint};
pub use recorder::{
    CsvRouteLog, MemoryRouteLog, OutcomeRecorder, ROUTE_LOG_HEADER, RouteLog, RouteLogEntry,
};
pub use router::{Router, RouterBuilder, warm_start_policy};
pub use stats::{DecisionStats, NEUTRAL_SUCCESS_RATE, RouteStats};
pub use store::{JsonPolicyStore, MemoryPolicyStore, PolicyStore};
pub use types::{AttemptOutcome, Plan, RouteMode, RouteResponse, Selection, StrategyKind};
