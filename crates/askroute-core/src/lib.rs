//! Askroute Core Library
//!
//! This crate provides the core functionality for Askroute, including:
//! - Question normalization and keyword planning
//! - Epsilon-greedy selection of the first strategy to try
//! - Answer strategies (arithmetic, Neo4j graph, TF-IDF lexical retrieval)
//! - Combining partial answers
//! - CSV route log and JSON policy persistence

pub mod config;
pub mod error;
pub mod routing;
pub mod strategies;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::routing::{Question, RouteMode, RouteResponse, Router, StrategyKind};
}
