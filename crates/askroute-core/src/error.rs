//! Error types for Askroute

use thiserror::Error;

/// Result type alias using Askroute's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Askroute error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E001-E099)
    #[error("Empty question: type a question or provide extracted image text.")]
    EmptyQuestion,

    #[error("Unknown strategy '{0}'. Expected one of: arithmetic, graph, lexical.")]
    UnknownStrategy(String),

    // Arithmetic errors (E100-E199)
    #[error("Could not parse arithmetic expression: {0}")]
    ArithmeticParse(String),

    #[error("Arithmetic evaluation failed: {0}")]
    ArithmeticEval(String),

    // Backend errors (E200-E299)
    #[error("Graph backend error: {0}")]
    GraphBackend(String),

    #[error("Network error: {0}. Check that the graph database is reachable.")]
    NetworkError(#[from] reqwest::Error),

    #[error("Lexical corpus error: {0}")]
    CorpusError(String),

    // Persistence errors (E300-E399)
    #[error("Policy store error: {0}")]
    PolicyStore(String),

    #[error("Route log error: {0}")]
    RouteLog(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "E001",
            Self::UnknownStrategy(_) => "E002",
            Self::ArithmeticParse(_) => "E100",
            Self::ArithmeticEval(_) => "E101",
            Self::GraphBackend(_) => "E200",
            Self::NetworkError(_) => "E201",
            Self::CorpusError(_) => "E202",
            Self::PolicyStore(_) => "E300",
            Self::RouteLog(_) => "E301",
            Self::Csv(_) => "E302",
            Self::Json(_) => "E303",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::EmptyQuestion => Some("askroute ask \"<question>\"".to_string()),
            Self::UnknownStrategy(_) => Some("askroute ask --mode auto".to_string()),
            Self::NetworkError(_) | Self::GraphBackend(_) => {
                Some("askroute config get graph.uri".to_string())
            }
            Self::CorpusError(_) => Some("askroute ingest --raw-dir <DIR>".to_string()),
            Self::PolicyStore(_) => Some("askroute policy warm-start".to_string()),
            Self::ConfigError(_) => Some("askroute config show".to_string()),
            _ => None,
        }
    }

    /// Whether the error came from an answer backend rather than the router itself
    pub fn is_backend_fault(&self) -> bool {
        matches!(
            self,
            Self::ArithmeticParse(_)
                | Self::ArithmeticEval(_)
                | Self::GraphBackend(_)
                | Self::NetworkError(_)
                | Self::CorpusError(_)
        )
    }
}
