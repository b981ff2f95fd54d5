//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::routing::PlannerProfile;

/// File name of the append-only route log, relative to the data directory
pub const ROUTE_LOG_FILE: &str = "logs/route_log.csv";

/// File name of the persisted bandit state, relative to the data directory
pub const POLICY_FILE: &str = "models/router_bandit.json";

/// Askroute configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub router: RouterSettings,
    pub normalizer: NormalizerConfig,
    pub lexical: LexicalConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Exploration rate used when no policy file exists yet
    pub epsilon: f64,
    pub planner: PlannerProfile,
    /// Overrides `$ASKROUTE_DATA_DIR` and the platform data directory
    pub data_dir: Option<PathBuf>,
    /// Answer pure arithmetic questions before planning
    pub fast_path: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            epsilon: 0.2,
            planner: PlannerProfile::Standard,
            data_dir: None,
            fast_path: true,
        }
    }
}

/// Entity tables used by the question normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub companies: Vec<String>,
    pub drugs: Vec<String>,
    pub interaction_pairs: Vec<(String, String)>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            companies: vec!["tesla".to_string()],
            drugs: vec![
                "metformin".to_string(),
                "ibuprofen".to_string(),
                "aspirin".to_string(),
            ],
            interaction_pairs: vec![("ibuprofen".to_string(), "aspirin".to_string())],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// JSONL corpus; defaults to `<data_dir>/corpus.jsonl`
    pub corpus_path: Option<PathBuf>,
    /// `.txt` files read by `askroute ingest`; defaults to `<data_dir>/raw`
    pub raw_dir: Option<PathBuf>,
    pub top_k: usize,
    pub snippet_chars: usize,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            raw_dir: None,
            top_k: 4,
            snippet_chars: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub enabled: bool,
    pub uri: String,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            user: "neo4j".to_string(),
            password: None,
            timeout_secs: 10,
        }
    }
}

impl GraphConfig {
    pub fn resolved_password(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;
        Ok(env::var("NEO4J_PASSWORD").ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.password.is_some() {
            return Err(anyhow!(
                "Graph passwords must be provided via the NEO4J_PASSWORD environment variable, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("ASKROUTE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("askroute")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.router.epsilon) {
            return Err(anyhow!(
                "router.epsilon must be between 0.0 and 1.0, got {}",
                self.router.epsilon
            ));
        }
        if !(1..=8).contains(&self.lexical.top_k) {
            return Err(anyhow!(
                "lexical.top_k must be between 1 and 8, got {}",
                self.lexical.top_k
            ));
        }
        if self.lexical.snippet_chars == 0 {
            return Err(anyhow!("lexical.snippet_chars must be positive"));
        }
        self.graph.enforce_env_only()
    }

    /// Resolve the data directory holding the route log and policy file
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.router.data_dir {
            return Ok(dir.clone());
        }
        if let Ok(custom_dir) = env::var("ASKROUTE_DATA_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("askroute"))
    }

    pub fn route_log_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join(ROUTE_LOG_FILE))
    }

    pub fn policy_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join(POLICY_FILE))
    }

    pub fn corpus_path(&self) -> anyhow::Result<PathBuf> {
        match &self.lexical.corpus_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("corpus.jsonl")),
        }
    }

    pub fn raw_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.lexical.raw_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("raw")),
        }
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "router.epsilon" => Ok(self.router.epsilon.to_string()),
            "router.planner" => Ok(self.router.planner.to_string()),
            "router.data_dir" => Ok(self.data_dir()?.display().to_string()),
            "router.fast_path" => Ok(self.router.fast_path.to_string()),

            "normalizer.companies" => Ok(self.normalizer.companies.join(", ")),
            "normalizer.drugs" => Ok(self.normalizer.drugs.join(", ")),

            "lexical.corpus_path" => Ok(self.corpus_path()?.display().to_string()),
            "lexical.raw_dir" => Ok(self.raw_dir()?.display().to_string()),
            "lexical.top_k" => Ok(self.lexical.top_k.to_string()),
            "lexical.snippet_chars" => Ok(self.lexical.snippet_chars.to_string()),

            "graph.enabled" => Ok(self.graph.enabled.to_string()),
            "graph.uri" => Ok(self.graph.uri.clone()),
            "graph.database" => Ok(self.graph.database.clone()),
            "graph.user" => Ok(self.graph.user.clone()),
            "graph.timeout_secs" => Ok(self.graph.timeout_secs.to_string()),
            "graph.password" => match self.graph.resolved_password()? {
                Some(_) => Ok("***".to_string()),
                None => Ok("(not set - use NEO4J_PASSWORD env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `askroute config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "router.epsilon" => {
                let epsilon: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid epsilon value: {}", value))?;
                if !(0.0..=1.0).contains(&epsilon) {
                    return Err(anyhow!("Epsilon must be between 0.0 and 1.0"));
                }
                self.router.epsilon = epsilon;
            }
            "router.planner" => {
                self.router.planner = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            "router.data_dir" => {
                self.router.data_dir = Some(PathBuf::from(value));
            }
            "router.fast_path" => {
                self.router.fast_path = value
                    .parse()
                    .with_context(|| format!("Invalid fast_path value: {}", value))?;
            }

            "normalizer.companies" => self.normalizer.companies = split_list(value),
            "normalizer.drugs" => self.normalizer.drugs = split_list(value),

            "lexical.corpus_path" => {
                self.lexical.corpus_path = Some(PathBuf::from(value));
            }
            "lexical.raw_dir" => {
                self.lexical.raw_dir = Some(PathBuf::from(value));
            }
            "lexical.top_k" => {
                let top_k: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
                if !(1..=8).contains(&top_k) {
                    return Err(anyhow!("top_k must be between 1 and 8"));
                }
                self.lexical.top_k = top_k;
            }
            "lexical.snippet_chars" => {
                self.lexical.snippet_chars = value
                    .parse()
                    .with_context(|| format!("Invalid snippet_chars value: {}", value))?;
            }

            "graph.enabled" => {
                self.graph.enabled = value
                    .parse()
                    .with_context(|| format!("Invalid enabled value: {}", value))?;
            }
            "graph.uri" => self.graph.uri = value.trim_end_matches('/').to_string(),
            "graph.database" => self.graph.database = value.to_string(),
            "graph.user" => self.graph.user = value.to_string(),
            "graph.timeout_secs" => {
                self.graph.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "graph.password" => {
                return Err(anyhow!(
                    "Graph passwords cannot be stored in configuration. \
                     Set the NEO4J_PASSWORD environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `askroute config show` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "router.epsilon",
            "router.planner",
            "router.data_dir",
            "router.fast_path",
            "normalizer.companies",
            "normalizer.drugs",
            "lexical.corpus_path",
            "lexical.raw_dir",
            "lexical.top_k",
            "lexical.snippet_chars",
            "graph.enabled",
            "graph.uri",
            "graph.database",
            "graph.user",
            "graph.timeout_secs",
            "graph.password",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.router.epsilon, 0.2);
        assert_eq!(config.router.planner, PlannerProfile::Standard);
        assert_eq!(config.lexical.top_k, 4);
    }

    #[test]
    fn test_set_epsilon_bounds() {
        let mut config = Config::default();
        config.set("router.epsilon", "0.5").unwrap();
        assert_eq!(config.router.epsilon, 0.5);
        assert!(config.set("router.epsilon", "1.5").is_err());
        assert!(config.set("router.epsilon", "abc").is_err());
    }

    #[test]
    fn test_set_planner_profile() {
        let mut config = Config::default();
        config.set("router.planner", "restricted").unwrap();
        assert_eq!(config.router.planner, PlannerProfile::Restricted);
        assert!(config.set("router.planner", "random").is_err());
    }

    #[test]
    fn test_password_rejected_in_file() {
        let mut config = Config::default();
        assert!(config.set("graph.password", "hunter2").is_err());

        config.graph.password = Some("hunter2".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let mut config = Config::default();
        config.router.data_dir = Some(PathBuf::from("/tmp/askroute-test"));

        assert_eq!(
            config.route_log_path().unwrap(),
            PathBuf::from("/tmp/askroute-test/logs/route_log.csv")
        );
        assert_eq!(
            config.policy_path().unwrap(),
            PathBuf::from("/tmp/askroute-test/models/router_bandit.json")
        );
        assert_eq!(
            config.corpus_path().unwrap(),
            PathBuf::from("/tmp/askroute-test/corpus.jsonl")
        );
        assert_eq!(
            config.raw_dir().unwrap(),
            PathBuf::from("/tmp/askroute-test/raw")
        );

        config.set("lexical.raw_dir", "/srv/docs").unwrap();
        assert_eq!(config.get("lexical.raw_dir").unwrap(), "/srv/docs");
    }

    #[test]
    fn test_toml_roundtrip_keeps_tables() {
        let mut config = Config::default();
        config.normalizer.companies.push("acme".to_string());
        config.router.planner = PlannerProfile::Restricted;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.normalizer.companies, vec!["tesla", "acme"]);
        assert_eq!(parsed.router.planner, PlannerProfile::Restricted);
        assert_eq!(parsed.normalizer.interaction_pairs.len(), 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[router]\nepsilon = 0.05\n").unwrap();
        assert_eq!(parsed.router.epsilon, 0.05);
        assert!(parsed.router.fast_path);
        assert_eq!(parsed.graph.database, "neo4j");
    }

    #[test]
    fn test_unknown_key() {
        let config = Config::default();
        assert!(config.get("llm.temperature").is_err());
    }
}
