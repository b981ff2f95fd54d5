//! Askroute CLI - ask questions and inspect what the router has learned

use std::path::PathBuf;

use anyhow::Context;
use askroute_core::config::Config;
use askroute_core::routing::{
    CsvRouteLog, JsonPolicyStore, PolicyState, PolicyStore, Question, RouteLog, RouteMode,
    RouteResponse, RouteStats, Router, Selection, StrategyKind, warm_start_policy,
};
use askroute_core::strategies::{GraphStrategy, TfIdfIndex, ingest_directory};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser)]
#[command(name = "askroute")]
#[command(author, version, about = "Question router that learns which strategy to try first", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a question and print the answer
    Ask {
        /// Question text
        question: Vec<String>,
        /// File holding text extracted from an attached image
        #[arg(long, value_name = "FILE")]
        image_text: Option<PathBuf>,
        /// auto, or a strategy to run on its own (arithmetic, graph, lexical)
        #[arg(short, long, default_value = "auto")]
        mode: RouteMode,
    },

    /// Inspect or rebuild the learned policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Build the lexical corpus from a directory of .txt files
    Ingest {
        /// Directory to read (defaults to lexical.raw_dir)
        #[arg(long, value_name = "DIR")]
        raw_dir: Option<PathBuf>,
    },

    /// Check that the corpus and the graph database are usable
    Health,

    /// Summarize the route log
    Stats {
        /// Only count questions decided by this strategy
        #[arg(short, long)]
        decision: Option<StrategyKind>,
        /// Also list the most recent N questions
        #[arg(short, long)]
        tail: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Show per-strategy counts and values
    Show,
    /// Rebuild the policy by replaying the route log
    WarmStart,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// List all configuration values
    Show,
    /// Show config file path
    Path,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "askroute=warn"
    } else {
        "askroute=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.parse()?),
        )
        .init();

    match cli.command {
        Commands::Ask {
            question,
            image_text,
            mode,
        } => cmd_ask(&question, image_text.as_deref(), mode, cli.format, cli.quiet).await,

        Commands::Policy { action } => cmd_policy(action, cli.format, cli.quiet),

        Commands::Ingest { raw_dir } => cmd_ingest(raw_dir, cli.format, cli.quiet),

        Commands::Health => cmd_health(cli.format, cli.quiet).await,

        Commands::Stats { decision, tail } => cmd_stats(decision, tail, cli.format, cli.quiet),

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ask(
    words: &[String],
    image_text: Option<&std::path::Path>,
    mode: RouteMode,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let typed = words.join(" ");
    let extracted = match image_text {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read image text: {}", path.display()))?,
        ),
        None => None,
    };

    let question = match Question::compose(Some(&typed), extracted.as_deref()) {
        Ok(question) => question,
        Err(e) => {
            if let Some(hint) = e.suggestion() {
                eprintln!("Usage: {}", hint);
            }
            return Err(e.into());
        }
    };

    let config = Config::load()?;
    let router = Router::from_config(&config).await?;
    let response = router.route(&question, mode).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text if quiet => println!("{}", response.answer),
        OutputFormat::Text => print_response(&question, &response),
    }
    Ok(())
}

fn print_response(question: &Question, response: &RouteResponse) {
    println!("{}", response.answer);
    println!();

    let how = match response.selection {
        Selection::Explore => "explored",
        Selection::Exploit => "exploited",
        Selection::Planner => "planned",
        Selection::FastPath => "fast path",
    };
    println!(
        "Decision: {} ({}, {} ms)",
        response.decision, how, response.latency_ms
    );
    if response.normalized != question.as_str() {
        println!("Rewritten: {}", response.normalized);
    }
    if !response.sources.is_empty() {
        println!("Sources:");
        for source in &response.sources {
            println!("  - {}", source);
        }
    }
}

fn policy_store(config: &Config) -> anyhow::Result<JsonPolicyStore> {
    Ok(JsonPolicyStore::new(config.policy_path()?))
}

fn cmd_policy(action: PolicyAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = policy_store(&config)?;

    let state = match action {
        PolicyAction::Show => match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => PolicyState::with_epsilon(config.router.epsilon),
            Err(e) => {
                warn!(error = %e, "Policy file unreadable; showing defaults");
                PolicyState::with_epsilon(config.router.epsilon)
            }
        },
        PolicyAction::WarmStart => {
            let log = CsvRouteLog::new(config.route_log_path()?);
            let state = warm_start_policy(&store, &log, config.router.epsilon)?;
            if !quiet && format == OutputFormat::Text {
                println!("Policy rebuilt from {}.", log.path().display());
            }
            state
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => print_policy(&state),
    }
    Ok(())
}

fn print_policy(state: &PolicyState) {
    println!("Policy (epsilon {:.2}):", state.epsilon);
    for kind in StrategyKind::ALL {
        println!(
            "  {:<10}  count {:>6}  value {:>8.4}",
            kind.as_str(),
            state.count(kind),
            state.value(kind)
        );
    }
}

fn cmd_ingest(raw_dir: Option<PathBuf>, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let raw_dir = match raw_dir {
        Some(dir) => dir,
        None => config.raw_dir()?,
    };
    let corpus_path = config.corpus_path()?;

    let index = ingest_directory(&raw_dir, &corpus_path).map_err(|e| {
        if let Some(hint) = e.suggestion() {
            eprintln!("Hint: {}", hint);
        }
        e
    })?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "raw_dir": raw_dir,
                "corpus": corpus_path,
                "documents": index.len(),
                "terms": index.term_count(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => println!(
            "Indexed {} documents ({} terms) -> {}",
            index.len(),
            index.term_count(),
            corpus_path.display()
        ),
    }
    Ok(())
}

/// Outcome of one health check
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

async fn cmd_health(format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut checks = Vec::new();

    let corpus_path = config.corpus_path()?;
    checks.push(if corpus_path.exists() {
        match TfIdfIndex::load(&corpus_path).await {
            Ok(index) => Check {
                name: "corpus",
                ok: !index.is_empty(),
                detail: format!("{} documents ({})", index.len(), corpus_path.display()),
            },
            Err(e) => Check {
                name: "corpus",
                ok: false,
                detail: e.to_string(),
            },
        }
    } else {
        Check {
            name: "corpus",
            ok: false,
            detail: format!(
                "{} not found; run `askroute ingest`",
                corpus_path.display()
            ),
        }
    });

    checks.push(if !config.graph.enabled {
        Check {
            name: "graph",
            ok: true,
            detail: "disabled".to_string(),
        }
    } else {
        let graph = GraphStrategy::from_config(&config.graph, &config.normalizer);
        let counted = match graph {
            Ok(graph) => graph
                .node_count()
                .await
                .map(|nodes| format!("connected, {} nodes ({})", nodes, graph.uri())),
            Err(e) => Err(e),
        };
        match counted {
            Ok(detail) => Check {
                name: "graph",
                ok: true,
                detail,
            },
            Err(e) => Check {
                name: "graph",
                ok: false,
                detail: e.to_string(),
            },
        }
    });

    match format {
        OutputFormat::Json => {
            let value: serde_json::Map<String, serde_json::Value> = checks
                .iter()
                .map(|c| {
                    (
                        c.name.to_string(),
                        serde_json::json!({ "ok": c.ok, "detail": c.detail }),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => {
            for check in &checks {
                let status = if check.ok { "ok" } else { "FAIL" };
                println!("{:<8} {:<5} {}", check.name, status, check.detail);
            }
        }
    }

    if checks.iter().any(|c| !c.ok) {
        anyhow::bail!("Health check failed");
    }
    Ok(())
}

fn cmd_stats(
    decision: Option<StrategyKind>,
    tail: Option<usize>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let log = CsvRouteLog::new(config.route_log_path()?);
    let entries = log.entries()?;

    let stats = RouteStats::from_entries(&entries, decision);
    let recent: Vec<_> = entries
        .iter()
        .filter(|e| decision.is_none_or(|d| d == e.decision))
        .collect();
    let recent = &recent[recent.len().saturating_sub(tail.unwrap_or(0))..];

    if format == OutputFormat::Json {
        let value = serde_json::json!({
            "stats": stats,
            "recent": recent,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Total queries: {}", stats.total_queries);
    if quiet {
        return Ok(());
    }
    println!(
        "Answered: {} ({:.1}%)",
        stats.answered,
        stats.answer_rate() * 100.0
    );
    println!("Avg latency: {:.1} ms", stats.avg_latency_ms());

    if !stats.by_decision.is_empty() {
        println!("By decision:");
        for (kind, per) in &stats.by_decision {
            println!(
                "  {:<10}  {:>5} queries  {:>5.1}% answered  {:>8.1} ms",
                kind.as_str(),
                per.queries,
                per.success_rate() * 100.0,
                per.avg_latency_ms()
            );
        }
    }
    let [first, second] = stats.preferred_fact_order();
    println!("Preferred fact order: {}, {}", first, second);

    if !recent.is_empty() {
        println!("Recent:");
        for entry in recent {
            println!(
                "  {}  {:<10}  {}  {:>5} ms  {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.decision.as_str(),
                if entry.had_answer { "yes" } else { "no " },
                entry.latency_ms,
                entry.raw_question.replace('\n', " ")
            );
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
    }
    Ok(())
}
