//! CLI integration tests for askroute
//!
//! Tests the askroute CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Isolated config and data directories for one test
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let sandbox = Self {
            dir: TempDir::new().unwrap(),
        };
        // Keep tests off the network
        sandbox
            .cmd()
            .args(["config", "set", "graph.enabled", "false"])
            .assert()
            .success();
        sandbox
    }

    fn data_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("askroute").unwrap();
        cmd.current_dir(self.dir.path())
            .env("ASKROUTE_CONFIG_DIR", self.dir.path().join("config"))
            .env("ASKROUTE_DATA_DIR", self.data_dir())
            .env_remove("NEO4J_PASSWORD")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_ask_answers_arithmetic() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["ask", "97B + 20%"])
        .assert()
        .success()
        .stdout(predicate::str::contains("116400000000 (116.4B)"))
        .stdout(predicate::str::contains("Decision: arithmetic (fast path"));

    let log = sandbox.data_dir().join("logs").join("route_log.csv");
    assert!(log.exists(), "Route log should exist");
    assert!(
        sandbox
            .data_dir()
            .join("models")
            .join("router_bandit.json")
            .exists(),
        "Policy file should exist"
    );
}

#[test]
fn test_ask_json_output() {
    let sandbox = Sandbox::new();

    let output = sandbox
        .cmd()
        .args(["--format", "json", "ask", "2 * 21"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["answer"], "42");
    assert_eq!(response["decision"], "arithmetic");
    assert_eq!(response["had_answer"], true);
    assert_eq!(response["selection"], "fast_path");
}

#[test]
fn test_ask_from_image_text_only() {
    let sandbox = Sandbox::new();
    let ocr = sandbox.dir.path().join("ocr.txt");
    std::fs::write(&ocr, "12M + 3.5B\n").unwrap();

    sandbox
        .cmd()
        .args(["-q", "ask", "--image-text"])
        .arg(&ocr)
        .assert()
        .success()
        .stdout(predicate::str::diff("3512000000 (3.5B)\n"));
}

#[test]
fn test_ask_rejects_empty_question() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["ask", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Empty question"));
}

#[test]
fn test_ask_lexical_mode_uses_corpus() {
    let sandbox = Sandbox::new();
    std::fs::create_dir_all(sandbox.data_dir()).unwrap();
    std::fs::write(
        sandbox.data_dir().join("corpus.jsonl"),
        concat!(
            r#"{"id":"1","title":"Ibuprofen","text":"Ibuprofen may cause nausea and stomach upset.","source_file":"drugs.txt"}"#,
            "\n",
            r#"{"id":"2","title":"Tesla","text":"Tesla builds electric vehicles."}"#,
            "\n"
        ),
    )
    .unwrap();

    sandbox
        .cmd()
        .args(["ask", "--mode", "lexical", "ibuprofen", "nausea"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ibuprofen may cause nausea"))
        .stdout(predicate::str::contains("Ibuprofen (drugs.txt)"));
}

#[test]
fn test_ask_without_corpus_reports_no_answer() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["ask", "--mode", "lexical", "what", "is", "the", "weather"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No answer found."));
}

#[test]
fn test_policy_show_lists_arms() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["policy", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy (epsilon 0.20)"))
        .stdout(predicate::str::contains("arithmetic"))
        .stdout(predicate::str::contains("graph"))
        .stdout(predicate::str::contains("lexical"));
}

#[test]
fn test_policy_learns_from_asks() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["ask", "1 + 1"]).assert().success();

    let output = sandbox
        .cmd()
        .args(["--format", "json", "policy", "show"])
        .output()
        .unwrap();
    let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state["counts"]["arithmetic"], 2);

    sandbox.cmd().args(["policy", "reset"]).assert().failure();
}

#[test]
fn test_policy_rebuilt_from_log_on_next_ask() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["ask", "1 + 1"]).assert().success();
    sandbox.cmd().args(["ask", "3 * 3"]).assert().success();

    // The route log, not the policy file, is what the next start trusts
    let policy = sandbox.data_dir().join("models").join("router_bandit.json");
    std::fs::write(&policy, "{not json").unwrap();

    sandbox.cmd().args(["ask", "4 - 1"]).assert().success();
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&policy).unwrap()).unwrap();
    assert_eq!(state["counts"]["arithmetic"], 4);
}

#[test]
fn test_policy_warm_start_replays_log() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["ask", "1 + 1"]).assert().success();
    sandbox.cmd().args(["ask", "3 * 3"]).assert().success();
    std::fs::remove_file(sandbox.data_dir().join("models").join("router_bandit.json")).unwrap();

    let output = sandbox
        .cmd()
        .args(["--format", "json", "policy", "warm-start"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state["counts"]["arithmetic"], 3);
}

#[test]
fn test_ingest_then_ask_lexical() {
    let sandbox = Sandbox::new();
    let raw = sandbox.data_dir().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(
        raw.join("ibuprofen_notes.txt"),
        "Ibuprofen may cause nausea and stomach upset.\n",
    )
    .unwrap();
    std::fs::write(raw.join("tesla.txt"), "Tesla builds electric vehicles.").unwrap();

    sandbox
        .cmd()
        .args(["ingest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 2 documents"));
    assert!(sandbox.data_dir().join("corpus.jsonl").exists());

    sandbox
        .cmd()
        .args(["ask", "--mode", "lexical", "ibuprofen", "nausea"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ibuprofen may cause nausea"))
        .stdout(predicate::str::contains("Ibuprofen Notes (ibuprofen_notes.txt)"));
}

#[test]
fn test_ingest_from_explicit_dir() {
    let sandbox = Sandbox::new();
    let docs = sandbox.dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("rag.txt"), "Retrieval augmented generation.").unwrap();

    let output = sandbox
        .cmd()
        .args(["--format", "json", "ingest", "--raw-dir"])
        .arg(&docs)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["documents"], 1);
}

#[test]
fn test_ingest_empty_dir_fails() {
    let sandbox = Sandbox::new();
    let empty = sandbox.dir.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();

    sandbox
        .cmd()
        .args(["ingest", "--raw-dir"])
        .arg(&empty)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no .txt files"));
}

#[test]
fn test_health_reports_missing_corpus() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["health"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("askroute ingest"))
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn test_health_after_ingest() {
    let sandbox = Sandbox::new();
    let raw = sandbox.data_dir().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(raw.join("tesla.txt"), "Tesla builds electric vehicles.").unwrap();
    sandbox.cmd().args(["ingest"]).assert().success();

    let output = sandbox
        .cmd()
        .args(["--format", "json", "health"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["corpus"]["ok"], true);
    assert_eq!(report["graph"]["detail"], "disabled");
}

#[test]
fn test_stats_after_ask() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total queries: 0"));

    sandbox.cmd().args(["ask", "10 + 5%"]).assert().success();

    sandbox
        .cmd()
        .args(["stats", "--tail", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total queries: 1"))
        .stdout(predicate::str::contains("Answered: 1 (100.0%)"))
        .stdout(predicate::str::contains("10 + 5%"));

    sandbox
        .cmd()
        .args(["stats", "--decision", "graph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total queries: 0"));
}

#[test]
fn test_config_set_and_get() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "set", "router.epsilon", "0.35"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set router.epsilon = 0.35"));

    sandbox
        .cmd()
        .args(["config", "get", "router.epsilon"])
        .assert()
        .success()
        .stdout(predicate::str::diff("0.35\n"));

    sandbox
        .cmd()
        .args(["config", "get", "graph.enabled"])
        .assert()
        .success()
        .stdout(predicate::str::diff("false\n"));
}

#[test]
fn test_config_rejects_stored_password() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "set", "graph.password", "hunter2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NEO4J_PASSWORD"));
}

#[test]
fn test_config_show_and_path() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("router.epsilon = 0.2"))
        .stdout(predicate::str::contains("lexical.top_k = 4"));

    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
