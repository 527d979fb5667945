use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tarifftok_cli::commands::{ask, config, doctor, graph, seed, summary};
use tempfile::TempDir;

#[test]
fn seed_writes_demo_dataset_to_configured_path() {
    let dir = TempDir::new().expect("temp dir");
    let data_dir = dir.path().join("data");

    with_env(&[("TARIFFTOK_DATA_PATH", path_str(&data_dir))], || {
        let result = seed::run(None);
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or("").starts_with("wrote 60 demo tariff rows"));
        assert!(data_dir.join("tariffs.csv").exists());
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("temp dir");

    with_env(&[], || {
        let first = seed::run(Some(dir.path()));
        let contents = std::fs::read_to_string(dir.path().join("tariffs.csv")).expect("csv");
        let second = seed::run(Some(dir.path()));

        assert_eq!(first.exit_code, 0);
        assert_eq!(second.exit_code, 0);
        assert_eq!(parse_payload(&first.output)["message"], parse_payload(&second.output)["message"]);
        assert_eq!(
            contents,
            std::fs::read_to_string(dir.path().join("tariffs.csv")).expect("csv"),
            "second seed should write identical rows"
        );
    });
}

#[test]
fn ask_routes_rate_lookup_through_the_flow() {
    let dir = seeded_dir();

    with_env(&[("TARIFFTOK_DATA_PATH", path_str(dir.path()))], || {
        let result = ask::run("What's the tariff rate for Toys from Vietnam?", true);
        assert_eq!(result.exit_code, 0, "expected a clean run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["path"], serde_json::json!(["START", "CLASSIFY", "LOOKUP", "FORMAT", "END"]));
        assert_eq!(payload["results"].as_array().map(Vec::len), Some(1));
        assert!(payload["error"].is_null());
        assert_eq!(payload["statistics"]["total_steps"], 5);
        assert!(payload["statistics"]["slowest"]["step"].is_string());
    });
}

#[test]
fn ask_prints_answer_and_path_for_humans() {
    let dir = seeded_dir();

    with_env(&[("TARIFFTOK_DATA_PATH", path_str(dir.path()))], || {
        let result = ask::run("What data do you have available?", false);

        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("path: START -> CLASSIFY -> SUMMARIZE -> FORMAT -> END"));
    });
}

#[test]
fn ask_reports_missing_dataset() {
    let dir = TempDir::new().expect("temp dir");

    with_env(&[("TARIFFTOK_DATA_PATH", path_str(&dir.path().join("absent")))], || {
        let result = ask::run("What's the tariff rate for Toys from Vietnam?", false);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "dataset");
        assert!(payload["message"].as_str().unwrap_or("").contains("tarifftok seed"));
    });
}

#[test]
fn ask_returns_config_failure_for_invalid_env() {
    with_env(&[("TARIFFTOK_ROUTER_MAX_STEPS", "many")], || {
        let result = ask::run("anything", false);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn graph_highlights_requested_path() {
    let result = graph::run(Some("START,CLASSIFY,LOOKUP,FORMAT,END"));

    assert_eq!(result.exit_code, 0);
    assert!(result.output.starts_with("digraph"));
    assert!(result.output.contains("CLASSIFY -> LOOKUP"));
    assert!(result.output.contains("color=red"));
}

#[test]
fn graph_rejects_unknown_steps() {
    let result = graph::run(Some("START,QUOTE"));
    assert_eq!(result.exit_code, 2);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn summary_describes_seeded_dataset() {
    let dir = seeded_dir();

    with_env(&[("TARIFFTOK_DATA_PATH", path_str(dir.path()))], || {
        let result = summary::run();

        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("tariff records: 60"));
        assert!(result.output.contains("countries: China, Vietnam, Mexico, India, USA"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_secrets() {
    with_env(
        &[
            ("TARIFFTOK_LLM_PROVIDER", "openai"),
            ("TARIFFTOK_LLM_API_KEY", "sk-live-secret"),
            ("TARIFFTOK_SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T0/B0/secret"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- llm.provider = openai (source: env (TARIFFTOK_LLM_PROVIDER))"));
            assert!(output.contains("- llm.api_key = <redacted>"));
            assert!(output.contains("- slack.webhook_url = https://hooks.slack.com/***"));
            assert!(output.contains("- router.max_steps = "));
            assert!(!output.contains("sk-live-secret"));
            assert!(!output.contains("B0/secret"));
        },
    );
}

#[test]
fn doctor_passes_with_seeded_offline_setup() {
    let dir = seeded_dir();

    with_env(&[("TARIFFTOK_DATA_PATH", path_str(dir.path()))], || {
        let report = parse_payload(&doctor::run(true));

        assert_eq!(report["overall_status"], "pass");
        assert_eq!(report["checks"][1]["name"], "dataset_readiness");
        assert_eq!(report["checks"][2]["details"], "offline: keyword classifier and template narrator, no network calls");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("TARIFFTOK_ROUTER_MIN_CONFIDENCE", "1.5")], || {
        let report = parse_payload(&doctor::run(true));

        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
    });
}

fn seeded_dir() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let result = seed::run(Some(dir.path()));
    assert_eq!(result.exit_code, 0, "seed should succeed: {}", result.output);
    dir
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are utf-8")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TARIFFTOK_DATA_PATH",
        "TARIFFTOK_LLM_PROVIDER",
        "TARIFFTOK_LLM_API_KEY",
        "TARIFFTOK_LLM_BASE_URL",
        "TARIFFTOK_LLM_MODEL",
        "TARIFFTOK_LLM_API_VERSION",
        "TARIFFTOK_LLM_DEPLOYMENT",
        "TARIFFTOK_LLM_TIMEOUT_SECS",
        "TARIFFTOK_ROUTER_LEAF_TIMEOUT_SECS",
        "TARIFFTOK_ROUTER_MAX_STEPS",
        "TARIFFTOK_ROUTER_MIN_CONFIDENCE",
        "TARIFFTOK_SERVER_BIND_ADDRESS",
        "TARIFFTOK_SERVER_PORT",
        "TARIFFTOK_SLACK_WEBHOOK_URL",
        "TARIFFTOK_LOGGING_LEVEL",
        "TARIFFTOK_LOGGING_FORMAT",
        "TARIFFTOK_LOG_LEVEL",
        "TARIFFTOK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
