use std::env;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use tarifftok_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Entry {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Entry {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source =
            field_source(entry.key, entry.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }
    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        Entry::new("data.path", &["TARIFFTOK_DATA_PATH"], config.data.path.display().to_string()),
        Entry::new("llm.provider", &["TARIFFTOK_LLM_PROVIDER"], config.llm.provider.as_str()),
        Entry::new("llm.model", &["TARIFFTOK_LLM_MODEL"], config.llm.model.clone()),
        Entry::new(
            "llm.base_url",
            &["TARIFFTOK_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Entry::new(
            "llm.api_key",
            &["TARIFFTOK_LLM_API_KEY"],
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
        ),
        Entry::new("llm.api_version", &["TARIFFTOK_LLM_API_VERSION"], config.llm.api_version.clone()),
        Entry::new(
            "llm.deployment",
            &["TARIFFTOK_LLM_DEPLOYMENT"],
            config.llm.deployment.as_deref().unwrap_or("<unset>"),
        ),
        Entry::new("llm.timeout_secs", &["TARIFFTOK_LLM_TIMEOUT_SECS"], config.llm.timeout_secs.to_string()),
        Entry::new(
            "router.leaf_timeout_secs",
            &["TARIFFTOK_ROUTER_LEAF_TIMEOUT_SECS"],
            config.router.leaf_timeout_secs.to_string(),
        ),
        Entry::new("router.max_steps", &["TARIFFTOK_ROUTER_MAX_STEPS"], config.router.max_steps.to_string()),
        Entry::new(
            "router.min_confidence",
            &["TARIFFTOK_ROUTER_MIN_CONFIDENCE"],
            config.router.min_confidence.to_string(),
        ),
        Entry::new("server.bind_address", &["TARIFFTOK_SERVER_BIND_ADDRESS"], config.server.bind_address.clone()),
        Entry::new("server.port", &["TARIFFTOK_SERVER_PORT"], config.server.port.to_string()),
        Entry::new(
            "slack.webhook_url",
            &["TARIFFTOK_SLACK_WEBHOOK_URL"],
            config.slack.webhook_url.as_ref().map(redact_webhook).unwrap_or_else(|| "<unset>".to_string()),
        ),
        Entry::new(
            "logging.level",
            &["TARIFFTOK_LOGGING_LEVEL", "TARIFFTOK_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        Entry::new(
            "logging.format",
            &["TARIFFTOK_LOGGING_FORMAT", "TARIFFTOK_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the scheme and host; the path carries the webhook secret.
fn redact_webhook(url: &SecretString) -> String {
    let url = url.expose_secret();
    match url.strip_prefix("https://").and_then(|rest| rest.split_once('/')) {
        Some((host, _)) => format!("https://{host}/***"),
        None => "<redacted>".to_string(),
    }
}
