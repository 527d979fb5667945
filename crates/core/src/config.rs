use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file locations probed, in order, when no explicit path is given.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["tarifftok.toml", "config/tarifftok.toml"];

pub const DEFAULT_DATA_PATH: &str = "data/retail_tariff_data";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data: DataConfig,
    pub llm: LlmConfig,
    pub router: RouterConfig,
    pub server: ServerConfig,
    pub slack: SlackConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DataConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub api_version: String,
    pub deployment: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub leaf_timeout_secs: u64,
    pub max_steps: usize,
    /// Classifications below this confidence are routed to HANDLE_ERROR.
    /// Zero disables the floor.
    pub min_confidence: f64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default)]
pub struct SlackConfig {
    pub webhook_url: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Offline,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub data_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub min_confidence: Option<f64>,
    pub slack_webhook_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig { path: PathBuf::from(DEFAULT_DATA_PATH) },
            llm: LlmConfig {
                provider: LlmProvider::Offline,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
                deployment: None,
                timeout_secs: 30,
            },
            router: RouterConfig { leaf_timeout_secs: 30, max_steps: 16, min_confidence: 0.0 },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8000 },
            slack: SlackConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "offline" => Ok(Self::Offline),
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected offline|openai|azure_openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn leaf_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.router.leaf_timeout_secs)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(data) = patch.data {
            if let Some(path) = data.path {
                self.data.path = path;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = api_version;
            }
            if let Some(deployment) = llm.deployment {
                self.llm.deployment = Some(deployment);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(router) = patch.router {
            if let Some(leaf_timeout_secs) = router.leaf_timeout_secs {
                self.router.leaf_timeout_secs = leaf_timeout_secs;
            }
            if let Some(max_steps) = router.max_steps {
                self.router.max_steps = max_steps;
            }
            if let Some(min_confidence) = router.min_confidence {
                self.router.min_confidence = min_confidence;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(webhook_url) = slack.webhook_url {
                self.slack.webhook_url = Some(secret_value(webhook_url));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TARIFFTOK_DATA_PATH") {
            self.data.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("TARIFFTOK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TARIFFTOK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TARIFFTOK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TARIFFTOK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TARIFFTOK_LLM_API_VERSION") {
            self.llm.api_version = value;
        }
        if let Some(value) = read_env("TARIFFTOK_LLM_DEPLOYMENT") {
            self.llm.deployment = Some(value);
        }
        if let Some(value) = read_env("TARIFFTOK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TARIFFTOK_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TARIFFTOK_ROUTER_LEAF_TIMEOUT_SECS") {
            self.router.leaf_timeout_secs =
                parse_u64("TARIFFTOK_ROUTER_LEAF_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TARIFFTOK_ROUTER_MAX_STEPS") {
            self.router.max_steps = parse_usize("TARIFFTOK_ROUTER_MAX_STEPS", &value)?;
        }
        if let Some(value) = read_env("TARIFFTOK_ROUTER_MIN_CONFIDENCE") {
            self.router.min_confidence = parse_f64("TARIFFTOK_ROUTER_MIN_CONFIDENCE", &value)?;
        }

        if let Some(value) = read_env("TARIFFTOK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TARIFFTOK_SERVER_PORT") {
            self.server.port = parse_u16("TARIFFTOK_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("TARIFFTOK_SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(secret_value(value));
        }

        let log_level =
            read_env("TARIFFTOK_LOGGING_LEVEL").or_else(|| read_env("TARIFFTOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TARIFFTOK_LOGGING_FORMAT").or_else(|| read_env("TARIFFTOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_path) = overrides.data_path {
            self.data.path = data_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(min_confidence) = overrides.min_confidence {
            self.router.min_confidence = min_confidence;
        }
        if let Some(webhook_url) = overrides.slack_webhook_url {
            self.slack.webhook_url = Some(secret_value(webhook_url));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_data(&self.data)?;
        validate_llm(&self.llm)?;
        validate_router(&self.router)?;
        validate_server(&self.server)?;
        validate_slack(&self.slack)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Returns the config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_data(data: &DataConfig) -> Result<(), ConfigError> {
    if data.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data.path must point at a directory containing tariffs.csv".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let has_api_key =
        llm.api_key.as_ref().map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false);
    let has_base_url = llm.base_url.as_ref().map(|value| !value.trim().is_empty()).unwrap_or(false);

    match llm.provider {
        LlmProvider::Offline => {}
        LlmProvider::OpenAi => {
            if !has_api_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set TARIFFTOK_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::AzureOpenAi => {
            if !has_api_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the azure_openai provider".to_string(),
                ));
            }
            if !has_base_url {
                return Err(ConfigError::Validation(
                    "llm.base_url must be the Azure OpenAI endpoint, e.g. https://<resource>.openai.azure.com"
                        .to_string(),
                ));
            }
            let missing_deployment =
                llm.deployment.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing_deployment {
                return Err(ConfigError::Validation(
                    "llm.deployment is required for the azure_openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            if !has_base_url {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider (e.g. http://localhost:11434)"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.leaf_timeout_secs == 0 || router.leaf_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "router.leaf_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    // The longest legal run visits five steps.
    if !(5..=64).contains(&router.max_steps) {
        return Err(ConfigError::Validation(
            "router.max_steps must be in range 5..=64".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&router.min_confidence) {
        return Err(ConfigError::Validation(
            "router.min_confidence must be in range 0.0..=1.0 (0 disables the floor)".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let Some(webhook_url) = &slack.webhook_url else {
        return Ok(());
    };

    let url = webhook_url.expose_secret();
    if !url.starts_with("https://") {
        let hint = if url.starts_with("xoxb-") || url.starts_with("xapp-") {
            " (hint: this looks like a Slack token, not an incoming webhook URL)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.webhook_url must be an https:// incoming webhook URL{hint}. Create one at https://api.slack.com/messaging/webhooks"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    data: Option<DataPatch>,
    llm: Option<LlmPatch>,
    router: Option<RouterPatch>,
    server: Option<ServerPatch>,
    slack: Option<SlackPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    deployment: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    leaf_timeout_secs: Option<u64>,
    max_steps: Option<usize>,
    min_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
