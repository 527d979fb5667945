use std::io::ErrorKind;
use std::sync::Arc;

use tarifftok_agent::{AgentRuntime, LlmError};
use tarifftok_core::config::{AppConfig, ConfigError};
use tarifftok_core::fixtures::demo_dataset;
use tarifftok_core::{DatasetError, TariffDataset, TariffStore};
use thiserror::Error;
use tracing::{info, warn};

use crate::slack::{SlackError, SlackNotifier};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
    pub slack: Arc<SlackNotifier>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("tariff dataset could not be loaded: {0}")]
    Dataset(#[source] DatasetError),
    #[error("llm client could not be built: {0}")]
    Llm(#[source] LlmError),
    #[error("slack client could not be built: {0}")]
    Slack(#[source] SlackError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        data_path = %config.data.path.display(),
        "starting application bootstrap"
    );

    let dataset = load_dataset(&config)?;
    info!(
        event_name = "system.bootstrap.dataset_loaded",
        correlation_id = "bootstrap",
        records = dataset.len(),
        "tariff dataset loaded"
    );

    let store: Arc<dyn TariffStore> = Arc::new(dataset);
    let runtime = AgentRuntime::from_config(&config, store).map_err(BootstrapError::Llm)?;
    let slack = SlackNotifier::from_config(&config.slack).map_err(BootstrapError::Slack)?;

    Ok(Application { config, runtime: Arc::new(runtime), slack: Arc::new(slack) })
}

/// A missing extract falls back to the built-in demo data; a malformed one
/// is fatal.
fn load_dataset(config: &AppConfig) -> Result<TariffDataset, BootstrapError> {
    match TariffDataset::load(&config.data.path) {
        Ok(dataset) => Ok(dataset),
        Err(DatasetError::Open { path, source }) if source.kind() == ErrorKind::NotFound => {
            warn!(
                event_name = "system.bootstrap.dataset_fallback",
                correlation_id = "bootstrap",
                path = %path.display(),
                "tariff data not found, serving the demo dataset"
            );
            demo_dataset().map_err(BootstrapError::Dataset)
        }
        Err(error) => Err(BootstrapError::Dataset(error)),
    }
}
