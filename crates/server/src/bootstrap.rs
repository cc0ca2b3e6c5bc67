use std::sync::Arc;

use mailfn_agent::AgentRuntime;
use mailfn_core::config::{AppConfig, ConfigError, LoadOptions};
use mailfn_core::RegistryError;
use mailfn_functions::{build_registry, RegistrationSummary};
use thiserror::Error;
use tracing::info;

use crate::api::AppState;
use crate::reply::ReplyRenderer;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
    pub builtins: RegistrationSummary,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("function registration failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("reply template failed to load: {0}")]
    Template(#[from] tera::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let (registry, builtins) = build_registry(&config.registry)?;
    info!(
        event_name = "system.bootstrap.functions_registered",
        correlation_id = "bootstrap",
        registered = builtins.registered.len(),
        skipped = builtins.skipped.len(),
        argument_mode = config.registry.argument_mode.as_str(),
        "function registry ready"
    );

    let runtime = AgentRuntime::from_config(&config, Arc::new(registry));
    let state = AppState { runtime: Arc::new(runtime), replies: Arc::new(ReplyRenderer::new()?) };

    Ok(Application { config, state, builtins })
}
