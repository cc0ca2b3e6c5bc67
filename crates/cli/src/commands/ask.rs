use std::sync::Arc;

use mailfn_agent::{AgentRuntime, ResolverBackend};
use mailfn_core::config::{AppConfig, LoadOptions};
use mailfn_functions::build_registry;

use crate::commands::{block_on_bounded, CommandResult, EXIT_CONFIG, EXIT_REGISTRY};

/// Exit code when the question was handled but did not succeed.
pub const EXIT_UNANSWERED: u8 = 1;

pub fn run(question: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration failed to load: {error}"),
                EXIT_CONFIG,
            )
        }
    };
    let backend = mailfn_agent::build_client(&config.llm);
    run_with_backend(&config, backend, question)
}

/// Same as [`run`] against an explicit config and resolver backend.
pub fn run_with_backend(
    config: &AppConfig,
    backend: Arc<dyn ResolverBackend>,
    question: &str,
) -> CommandResult {
    let registry = match build_registry(&config.registry) {
        Ok((registry, _)) => registry,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "registry",
                format!("function registration failed: {error}"),
                EXIT_REGISTRY,
            )
        }
    };

    let agent = AgentRuntime::with_backend(config, Arc::new(registry), backend);
    let result = match block_on_bounded(agent.handle_request_from("cli", question)) {
        Ok(result) => result,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_UNANSWERED,
            )
        }
    };
    let data = serde_json::to_value(&result).ok();

    if result.ok {
        CommandResult::success_with_data("ask", result.display_text, data)
    } else {
        CommandResult::failure_with_data(
            "ask",
            result.outcome.as_str(),
            result.display_text,
            EXIT_UNANSWERED,
            data,
        )
    }
}
