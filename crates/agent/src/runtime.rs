use std::sync::Arc;
use std::time::Duration;

use mailfn_core::config::AppConfig;
use mailfn_core::{
    EngineConfig, ExecutionEngine, ExecutionLog, ExecutionLogConfig, ExecutionResult,
    FunctionRegistry, Invocation, InvocationState,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::{build_client, BackendError, ResolverBackend};
use crate::resolver::IntentResolver;

/// Request entry point: resolve against the live catalog, then execute.
pub struct AgentRuntime {
    resolver: IntentResolver,
    engine: ExecutionEngine,
}

impl AgentRuntime {
    pub fn new(resolver: IntentResolver, engine: ExecutionEngine) -> Self {
        Self { resolver, engine }
    }

    /// Wires the configured backend, a fresh execution log and the engine
    /// around an already populated registry.
    pub fn from_config(config: &AppConfig, registry: Arc<FunctionRegistry>) -> Self {
        Self::with_backend(config, registry, build_client(&config.llm))
    }

    pub fn with_backend(
        config: &AppConfig,
        registry: Arc<FunctionRegistry>,
        backend: Arc<dyn ResolverBackend>,
    ) -> Self {
        let log = Arc::new(ExecutionLog::new(ExecutionLogConfig::from(&config.history)));
        let engine = ExecutionEngine::new(registry, log, EngineConfig::from(&config.execution));
        let resolver = IntentResolver::new(backend, Duration::from_secs(config.llm.timeout_secs));
        Self::new(resolver, engine)
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub async fn handle_request(&self, request_text: &str) -> ExecutionResult {
        self.run(Invocation::new(Uuid::new_v4().to_string(), request_text)).await
    }

    /// Like [`handle_request`](Self::handle_request), recording who asked.
    pub async fn handle_request_from(&self, requester: &str, request_text: &str) -> ExecutionResult {
        let invocation =
            Invocation::new(Uuid::new_v4().to_string(), request_text).with_requester(requester);
        self.run(invocation).await
    }

    async fn run(&self, mut invocation: Invocation) -> ExecutionResult {
        let request_text = invocation.request_text.clone();
        info!(
            event_name = "runtime.request_received",
            correlation_id = %invocation.correlation_id,
            requester = invocation.requester.as_deref().unwrap_or("unknown"),
            request_chars = request_text.chars().count(),
            "request received"
        );

        if let Err(error) = invocation.advance(InvocationState::Resolving) {
            warn!(
                event_name = "runtime.transition_rejected",
                correlation_id = %invocation.correlation_id,
                error = %error,
                "invocation transition rejected"
            );
        }
        let catalog = self.engine.registry().list_metadata();
        let resolution = self.resolver.resolve(&request_text, &catalog).await;

        self.engine.execute(invocation, resolution).await
    }

    pub async fn backend_health(&self) -> Result<(), BackendError> {
        self.resolver.backend().health().await
    }
}
