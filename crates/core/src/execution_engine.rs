//! Deadline-bounded execution engine
//!
//! Takes a resolution for one inbound request, validates the proposed
//! arguments against the registry, and runs the function on a blocking
//! worker awaited with a hard per-invocation deadline. Every path ends in
//! exactly one `ExecutionRecord` appended to the log and an
//! `ExecutionResult` returned to the caller; nothing here returns an error.
//!
//! On deadline expiry the worker is detached, not interrupted. It may keep
//! running in the background, and whatever it eventually returns is dropped.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::domain::function::Arguments;
use crate::domain::record::{ExecutionOutcome, ExecutionRecord, ExecutionResult};
use crate::domain::resolution::IntentResolution;
use crate::errors::FunctionError;
use crate::execution_log::ExecutionLog;
use crate::registry::FunctionRegistry;

/// Appended to text cut short by [`truncate_text`].
pub const TRUNCATION_MARKER: &str = "... [truncated]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub timeout: Duration,
    pub max_result_chars: usize,
    pub max_error_chars: usize,
    pub max_request_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_result_chars: 1000,
            max_error_chars: 500,
            max_request_chars: 2000,
        }
    }
}

impl From<&ExecutionConfig> for EngineConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_result_chars: config.max_result_chars,
            max_error_chars: config.max_error_chars,
            max_request_chars: config.max_request_chars,
        }
    }
}

/// Lifecycle of one request. Terminal states map 1:1 onto outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationState {
    Received,
    Resolving,
    Resolved,
    Unresolved,
    Validating,
    Validated,
    Rejected,
    Executing,
    Completed,
    Failed,
    TimedOut,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::Validating => "validating",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn terminal_outcome(&self) -> Option<ExecutionOutcome> {
        match self {
            Self::Unresolved => Some(ExecutionOutcome::ResolutionFailed),
            Self::Rejected => Some(ExecutionOutcome::ValidationError),
            Self::Completed => Some(ExecutionOutcome::Success),
            Self::Failed => Some(ExecutionOutcome::FunctionError),
            Self::TimedOut => Some(ExecutionOutcome::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_outcome().is_some()
    }

    pub fn can_transition_to(&self, next: InvocationState) -> bool {
        use InvocationState::*;

        match (self, next) {
            (Received, Resolving) => true,
            // Callers holding a resolution already may skip `Resolving`.
            (Received | Resolving, Resolved | Unresolved) => true,
            (Resolved, Validating) => true,
            (Validating, Validated | Rejected) => true,
            (Validated, Executing) => true,
            (Executing, Completed | Failed | TimedOut) => true,
            (from, to) if *from == to && !from.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid invocation transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: InvocationState,
    pub to: InvocationState,
}

/// Per-request context carried from intake through to the record.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub correlation_id: String,
    pub request_text: String,
    /// Who asked: a sender address, `api` or `cli`.
    pub requester: Option<String>,
    started_at: Instant,
    state: InvocationState,
}

impl Invocation {
    pub fn new(correlation_id: impl Into<String>, request_text: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_text: request_text.into(),
            requester: None,
            started_at: Instant::now(),
            state: InvocationState::Received,
        }
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Moves to `next` if the lifecycle allows it; otherwise the state is
    /// left unchanged.
    pub fn advance(&mut self, next: InvocationState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition { from: self.state, to: next });
        }
        debug!(
            event_name = "engine.state_transition",
            correlation_id = %self.correlation_id,
            from = %self.state,
            to = %next,
            "invocation state changed"
        );
        self.state = next;
        Ok(())
    }

    fn step(&mut self, next: InvocationState) {
        if let Err(error) = self.advance(next) {
            warn!(
                event_name = "engine.transition_rejected",
                correlation_id = %self.correlation_id,
                error = %error,
                "invocation transition rejected"
            );
        }
    }
}

enum WorkerOutcome {
    Returned(Value),
    Failed(String),
    TimedOut,
}

#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<FunctionRegistry>,
    log: Arc<ExecutionLog>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<FunctionRegistry>, log: Arc<ExecutionLog>, config: EngineConfig) -> Self {
        Self { registry, log, config }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &Arc<ExecutionLog> {
        &self.log
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        mut invocation: Invocation,
        resolution: IntentResolution,
    ) -> ExecutionResult {
        let function_name = match (&resolution.function_name, resolution.matched) {
            (Some(name), true) => name.clone(),
            _ => {
                invocation.step(InvocationState::Unresolved);
                return self.finish_unresolved(invocation, &resolution);
            }
        };
        invocation.step(InvocationState::Resolved);

        invocation.step(InvocationState::Validating);
        let validated = self
            .registry
            .validate_arguments(&function_name, &resolution.arguments)
            .and_then(|arguments| {
                self.registry
                    .lookup(&function_name)
                    .map(|function| (function, arguments))
                    .ok_or_else(|| {
                        crate::errors::ArgumentError::UnknownFunction(function_name.clone())
                    })
            });
        let (function, arguments) = match validated {
            Ok(validated) => validated,
            Err(error) => {
                invocation.step(InvocationState::Rejected);
                let message = truncate_text(&error.to_string(), self.config.max_error_chars);
                let display_text =
                    format!("The request for \"{function_name}\" could not be run: {message}");
                return self.finish(invocation, display_text, |record| {
                    record
                        .with_function(Some(function_name.clone()))
                        .with_raw_arguments(&resolution.arguments)
                        .with_detail(Some(message))
                });
            }
        };
        invocation.step(InvocationState::Validated);

        invocation.step(InvocationState::Executing);
        debug!(
            event_name = "engine.execution_started",
            correlation_id = %invocation.correlation_id,
            function = %function_name,
            arguments = %describe_arguments(&arguments),
            "running function"
        );
        let handler = Arc::clone(&function.handler);
        let worker_arguments = arguments.clone();
        let worker = tokio::task::spawn_blocking(move || handler.call(&worker_arguments));

        let worker_outcome = match tokio::time::timeout(self.config.timeout, worker).await {
            Ok(Ok(Ok(value))) => WorkerOutcome::Returned(value),
            Ok(Ok(Err(FunctionError { message }))) => WorkerOutcome::Failed(message),
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    format!("function panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "function worker was cancelled".to_string()
                };
                WorkerOutcome::Failed(message)
            }
            Err(_elapsed) => WorkerOutcome::TimedOut,
        };

        let executed = |record: ExecutionRecord| {
            record.with_function(Some(function_name.clone())).with_arguments(arguments)
        };

        match worker_outcome {
            WorkerOutcome::Returned(value) => {
                invocation.step(InvocationState::Completed);
                let text = truncate_text(&render_value(&value), self.config.max_result_chars);
                let detail = text.clone();
                self.finish(invocation, text, |record| executed(record).with_detail(Some(detail)))
            }
            WorkerOutcome::Failed(message) => {
                invocation.step(InvocationState::Failed);
                let message = truncate_text(&message, self.config.max_error_chars);
                let display_text = format!("The function \"{function_name}\" failed: {message}");
                self.finish(invocation, display_text, |record| {
                    executed(record).with_detail(Some(message))
                })
            }
            WorkerOutcome::TimedOut => {
                invocation.step(InvocationState::TimedOut);
                warn!(
                    event_name = "engine.execution_timed_out",
                    correlation_id = %invocation.correlation_id,
                    function = %function_name,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "function exceeded its deadline; worker abandoned"
                );
                let display_text = format!(
                    "The function \"{function_name}\" did not finish within {}. Its result will be discarded.",
                    describe_duration(self.config.timeout)
                );
                self.finish(invocation, display_text, executed)
            }
        }
    }

    fn finish_unresolved(
        &self,
        invocation: Invocation,
        resolution: &IntentResolution,
    ) -> ExecutionResult {
        let reason = resolution.failure_reason();
        let display_text = reason
            .map(|reason| reason.user_message().to_string())
            .unwrap_or_else(|| "No available operation matches the request.".to_string());
        let detail = resolution
            .failure
            .as_ref()
            .map(|failure| truncate_text(&failure.detail, self.config.max_error_chars));

        self.finish(invocation, display_text, |record| {
            record
                .with_function(resolution.function_name.clone())
                .with_raw_arguments(&resolution.arguments)
                .with_resolution_failure(reason)
                .with_detail(detail)
        })
    }

    /// Builds the one record for this invocation, taking its outcome from the
    /// terminal state, and appends it.
    fn finish(
        &self,
        invocation: Invocation,
        display_text: String,
        fill: impl FnOnce(ExecutionRecord) -> ExecutionRecord,
    ) -> ExecutionResult {
        let state = invocation.state();
        let outcome = state.terminal_outcome().unwrap_or_else(|| {
            warn!(
                event_name = "engine.finished_without_terminal_state",
                correlation_id = %invocation.correlation_id,
                state = %state,
                "invocation finished in a non-terminal state"
            );
            ExecutionOutcome::FunctionError
        });
        let duration_ms = invocation.elapsed().as_millis() as u64;

        let request_text = truncate_text(&invocation.request_text, self.config.max_request_chars);
        let record = ExecutionRecord::new(invocation.correlation_id, request_text, outcome)
            .with_requester(invocation.requester)
            .with_duration_ms(duration_ms);
        let stored = self.log.append(fill(record));

        info!(
            event_name = "engine.execution_finished",
            correlation_id = %stored.correlation_id,
            record_id = stored.id,
            function = stored.function_name.as_deref().unwrap_or("none"),
            outcome = %stored.outcome,
            state = %state,
            duration_ms,
            "request finished"
        );

        ExecutionResult {
            ok: stored.outcome.is_success(),
            outcome: stored.outcome,
            display_text,
            function_name: stored.function_name,
            record_id: stored.id,
        }
    }
}

/// Cuts `text` so the result, marker included, is at most `max_chars`
/// characters long.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return TRUNCATION_MARKER.chars().take(max_chars).collect();
    }

    let mut truncated: String = text.chars().take(max_chars - marker_len).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Strings are shown as-is; everything else as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "(no result)".to_string(),
        other => other.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}

fn describe_duration(duration: Duration) -> String {
    if duration.as_millis() < 1000 {
        format!("{} ms", duration.as_millis())
    } else if duration.subsec_millis() == 0 {
        format!("{} seconds", duration.as_secs())
    } else {
        format!("{:.1} seconds", duration.as_secs_f64())
    }
}

/// Normalized arguments rendered for logs and dashboards.
pub fn describe_arguments(arguments: &Arguments) -> String {
    arguments
        .iter()
        .map(|(key, value)| format!("{key}={}", render_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use serde_json::{json, Map, Value};

    use super::{
        describe_arguments, truncate_text, EngineConfig, ExecutionEngine, InvalidTransition,
        Invocation, InvocationState, TRUNCATION_MARKER,
    };
    use crate::domain::function::{Arguments, FunctionMetadata, ParameterKind, ParameterSpec};
    use crate::domain::record::ExecutionOutcome;
    use crate::domain::resolution::{IntentResolution, ResolutionFailureReason};
    use crate::errors::FunctionError;
    use crate::execution_log::ExecutionLog;
    use crate::registry::{ArgumentMode, FunctionRegistry};

    fn get_sales_total(arguments: &Arguments) -> Result<Value, FunctionError> {
        match arguments.get("region").and_then(Value::as_str) {
            Some("north") => Ok(json!(125000)),
            Some(other) => Err(FunctionError::new(format!("no sales data for region `{other}`"))),
            None => Err(FunctionError::new("region missing")),
        }
    }

    fn sleepy(_: &Arguments) -> Result<Value, FunctionError> {
        std::thread::sleep(Duration::from_millis(1000));
        Ok(json!("finally"))
    }

    fn chatty(_: &Arguments) -> Result<Value, FunctionError> {
        Err(FunctionError::new("x".repeat(5000)))
    }

    fn verbose(_: &Arguments) -> Result<Value, FunctionError> {
        Ok(Value::String("y".repeat(5000)))
    }

    fn explodes(_: &Arguments) -> Result<Value, FunctionError> {
        panic!("division by zero in report");
    }

    fn fast(_: &Arguments) -> Result<Value, FunctionError> {
        Ok(json!({"status": "ok"}))
    }

    struct Harness {
        engine: ExecutionEngine,
        log: Arc<ExecutionLog>,
        counter: Arc<AtomicUsize>,
    }

    fn harness(timeout: Duration) -> Harness {
        let registry = Arc::new(FunctionRegistry::new(["sales", "system"], ArgumentMode::Strict));
        let counter = Arc::new(AtomicUsize::new(0));

        registry
            .register_fn(
                "getSalesTotal",
                get_sales_total,
                FunctionMetadata::new("sales", "Total sales for a region")
                    .param(ParameterSpec::required("region", ParameterKind::String)),
            )
            .expect("register getSalesTotal");

        let counted = Arc::clone(&counter);
        registry
            .register_fn(
                "counted",
                move |arguments: &Arguments| -> Result<Value, FunctionError> {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(arguments.len()))
                },
                FunctionMetadata::new("system", "Counts invocations")
                    .param(ParameterSpec::required("x", ParameterKind::Number)),
            )
            .expect("register counted");

        for (name, handler) in [
            ("sleepy", sleepy as fn(&Arguments) -> Result<Value, FunctionError>),
            ("chatty", chatty),
            ("verbose", verbose),
            ("explodes", explodes),
            ("fast", fast),
        ] {
            registry
                .register_fn(name, handler, FunctionMetadata::new("system", name))
                .expect("register helper");
        }

        let log = Arc::new(ExecutionLog::with_capacity(50));
        let engine = ExecutionEngine::new(
            registry,
            Arc::clone(&log),
            EngineConfig {
                timeout,
                max_result_chars: 200,
                max_error_chars: 120,
                max_request_chars: 256,
            },
        );
        Harness { engine, log, counter }
    }

    fn resolved(name: &str, arguments: Value) -> IntentResolution {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        IntentResolution::matched(name, arguments)
    }

    #[tokio::test]
    async fn sales_scenario_succeeds_and_records_result() {
        let h = harness(Duration::from_secs(2));
        let result = h
            .engine
            .execute(
                Invocation::new("corr-1", "what were sales in the north region"),
                resolved("getSalesTotal", json!({"region": "north"})),
            )
            .await;

        assert!(result.ok);
        assert_eq!(result.outcome, ExecutionOutcome::Success);
        assert!(result.display_text.contains("125000"));

        let record = h.log.get(result.record_id).expect("record stored");
        assert_eq!(record.outcome, ExecutionOutcome::Success);
        assert_eq!(record.function_name.as_deref(), Some("getSalesTotal"));
        assert_eq!(record.arguments["region"], json!("north"));
        assert_eq!(record.detail.as_deref(), Some("125000"));
        assert_eq!(record.request_text, "what were sales in the north region");
    }

    #[tokio::test]
    async fn unresolved_request_short_circuits() {
        let h = harness(Duration::from_secs(2));
        let resolution = IntentResolution::unmatched(
            ResolutionFailureReason::UnknownFunction,
            "backend proposed `launchRockets`",
        )
        .with_proposed_function("launchRockets");

        let result = h.engine.execute(Invocation::new("corr-2", "launch"), resolution).await;

        assert!(!result.ok);
        assert_eq!(result.outcome, ExecutionOutcome::ResolutionFailed);
        assert_eq!(result.display_text, ResolutionFailureReason::UnknownFunction.user_message());
        let record = h.log.get(result.record_id).expect("record stored");
        assert_eq!(record.resolution_failure, Some(ResolutionFailureReason::UnknownFunction));
        assert_eq!(record.function_name.as_deref(), Some("launchRockets"));
        assert_eq!(h.counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_required_argument_never_invokes_function() {
        let h = harness(Duration::from_secs(2));
        let result =
            h.engine.execute(Invocation::new("corr-3", "count"), resolved("counted", json!({}))).await;

        assert_eq!(result.outcome, ExecutionOutcome::ValidationError);
        assert!(result.display_text.contains("missing required parameter `x`"));
        assert_eq!(h.counter.load(Ordering::SeqCst), 0);

        let ok = h
            .engine
            .execute(Invocation::new("corr-4", "count"), resolved("counted", json!({"x": "4"})))
            .await;
        assert_eq!(ok.outcome, ExecutionOutcome::Success);
        assert_eq!(h.counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_function_times_out_within_deadline() {
        let timeout = Duration::from_millis(100);
        let h = harness(timeout);
        let started = Instant::now();

        let result =
            h.engine.execute(Invocation::new("corr-5", "slow"), resolved("sleepy", json!({}))).await;

        assert!(started.elapsed() < timeout + Duration::from_millis(400));
        assert_eq!(result.outcome, ExecutionOutcome::Timeout);
        assert!(result.display_text.contains("100 ms"));
        let record = h.log.get(result.record_id).expect("record stored");
        assert_eq!(record.outcome, ExecutionOutcome::Timeout);
        assert_eq!(record.detail, None);
    }

    #[tokio::test]
    async fn function_error_text_is_bounded() {
        let h = harness(Duration::from_secs(2));
        let result =
            h.engine.execute(Invocation::new("corr-6", "chat"), resolved("chatty", json!({}))).await;

        assert_eq!(result.outcome, ExecutionOutcome::FunctionError);
        let record = h.log.get(result.record_id).expect("record stored");
        let detail = record.detail.expect("error text stored");
        assert!(detail.chars().count() <= 120);
        assert!(detail.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn oversized_result_is_truncated_with_marker() {
        let h = harness(Duration::from_secs(2));
        let result =
            h.engine.execute(Invocation::new("corr-7", "big"), resolved("verbose", json!({}))).await;

        assert_eq!(result.outcome, ExecutionOutcome::Success);
        assert_eq!(result.display_text.chars().count(), 200);
        assert!(result.display_text.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn panic_is_isolated_as_function_error() {
        let h = harness(Duration::from_secs(2));
        let result = h
            .engine
            .execute(Invocation::new("corr-8", "boom"), resolved("explodes", json!({})))
            .await;

        assert_eq!(result.outcome, ExecutionOutcome::FunctionError);
        assert!(result.display_text.contains("division by zero"));
    }

    #[tokio::test]
    async fn every_request_produces_exactly_one_record() {
        let h = harness(Duration::from_millis(100));
        let cases = vec![
            resolved("getSalesTotal", json!({"region": "north"})),
            resolved("getSalesTotal", json!({"region": "south"})),
            resolved("counted", json!({})),
            resolved("sleepy", json!({})),
            IntentResolution::unmatched(ResolutionFailureReason::NoMatch, "nothing fits"),
        ];

        for (index, resolution) in cases.into_iter().enumerate() {
            h.engine.execute(Invocation::new(format!("corr-{index}"), "req"), resolution).await;
        }

        let outcomes: Vec<ExecutionOutcome> =
            h.log.recent(10).into_iter().rev().map(|record| record.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                ExecutionOutcome::Success,
                ExecutionOutcome::FunctionError,
                ExecutionOutcome::ValidationError,
                ExecutionOutcome::Timeout,
                ExecutionOutcome::ResolutionFailed,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn hung_function_does_not_delay_concurrent_requests() {
        let h = harness(Duration::from_millis(500));
        let engine = h.engine.clone();

        let slow = tokio::spawn({
            let engine = engine.clone();
            async move {
                engine.execute(Invocation::new("slow", "slow"), resolved("sleepy", json!({}))).await
            }
        });

        let fast_tasks: Vec<_> = (0..8)
            .map(|index| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = engine
                        .execute(
                            Invocation::new(format!("fast-{index}"), "fast"),
                            resolved("fast", json!({})),
                        )
                        .await;
                    (result, started.elapsed())
                })
            })
            .collect();

        for task in fast_tasks {
            let (result, elapsed) = task.await.expect("fast task");
            assert_eq!(result.outcome, ExecutionOutcome::Success);
            assert!(elapsed < Duration::from_millis(400), "fast request took {elapsed:?}");
        }

        let slow = slow.await.expect("slow task");
        assert_eq!(slow.outcome, ExecutionOutcome::Timeout);
        assert_eq!(h.log.len(), 9);
    }

    #[test]
    fn truncation_respects_bound_including_marker() {
        assert_eq!(truncate_text("short", 10), "short");
        let cut = truncate_text(&"z".repeat(100), 40);
        assert_eq!(cut.chars().count(), 40);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_text("abcdefghij", 3).chars().count(), 3);
        assert_eq!(truncate_text("ééééé", 5), "ééééé");
    }

    #[tokio::test]
    async fn stored_request_text_is_bounded_and_keeps_requester() {
        let h = harness(Duration::from_secs(2));
        let huge = "a".repeat(1_000_000);

        let result = h
            .engine
            .execute(
                Invocation::new("corr-9", huge).with_requester("ops@example.com"),
                resolved("fast", json!({})),
            )
            .await;

        let record = h.log.get(result.record_id).expect("record stored");
        assert_eq!(record.request_text.chars().count(), 256);
        assert!(record.request_text.ends_with(TRUNCATION_MARKER));
        assert_eq!(record.requester.as_deref(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn timeout_message_does_not_claim_the_worker_stopped() {
        let h = harness(Duration::from_millis(50));
        let result =
            h.engine.execute(Invocation::new("corr-10", "slow"), resolved("sleepy", json!({}))).await;

        assert_eq!(result.outcome, ExecutionOutcome::Timeout);
        assert!(result.display_text.contains("did not finish within 50 ms"));
        assert!(!result.display_text.contains("stopped"));
    }

    #[test]
    fn lifecycle_accepts_only_forward_transitions() {
        let mut invocation = Invocation::new("corr-11", "req");
        for next in [
            InvocationState::Resolving,
            InvocationState::Resolved,
            InvocationState::Validating,
            InvocationState::Validated,
            InvocationState::Executing,
            InvocationState::Completed,
        ] {
            assert_eq!(invocation.advance(next), Ok(()));
        }

        let rejected = invocation.advance(InvocationState::Received);
        assert_eq!(
            rejected,
            Err(InvalidTransition {
                from: InvocationState::Completed,
                to: InvocationState::Received,
            })
        );
        assert_eq!(invocation.state(), InvocationState::Completed);
        assert!(invocation.advance(InvocationState::Completed).is_err());
    }

    #[test]
    fn lifecycle_rejects_skipping_validation() {
        let mut invocation = Invocation::new("corr-12", "req");
        assert!(invocation.advance(InvocationState::Resolved).is_ok());
        assert!(invocation.advance(InvocationState::Executing).is_err());
        assert_eq!(invocation.state(), InvocationState::Resolved);
        assert!(InvocationState::Received.can_transition_to(InvocationState::Unresolved));
        assert!(!InvocationState::Unresolved.can_transition_to(InvocationState::Validating));
    }

    #[tokio::test]
    async fn record_outcome_follows_terminal_state() {
        let h = harness(Duration::from_secs(2));
        let cases = [
            (resolved("fast", json!({})), InvocationState::Completed),
            (resolved("chatty", json!({})), InvocationState::Failed),
            (resolved("counted", json!({})), InvocationState::Rejected),
            (
                IntentResolution::unmatched(ResolutionFailureReason::NoMatch, "nothing fits"),
                InvocationState::Unresolved,
            ),
        ];

        for (index, (resolution, terminal)) in cases.into_iter().enumerate() {
            let result =
                h.engine.execute(Invocation::new(format!("term-{index}"), "req"), resolution).await;
            assert_eq!(Some(result.outcome), terminal.terminal_outcome());
        }
    }

    #[test]
    fn terminal_states_map_to_outcomes() {
        assert_eq!(InvocationState::Received.terminal_outcome(), None);
        assert_eq!(InvocationState::Executing.terminal_outcome(), None);
        assert_eq!(
            InvocationState::TimedOut.terminal_outcome(),
            Some(ExecutionOutcome::Timeout)
        );
        assert_eq!(
            InvocationState::Rejected.terminal_outcome(),
            Some(ExecutionOutcome::ValidationError)
        );
    }

    #[test]
    fn arguments_render_as_key_value_pairs() {
        let mut arguments = Arguments::new();
        arguments.insert("region".to_string(), json!("north"));
        arguments.insert("year".to_string(), json!(2024));
        assert_eq!(describe_arguments(&arguments), "region=north, year=2024");
    }
}
