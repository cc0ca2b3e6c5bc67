//! HTTP surface for inbound requests and the operator dashboard.
//!
//! Endpoints:
//! - `POST   /webhook/email`          inbound email, returns the composed reply
//! - `POST   /api/ask`                plain question, returns the execution result
//! - `GET    /api/functions`          registered catalog
//! - `GET    /api/functions/search`   catalog filtered by `q`
//! - `GET    /api/logs`               recent execution records, newest first,
//!                                     optionally filtered by `outcome`
//! - `DELETE /api/logs`               clear execution history
//! - `GET    /api/stats`              outcome counts

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mailfn_agent::AgentRuntime;
use mailfn_core::{
    CatalogEntry, ExecutionOutcome, ExecutionRecord, ExecutionResult, FunctionRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::question::extract_question;
use crate::reply::{reply_address, ComposedReply, ReplyRenderer};

pub const DEFAULT_LOG_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub replies: Arc<ReplyRenderer>,
}

#[derive(Debug, Deserialize)]
pub struct InboundEmail {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub question: String,
    pub result: ExecutionResult,
    pub reply: ComposedReply,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct FunctionsResponse {
    pub count: usize,
    pub argument_mode: &'static str,
    pub allowed_modules: Vec<String>,
    pub functions: Vec<CatalogEntry>,
}

impl FunctionsResponse {
    fn new(registry: &FunctionRegistry, functions: Vec<CatalogEntry>) -> Self {
        Self {
            count: functions.len(),
            argument_mode: registry.mode().as_str(),
            allowed_modules: registry.allowed_modules().map(str::to_string).collect(),
            functions,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub outcome: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub count: usize,
    pub capacity: usize,
    pub records: Vec<ExecutionRecord>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total: usize,
    pub capacity: usize,
    pub function_count: usize,
    pub by_outcome: BTreeMap<ExecutionOutcome, usize>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: message.into() }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/email", post(email_webhook))
        .route("/api/ask", post(ask))
        .route("/api/functions", get(list_functions))
        .route("/api/functions/search", get(search_functions))
        .route("/api/logs", get(recent_logs).delete(clear_logs))
        .route("/api/stats", get(stats))
        .with_state(state)
}

pub async fn email_webhook(
    State(state): State<AppState>,
    Json(email): Json<InboundEmail>,
) -> ApiResult<WebhookResponse> {
    let Some(question) = extract_question(&email.body) else {
        warn!(event_name = "webhook.no_question", from = %email.from, "email carried no question");
        return Err(api_error(StatusCode::BAD_REQUEST, "email body contains no question"));
    };

    let sender = reply_address(&email.from);
    let requester = if sender.is_empty() { "email" } else { sender.as_str() };
    info!(
        event_name = "webhook.email_received",
        from = %requester,
        question_chars = question.chars().count(),
        "processing inbound email"
    );
    let result = state.runtime.handle_request_from(requester, &question).await;

    let reply = state
        .replies
        .render(&email.from, &email.subject, &question, &result)
        .map_err(|error| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("reply rendering failed: {error}"))
        })?;

    Ok(Json(WebhookResponse { question, result, reply }))
}

pub async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Json<ExecutionResult> {
    Json(state.runtime.handle_request_from("api", &request.question).await)
}

pub async fn list_functions(State(state): State<AppState>) -> Json<FunctionsResponse> {
    let registry = state.runtime.engine().registry();
    Json(FunctionsResponse::new(registry, registry.list_metadata()))
}

pub async fn search_functions(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<FunctionsResponse> {
    let needle = query.q.as_deref().map(str::trim).unwrap_or_default();
    if needle.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query parameter `q` is required"));
    }
    let registry = state.runtime.engine().registry();
    Ok(Json(FunctionsResponse::new(registry, registry.search(needle))))
}

pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsResponse> {
    let outcome = match query.outcome.as_deref().map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) => Some(ExecutionOutcome::parse(tag).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, format!("unknown outcome `{tag}`"))
        })?),
        None => None,
    };

    let log = state.runtime.engine().log();
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let records: Vec<ExecutionRecord> = match outcome {
        Some(outcome) => log
            .recent(log.capacity())
            .into_iter()
            .filter(|record| record.outcome == outcome)
            .take(limit)
            .collect(),
        None => log.recent(limit),
    };
    Ok(Json(LogsResponse { count: records.len(), capacity: log.capacity(), records }))
}

pub async fn clear_logs(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse { cleared: state.runtime.engine().log().clear() })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let engine = state.runtime.engine();
    let counts = engine.log().outcome_counts();
    Json(StatsResponse {
        total: counts.total,
        capacity: engine.log().capacity(),
        function_count: engine.registry().len(),
        by_outcome: counts.by_outcome,
    })
}
