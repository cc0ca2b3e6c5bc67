use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use mailfn_agent::AgentRuntime;
use mailfn_core::ResolutionFailureReason;
use serde::Serialize;
use tracing::warn;

use crate::api::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub backend: HealthCheck,
    pub functions: HealthCheck,
    pub function_count: usize,
    pub checked_at: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let backend = backend_check(&state.runtime).await;
    let function_count = state.runtime.engine().registry().len();
    let functions = if function_count > 0 {
        HealthCheck { status: "ready", detail: format!("{function_count} functions registered") }
    } else {
        HealthCheck { status: "degraded", detail: "no functions registered".to_string() }
    };
    let ready = backend.status == "ready" && functions.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "mailfn-server runtime initialized".to_string(),
        },
        backend,
        functions,
        function_count,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn backend_check(runtime: &AgentRuntime) -> HealthCheck {
    let provider = runtime.resolver().backend().provider();
    match runtime.backend_health().await {
        Ok(()) => HealthCheck { status: "ready", detail: format!("{provider} backend reachable") },
        Err(error) => {
            warn!(
                event_name = "health.backend_unavailable",
                provider,
                error = %error,
                "backend health check failed"
            );
            HealthCheck {
                status: "degraded",
                detail: format!(
                    "{}: health check against {provider} failed: {error}",
                    ResolutionFailureReason::BackendUnavailable
                ),
            }
        }
    }
}
