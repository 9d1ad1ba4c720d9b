//! HTTP surface
//!
//! `POST /execute` runs code in the sandbox, `GET /health` reports liveness.
//! Failures travel in the body (`success: false`), never in the status code.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::sandbox::{CodeExecutor, ExecutionRequest, ExecutionResult};

type SharedExecutor = Arc<dyn CodeExecutor>;

// ---- Handlers ----

async fn execute(
    State(executor): State<SharedExecutor>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Json<Value> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected execution request body");
            return Json(ExecutionResult::server_error(rejection.body_text()).into_json());
        }
    };

    let result = match executor.execute(request).await {
        Ok(result) => result,
        Err(e) => {
            error!(executor = executor.name(), error = %e, "Execution failed");
            ExecutionResult::server_error(&e)
        }
    };

    Json(result.into_json())
}

async fn health(State(executor): State<SharedExecutor>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "containers": executor.container_count().await,
    }))
}

// ---- Router ----

pub fn build_router(executor: SharedExecutor) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .with_state(executor)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
