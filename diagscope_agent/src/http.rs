//! Simple-JSON datasource endpoints, nested under `/grafana`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use diagscope::{QueryRequest, QueryResult, RebuildSummary};
use serde_json::Value;
use tracing::{debug, warn};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let grafana = Router::new()
        .route("/", get(health))
        .route("/search", post(search))
        .route("/query", post(query))
        .route("/annotations", post(annotations))
        .route("/rebuild", post(rebuild));
    Router::new().nest("/grafana", grafana).with_state(state)
}

// datasource "Test connection"
async fn health() -> &'static str {
    "ok"
}

async fn search(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.store.search().await)
}

async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Json<Vec<QueryResult>> {
    debug!("query for {} targets", req.targets.len());
    Json(state.store.query(&req).await)
}

async fn annotations() -> Json<Vec<Value>> {
    Json(Vec::new())
}

/// Re-read the startup paths; the previous series keep serving on failure.
async fn rebuild(
    State(state): State<AppState>,
) -> Result<Json<RebuildSummary>, (StatusCode, String)> {
    match state.store.rebuild(&state.paths).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            warn!("rebuild failed: {e}");
            Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
    }
}
