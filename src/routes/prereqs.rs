use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::AppError;
use crate::routes::SuccessResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/prerequisites", post(add_edge))
        .route(
            "/api/core-loops/{core_loop_id}/prerequisites",
            get(prereqs_of),
        )
        .route(
            "/api/core-loops/{core_loop_id}/dependents",
            get(dependents_of),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddEdgeRequest {
    prereq_core_loop_id: String,
    dependent_core_loop_id: String,
}

async fn add_edge(
    State(state): State<AppState>,
    Json(request): Json<AddEdgeRequest>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    state
        .engine
        .add_prerequisite(
            &request.prereq_core_loop_id,
            &request.dependent_core_loop_id,
        )
        .await?;
    Ok(Json(SuccessResponse::new(serde_json::json!({
        "added": true
    }))))
}

async fn prereqs_of(
    State(state): State<AppState>,
    Path(core_loop_id): Path<String>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let prereqs = state.engine.prereqs_of(&core_loop_id).await?;
    Ok(Json(SuccessResponse::new(prereqs)))
}

async fn dependents_of(
    State(state): State<AppState>,
    Path(core_loop_id): Path<String>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let dependents = state.engine.dependents_of(&core_loop_id).await?;
    Ok(Json(SuccessResponse::new(dependents)))
}
