use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::engine::types::MasteryScope;
use crate::response::AppError;
use crate::routes::SuccessResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/students/{student_id}/courses/{course_id}/due",
            get(due_items),
        )
        .route("/api/students/{student_id}/mastery", get(mastery))
        .route(
            "/api/students/{student_id}/core-loops/{core_loop_id}/reset",
            post(reset_review_state),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DueQuery {
    as_of: Option<DateTime<Utc>>,
}

async fn due_items(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
    Query(query): Query<DueQuery>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    let items = state.engine.due_items(&student_id, &course_id, as_of).await?;
    Ok(Json(SuccessResponse::new(items)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasteryQuery {
    scope: String,
    id: String,
}

async fn mastery(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Query(query): Query<MasteryQuery>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let scope = match query.scope.as_str() {
        "course" => MasteryScope::Course(query.id),
        "topic" => MasteryScope::Topic(query.id),
        "core_loop" => MasteryScope::CoreLoop(query.id),
        other => {
            return Err(AppError::bad_request(format!(
                "unknown mastery scope '{other}'"
            )))
        }
    };
    let report = state.engine.mastery(&student_id, scope).await?;
    Ok(Json(SuccessResponse::new(report)))
}

async fn reset_review_state(
    State(state): State<AppState>,
    Path((student_id, core_loop_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let fresh = state
        .engine
        .reset_review_state(&student_id, &core_loop_id)
        .await?;
    Ok(Json(SuccessResponse::new(fresh)))
}
