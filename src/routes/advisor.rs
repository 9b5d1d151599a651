use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::AppError;
use crate::routes::SuccessResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/students/{student_id}/core-loops/{core_loop_id}/depth",
            get(recommended_depth),
        )
        .route(
            "/api/students/{student_id}/core-loops/{core_loop_id}/prerequisites",
            get(prerequisite_visibility),
        )
        .route(
            "/api/students/{student_id}/core-loops/{core_loop_id}/learn",
            post(gate_learn),
        )
        .route(
            "/api/students/{student_id}/courses/{course_id}/learning-path",
            get(learning_path),
        )
        .route(
            "/api/students/{student_id}/courses/{course_id}/gaps",
            get(knowledge_gaps),
        )
        .route(
            "/api/students/{student_id}/courses/{course_id}/summary",
            get(course_summary),
        )
        .route(
            "/api/students/{student_id}/courses/{course_id}/topics",
            get(topic_breakdown),
        )
        .route(
            "/api/students/{student_id}/courses/{course_id}/suggestions",
            get(study_suggestions),
        )
}

async fn recommended_depth(
    State(state): State<AppState>,
    Path((student_id, core_loop_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let depth = state
        .engine
        .recommended_depth(&student_id, &core_loop_id)
        .await?;
    Ok(Json(SuccessResponse::new(serde_json::json!({
        "depth": depth
    }))))
}

async fn prerequisite_visibility(
    State(state): State<AppState>,
    Path((student_id, core_loop_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let show = state
        .engine
        .should_show_prerequisites(&student_id, &core_loop_id)
        .await?;
    Ok(Json(SuccessResponse::new(serde_json::json!({
        "showPrerequisites": show
    }))))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearnRequest {
    #[serde(default)]
    force: bool,
}

async fn gate_learn(
    State(state): State<AppState>,
    Path((student_id, core_loop_id)): Path<(String, String)>,
    request: Option<Json<LearnRequest>>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let force = request.map(|Json(r)| r.force).unwrap_or(false);
    state
        .engine
        .gate_learn(&student_id, &core_loop_id, force)
        .await?;
    Ok(Json(SuccessResponse::new(serde_json::json!({
        "allowed": true
    }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningPathQuery {
    limit: Option<usize>,
}

async fn learning_path(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
    Query(query): Query<LearningPathQuery>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let path = state
        .engine
        .learning_path(&student_id, &course_id, query.limit.unwrap_or(10))
        .await?;
    Ok(Json(SuccessResponse::new(path)))
}

async fn knowledge_gaps(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let gaps = state.engine.knowledge_gaps(&student_id, &course_id).await?;
    Ok(Json(SuccessResponse::new(gaps)))
}

async fn course_summary(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let summary = state.engine.course_summary(&student_id, &course_id).await?;
    Ok(Json(SuccessResponse::new(summary)))
}

async fn topic_breakdown(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let topics = state.engine.topic_breakdown(&student_id, &course_id).await?;
    Ok(Json(SuccessResponse::new(topics)))
}

async fn study_suggestions(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let suggestions = state
        .engine
        .study_suggestions(&student_id, &course_id)
        .await?;
    Ok(Json(SuccessResponse::new(suggestions)))
}
