use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::types::{QuizFilters, QuizType, SubmitOptions};
use crate::response::AppError;
use crate::routes::SuccessResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{session_id}", get(session_status))
        .route("/api/sessions/{session_id}/next", get(next_question))
        .route("/api/sessions/{session_id}/answers", post(submit_answer))
        .route("/api/sessions/{session_id}/complete", post(complete_session))
        .route("/api/sessions/{session_id}/abandon", post(abandon_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    student_id: String,
    course_id: String,
    quiz_type: Option<String>,
    count: Option<usize>,
    #[serde(default)]
    filters: QuizFilters,
    prioritize_due: Option<bool>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let quiz_type = QuizType::from_str(request.quiz_type.as_deref().unwrap_or("random"));
    let session = state
        .engine
        .create_session(
            &request.student_id,
            &request.course_id,
            quiz_type,
            request.count.unwrap_or(10),
            request.filters,
            request.prioritize_due.unwrap_or(false),
        )
        .await?;
    Ok(Json(SuccessResponse::new(session)))
}

async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let status = state.engine.session_status(session_id).await?;
    Ok(Json(SuccessResponse::new(status)))
}

async fn next_question(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let next = state.engine.next_question(session_id).await?;
    Ok(Json(SuccessResponse::new(next)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswerRequest {
    exercise_id: String,
    user_answer: String,
    #[serde(default)]
    time_taken_s: f64,
    #[serde(default)]
    hint_used: bool,
    #[serde(default)]
    evaluator_fallback: bool,
    #[serde(default)]
    dry_run: bool,
    expected_time_s: Option<f64>,
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let outcome = state
        .engine
        .submit_answer(
            session_id,
            &request.exercise_id,
            &request.user_answer,
            request.time_taken_s,
            request.hint_used,
            SubmitOptions {
                evaluator_fallback: request.evaluator_fallback,
                dry_run: request.dry_run,
                expected_time_s: request.expected_time_s,
            },
        )
        .await?;
    Ok(Json(SuccessResponse::new(outcome)))
}

async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    let summary = state.engine.complete_session(session_id).await?;
    Ok(Json(SuccessResponse::new(summary)))
}

async fn abandon_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<impl serde::Serialize>>, AppError> {
    state.engine.abandon_session(session_id).await?;
    Ok(Json(SuccessResponse::new(serde_json::json!({
        "abandoned": true
    }))))
}
