use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::engine::types::EngineError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            details: None,
            is_operational: false,
        }
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            is_operational: true,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::NoCandidates => {
                Self::operational(StatusCode::NOT_FOUND, "NO_CANDIDATES", message)
            }
            EngineError::InvalidFilter(_) => {
                Self::operational(StatusCode::BAD_REQUEST, "INVALID_FILTER", message)
            }
            EngineError::SessionNotFound(_) => {
                Self::operational(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", message)
            }
            EngineError::SessionBusy => {
                Self::operational(StatusCode::CONFLICT, "SESSION_BUSY", message)
            }
            EngineError::SessionComplete => {
                Self::operational(StatusCode::CONFLICT, "SESSION_COMPLETE", message)
            }
            EngineError::AlreadyAnswered { .. } => {
                Self::operational(StatusCode::CONFLICT, "ALREADY_ANSWERED", message)
            }
            EngineError::OutOfOrderSubmission { .. } => {
                Self::operational(StatusCode::CONFLICT, "OUT_OF_ORDER_SUBMISSION", message)
            }
            EngineError::EvaluatorUnavailable(_) => {
                Self::operational(StatusCode::SERVICE_UNAVAILABLE, "EVALUATOR_UNAVAILABLE", message)
            }
            EngineError::PrerequisiteBlocked { ref weak_prereqs } => {
                Self::operational(StatusCode::CONFLICT, "PREREQUISITE_BLOCKED", message)
                    .with_details(serde_json::json!({ "weakPrereqs": weak_prereqs }))
            }
            EngineError::WouldCreateCycle { .. } => {
                Self::operational(StatusCode::CONFLICT, "WOULD_CREATE_CYCLE", message)
            }
            EngineError::InternalInvariantViolated(_) | EngineError::Sql(_) => {
                tracing::error!(error = %message, "engine internal error");
                Self::internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            "internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}
