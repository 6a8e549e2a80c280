use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::LlmError;
use crate::voice::VoiceError;

/// Shown when a metered operation is denied by the caller's subscription plan.
pub const PLAN_LIMIT_MESSAGE: &str = "You have reached the limit of your current plan";

/// Shown when the per-user token bucket is empty.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please slow down";

/// Reported by procedure-style endpoints for server-side faults.
pub const GENERIC_ACTION_MESSAGE: &str = "Something went wrong, please try again";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or foreign resources share this variant so callers cannot
    /// tell the two apart.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Plan limit reached")]
    PlanLimit,

    #[error("Rate limited")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Voice provider error: {0}")]
    Voice(#[from] VoiceError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            AppError::PlanLimit => (
                StatusCode::FORBIDDEN,
                "PLAN_LIMIT",
                PLAN_LIMIT_MESSAGE.to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT",
                RATE_LIMIT_MESSAGE.to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Voice(e) => {
                tracing::error!("Voice provider error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "VOICE_ERROR",
                    "A voice provider error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Discriminated result returned by the procedure-style endpoints.
///
/// Serializes to `{ "error": false, "id": ... }` or
/// `{ "error": true, "message": ... }`; always sent with HTTP 200 so callers
/// branch on the `error` flag instead of the status code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionResult {
    Ok { error: bool, id: Uuid },
    Err { error: bool, message: String },
}

impl ActionResult {
    pub fn ok(id: Uuid) -> Self {
        ActionResult::Ok { error: false, id }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ActionResult::Err {
            error: true,
            message: message.into(),
        }
    }

    pub fn from_outcome(outcome: Result<Uuid, AppError>) -> Self {
        match outcome {
            Ok(id) => ActionResult::ok(id),
            Err(e) => e.into(),
        }
    }
}

/// Client errors keep their message; server faults are logged and reported
/// generically.
impl From<AppError> for ActionResult {
    fn from(e: AppError) -> Self {
        match e {
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::UnprocessableEntity(msg) => ActionResult::err(msg),
            AppError::Unauthorized => ActionResult::err("Unauthorized"),
            AppError::PlanLimit => ActionResult::err(PLAN_LIMIT_MESSAGE),
            AppError::RateLimited => ActionResult::err(RATE_LIMIT_MESSAGE),
            other => {
                tracing::error!("Action failed: {other}");
                ActionResult::err(GENERIC_ACTION_MESSAGE)
            }
        }
    }
}

impl IntoResponse for ActionResult {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
