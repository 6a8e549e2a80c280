//! Procedure-style interview endpoints.
//!
//! Each returns an `ActionResult` with HTTP 200; failures are reported in
//! the body instead of the status code.

use axum::extract::{Path, State};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::can_create_interview;
use crate::auth::Identity;
use crate::errors::{ActionResult, AppError};
use crate::interviews::prompts::feedback_request;
use crate::models::interview::EMPTY_DURATION;
use crate::models::{Interview, InterviewChanges, JobInfo, NewInterview};
use crate::questions::handlers::JOB_INFO_NOT_FOUND;
use crate::rate_limit::enforce;
use crate::state::AppState;
use crate::validation::{chat_id, hh_mm_ss, parse_body};
use crate::voice::condense_chat_messages;

pub const INTERVIEW_NOT_FOUND: &str = "Interview not found";
pub const NO_CHAT_MESSAGE: &str = "Interview has no chat";
pub const FEEDBACK_FAILED_MESSAGE: &str = "Failed to generate feedback";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    pub job_info_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInterviewRequest {
    #[validate(custom = "chat_id")]
    pub hume_chat_id: Option<String>,
    #[validate(custom = "hh_mm_ss")]
    pub duration: Option<String>,
}

async fn create_interview(
    state: &AppState,
    identity: &Identity,
    body: &[u8],
) -> Result<Uuid, AppError> {
    let req: CreateInterviewRequest = parse_body(body)?;
    let user_id = identity.require_user()?;

    if !can_create_interview(identity, state.repo.store()).await? {
        return Err(AppError::PlanLimit);
    }

    let job_info = state
        .repo
        .authorized_get::<JobInfo>(req.job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    enforce(state.rate_limiter.as_ref(), user_id).await?;

    let interview = state
        .repo
        .insert_interview(NewInterview {
            job_info_id: job_info.id,
            duration: EMPTY_DURATION.to_string(),
        })
        .await?;

    info!("Created interview {} for job info {}", interview.id, job_info.id);
    Ok(interview.id)
}

async fn update_interview(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    body: &[u8],
) -> Result<Uuid, AppError> {
    let req: UpdateInterviewRequest = parse_body(body)?;
    let user_id = identity.require_user()?;

    let interview = state
        .repo
        .authorized_get::<Interview>(id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(INTERVIEW_NOT_FOUND.to_string()))?;

    let changes = InterviewChanges {
        hume_chat_id: req.hume_chat_id.map(|c| c.trim().to_string()),
        duration: req.duration,
        feedback: None,
    };
    if changes.is_empty() {
        return Ok(interview.id);
    }

    Ok(state.repo.update_interview(interview.id, changes).await?.id)
}

async fn generate_feedback(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
) -> Result<Uuid, AppError> {
    let user_id = identity.require_user()?;
    // The prompt addresses the candidate by name.
    let user = identity
        .load_user(&state.repo)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let interview = state
        .repo
        .authorized_get::<Interview>(id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(INTERVIEW_NOT_FOUND.to_string()))?;

    let Some(chat_id) = interview.hume_chat_id.as_deref() else {
        return Err(AppError::Validation(NO_CHAT_MESSAGE.to_string()));
    };

    let job_info = state
        .repo
        .authorized_get::<JobInfo>(interview.job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    let feedback = async {
        let events = state.voice.chat_events(chat_id).await?;
        let messages = condense_chat_messages(&events);
        let request = feedback_request(&job_info, &user.name, &interview.duration, &messages);
        Ok::<_, AppError>(state.llm.complete(&request).await?)
    }
    .await;

    let feedback = match feedback {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("Empty feedback for interview {}", interview.id);
            return Err(AppError::UnprocessableEntity(FEEDBACK_FAILED_MESSAGE.to_string()));
        }
        Err(e) => {
            warn!("Feedback for interview {} failed: {e}", interview.id);
            return Err(AppError::UnprocessableEntity(FEEDBACK_FAILED_MESSAGE.to_string()));
        }
    };

    let updated = state
        .repo
        .update_interview(
            interview.id,
            InterviewChanges {
                feedback: Some(feedback),
                ..Default::default()
            },
        )
        .await?;

    info!("Stored feedback for interview {}", updated.id);
    Ok(updated.id)
}

/// POST /api/interviews
pub async fn handle_create_interview(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> ActionResult {
    ActionResult::from_outcome(create_interview(&state, &identity, &body).await)
}

/// PATCH /api/interviews/:id
pub async fn handle_update_interview(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ActionResult {
    ActionResult::from_outcome(update_interview(&state, &identity, id, &body).await)
}

/// POST /api/interviews/:id/feedback
pub async fn handle_generate_feedback(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> ActionResult {
    ActionResult::from_outcome(generate_feedback(&state, &identity, id).await)
}
