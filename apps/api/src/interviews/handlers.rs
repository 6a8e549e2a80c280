//! Read endpoints and voice session tokens for interviews.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::permissions::can_create_interview;
use crate::auth::Identity;
use crate::errors::AppError;
use crate::interviews::actions::{INTERVIEW_NOT_FOUND, NO_CHAT_MESSAGE};
use crate::models::{Interview, JobInfo};
use crate::questions::handlers::JOB_INFO_NOT_FOUND;
use crate::state::AppState;
use crate::voice::{condense_chat_messages, CondensedMessage};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceTokenResponse {
    pub access_token: String,
}

async fn owned_interview(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
) -> Result<Interview, AppError> {
    let user_id = identity.require_user()?;
    state
        .repo
        .authorized_get::<Interview>(id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(INTERVIEW_NOT_FOUND.to_string()))
}

/// GET /api/interviews/:id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Interview>, AppError> {
    Ok(Json(owned_interview(&state, &identity, id).await?))
}

/// GET /api/interviews/:id/messages
///
/// The condensed transcript of the linked voice chat.
pub async fn handle_interview_messages(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CondensedMessage>>, AppError> {
    let interview = owned_interview(&state, &identity, id).await?;
    let chat_id = interview
        .hume_chat_id
        .ok_or_else(|| AppError::NotFound(NO_CHAT_MESSAGE.to_string()))?;

    let events = state.voice.chat_events(&chat_id).await?;
    Ok(Json(condense_chat_messages(&events)))
}

/// GET /api/job-infos/:id/interviews
///
/// Only interviews that were actually held, newest first.
pub async fn handle_list_interviews(
    State(state): State<AppState>,
    identity: Identity,
    Path(job_info_id): Path<Uuid>,
) -> Result<Json<Vec<Interview>>, AppError> {
    let user_id = identity.require_user()?;
    let job_info = state
        .repo
        .authorized_get::<JobInfo>(job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    let interviews = state
        .repo
        .list_interviews(job_info.id)
        .await?
        .into_iter()
        .filter(|i| i.hume_chat_id.is_some())
        .collect();
    Ok(Json(interviews))
}

/// POST /api/job-infos/:id/interviews/token
pub async fn handle_voice_token(
    State(state): State<AppState>,
    identity: Identity,
    Path(job_info_id): Path<Uuid>,
) -> Result<Json<VoiceTokenResponse>, AppError> {
    let user_id = identity.require_user()?;

    if !can_create_interview(&identity, state.repo.store()).await? {
        return Err(AppError::PlanLimit);
    }

    state
        .repo
        .authorized_get::<JobInfo>(job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    let access_token = state.voice.access_token().await?;
    Ok(Json(VoiceTokenResponse { access_token }))
}
