//! Axum route handlers for the Job Infos API.

use axum::{
    extract::{Path, State},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Identity;
use crate::errors::{ActionResult, AppError};
use crate::models::{ExperienceLevel, JobInfo, JobInfoChanges, NewJobInfo};
use crate::questions::handlers::JOB_INFO_NOT_FOUND;
use crate::state::AppState;
use crate::validation::{not_blank, parse_body};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobInfoRequest {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub title: String,
    #[validate(length(min = 1), custom = "not_blank")]
    pub description: String,
    pub experience_level: ExperienceLevel,
}

async fn create_job_info(
    state: &AppState,
    identity: &Identity,
    body: &[u8],
) -> Result<Uuid, AppError> {
    let req: JobInfoRequest = parse_body(body)?;
    let user_id = identity.require_user()?;
    identity.ensure_user(&state.repo).await?;

    let job_info = state
        .repo
        .insert_job_info(NewJobInfo {
            user_id: user_id.to_string(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            experience_level: req.experience_level,
        })
        .await?;

    info!("Created job info {} for {user_id}", job_info.id);
    Ok(job_info.id)
}

async fn update_job_info(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    body: &[u8],
) -> Result<Uuid, AppError> {
    let req: JobInfoRequest = parse_body(body)?;
    let user_id = identity.require_user()?;

    let existing = state
        .repo
        .authorized_get::<JobInfo>(id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    let job_info = state
        .repo
        .update_job_info(
            existing.id,
            JobInfoChanges {
                title: req.title.trim().to_string(),
                description: req.description.trim().to_string(),
                experience_level: req.experience_level,
            },
        )
        .await?;

    Ok(job_info.id)
}

/// POST /api/job-infos
pub async fn handle_create_job_info(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> ActionResult {
    ActionResult::from_outcome(create_job_info(&state, &identity, &body).await)
}

/// PATCH /api/job-infos/:id
pub async fn handle_update_job_info(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ActionResult {
    ActionResult::from_outcome(update_job_info(&state, &identity, id, &body).await)
}

/// GET /api/job-infos
pub async fn handle_list_job_infos(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<JobInfo>>, AppError> {
    let user_id = identity.require_user()?;
    Ok(Json(state.repo.list_job_infos(user_id).await?))
}

/// GET /api/job-infos/:id
pub async fn handle_get_job_info(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<JobInfo>, AppError> {
    let user_id = identity.require_user()?;
    let job_info = state
        .repo
        .authorized_get::<JobInfo>(id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;
    Ok(Json(job_info))
}
