//! Axum route handler for resume analysis.

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::permissions::can_run_resume_analysis;
use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::JobInfo;
use crate::questions::handlers::JOB_INFO_NOT_FOUND;
use crate::resumes::extract::{
    extract_text_blocking, ResumeFormat, FILE_TOO_LARGE_MESSAGE, INVALID_FILE_TYPE_MESSAGE,
    MAX_RESUME_BYTES,
};
use crate::resumes::prompts::analysis_request;
use crate::state::AppState;

const INVALID_BODY_MESSAGE: &str = "Invalid request body";

/// Request body cap for the analyze route. Anything between the file limit
/// and this cap is read and rejected with the file-size message.
pub const RESUME_BODY_LIMIT: usize = 2 * MAX_RESUME_BYTES;

struct ResumeUpload {
    job_info_id: Uuid,
    format: ResumeFormat,
    data: Bytes,
}

fn multipart_error(e: MultipartError) -> AppError {
    debug!("Rejected multipart body: {e}");
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation(FILE_TOO_LARGE_MESSAGE.to_string())
    } else {
        AppError::Validation(INVALID_BODY_MESSAGE.to_string())
    }
}

/// Buffers a file field, giving up as soon as it passes the size limit.
async fn read_limited(field: &mut Field<'_>) -> Result<Bytes, AppError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > MAX_RESUME_BYTES {
            return Err(AppError::Validation(FILE_TOO_LARGE_MESSAGE.to_string()));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

/// Reads `resumeFile` and `jobInfoId` and applies the upload rules in
/// order: both present, file within the size limit, allowed MIME type.
async fn read_upload(mut multipart: Multipart) -> Result<ResumeUpload, AppError> {
    let mut file: Option<(Option<String>, Bytes)> = None;
    let mut job_info_id: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();
        match name.as_str() {
            "resumeFile" => {
                let content_type = field.content_type().map(|s| s.to_string());
                let data = read_limited(&mut field).await?;
                file = Some((content_type, data));
            }
            "jobInfoId" => {
                job_info_id = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (Some((content_type, data)), Some(job_info_id)) = (file, job_info_id) else {
        return Err(AppError::Validation(INVALID_BODY_MESSAGE.to_string()));
    };
    if data.is_empty() {
        return Err(AppError::Validation(INVALID_BODY_MESSAGE.to_string()));
    }

    let format = content_type
        .as_deref()
        .and_then(ResumeFormat::from_mime)
        .ok_or_else(|| AppError::Validation(INVALID_FILE_TYPE_MESSAGE.to_string()))?;

    let job_info_id = Uuid::parse_str(job_info_id.trim())
        .map_err(|_| AppError::Validation(INVALID_BODY_MESSAGE.to_string()))?;

    Ok(ResumeUpload {
        job_info_id,
        format,
        data,
    })
}

/// POST /ai/resumes/analyze
///
/// Multipart form with `resumeFile` and `jobInfoId`. Streams the JSON
/// analysis report back as plain text.
pub async fn handle_analyze_resume(
    State(state): State<AppState>,
    identity: Identity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let multipart = multipart.map_err(|e| {
        debug!("Rejected resume upload: {e}");
        AppError::Validation(INVALID_BODY_MESSAGE.to_string())
    })?;
    let upload = read_upload(multipart).await?;
    let user_id = identity.require_user()?;

    if !can_run_resume_analysis(&identity) {
        return Err(AppError::PlanLimit);
    }

    let job_info = state
        .repo
        .authorized_get::<JobInfo>(upload.job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    let resume_text = extract_text_blocking(upload.format, upload.data).await?;
    info!(
        "Analyzing {:?} resume ({} chars) for job info {}",
        upload.format,
        resume_text.len(),
        job_info.id
    );

    let tokens = state
        .llm
        .stream(&analysis_request(&job_info, &resume_text))
        .await?;

    let job_info_id = job_info.id;
    let body = Body::from_stream(tokens.map(move |chunk| {
        if let Err(e) = &chunk {
            warn!("Resume analysis for job info {job_info_id} failed mid-stream: {e}");
        }
        chunk.map(Bytes::from)
    }));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}
