//! Axum route handlers for the Questions API.

use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::can_create_question;
use crate::auth::Identity;
use crate::errors::AppError;
use crate::llm_client::TokenStream;
use crate::models::{JobInfo, NewQuestion, Question, QuestionDifficulty};
use crate::questions::prompts::{feedback_request, question_request};
use crate::resources::Repository;
use crate::state::AppState;
use crate::validation::parse_body;

pub const JOB_INFO_NOT_FOUND: &str = "Job info not found";
pub const QUESTION_NOT_FOUND: &str = "Question not found";
const GENERATION_FAILED: &str = "Failed to generate question";
const FEEDBACK_FAILED: &str = "Failed to generate feedback";

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuestionRequest {
    /// Requested difficulty.
    pub prompt: QuestionDifficulty,
    pub job_info_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFeedbackRequest {
    /// The candidate's answer.
    #[validate(length(min = 1))]
    pub prompt: String,
    pub question_id: Uuid,
}

// ────────────────────────────────────────────────────────────────────────────
// Stream events
// ────────────────────────────────────────────────────────────────────────────

/// A chunk of generated text. Data is a JSON string so whitespace and
/// newlines survive the SSE framing.
fn token_event(text: &str) -> Event {
    Event::default()
        .event("token")
        .data(serde_json::Value::from(text).to_string())
}

fn data_event(value: serde_json::Value) -> Event {
    Event::default().event("data").data(value.to_string())
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "message": message }).to_string())
}

pub type EventStream = Sse<BoxStream<'static, Result<Event, Infallible>>>;

fn into_sse<S>(events: S) -> EventStream
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(events.boxed()).keep_alive(KeepAlive::default())
}

/// Forwards every chunk as a `token` event. On success the complete,
/// trimmed text is persisted as a question and its id sent as the final
/// `data` event; any failure ends the stream with an `error` event and no
/// write.
fn question_events(
    tokens: TokenStream,
    repo: Repository,
    job_info_id: Uuid,
    difficulty: QuestionDifficulty,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream! {
        let mut tokens = tokens;
        let mut text = String::new();

        while let Some(chunk) = tokens.next().await {
            match chunk {
                Ok(chunk) => {
                    text.push_str(&chunk);
                    yield Ok(token_event(&chunk));
                }
                Err(e) => {
                    warn!("Question generation for job info {job_info_id} failed: {e}");
                    yield Ok(error_event(GENERATION_FAILED));
                    return;
                }
            }
        }

        let question_text = text.trim().to_string();
        if question_text.is_empty() {
            warn!("Question generation for job info {job_info_id} returned no text");
            yield Ok(error_event(GENERATION_FAILED));
            return;
        }

        let inserted = repo
            .insert_question(NewQuestion {
                job_info_id,
                text: question_text,
                difficulty,
            })
            .await;

        match inserted {
            Ok(question) => {
                info!("Generated question {} for job info {job_info_id}", question.id);
                yield Ok(data_event(json!({ "questionId": question.id })));
            }
            Err(e) => {
                warn!("Failed to persist generated question: {e}");
                yield Ok(error_event(GENERATION_FAILED));
            }
        }
    }
}

fn feedback_events(
    tokens: TokenStream,
    question_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream! {
        let mut tokens = tokens;
        while let Some(chunk) = tokens.next().await {
            match chunk {
                Ok(chunk) => yield Ok(token_event(&chunk)),
                Err(e) => {
                    warn!("Feedback for question {question_id} failed: {e}");
                    yield Ok(error_event(FEEDBACK_FAILED));
                    return;
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /ai/questions/generate-question
pub async fn handle_generate_question(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> Result<EventStream, AppError> {
    let req: GenerateQuestionRequest = parse_body(&body)?;
    let user_id = identity.require_user()?;

    if !can_create_question(&identity, state.repo.store()).await? {
        return Err(AppError::PlanLimit);
    }

    let job_info = state
        .repo
        .authorized_get::<JobInfo>(req.job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    let previous = state.repo.list_questions(job_info.id).await?;
    let request = question_request(&job_info, &previous, req.prompt);
    let tokens = state.llm.stream(&request).await?;

    Ok(into_sse(question_events(
        tokens,
        state.repo.clone(),
        job_info.id,
        req.prompt,
    )))
}

/// POST /ai/questions/generate-feedback
pub async fn handle_generate_feedback(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> Result<EventStream, AppError> {
    let req: GenerateFeedbackRequest = parse_body(&body)?;
    let user_id = identity.require_user()?;

    let question = state
        .repo
        .authorized_get::<Question>(req.question_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(QUESTION_NOT_FOUND.to_string()))?;

    let tokens = state
        .llm
        .stream(&feedback_request(&question.text, &req.prompt))
        .await?;

    Ok(into_sse(feedback_events(tokens, question.id)))
}

/// GET /api/job-infos/:id/questions
pub async fn handle_list_questions(
    State(state): State<AppState>,
    identity: Identity,
    Path(job_info_id): Path<Uuid>,
) -> Result<Json<Vec<Question>>, AppError> {
    let user_id = identity.require_user()?;

    let job_info = state
        .repo
        .authorized_get::<JobInfo>(job_info_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(JOB_INFO_NOT_FOUND.to_string()))?;

    Ok(Json(state.repo.list_questions(job_info.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::{FIVE_QUESTIONS, UNLIMITED_QUESTIONS};
    use crate::test_support::{sse_events, token_for, ScriptedModel, TestApp};
    use axum::http::{Method, StatusCode};

    const GENERATE: &str = "/ai/questions/generate-question";
    const FEEDBACK: &str = "/ai/questions/generate-feedback";

    #[tokio::test]
    async fn test_generate_question_streams_then_persists() {
        let app = TestApp::new(ScriptedModel::replying("How would you shard a queue?"));
        let job_info = app.job_info_for("user_a").await;
        let token = token_for("user_a", &[UNLIMITED_QUESTIONS]);

        let (status, body) = app
            .json(
                Method::POST,
                GENERATE,
                Some(&token),
                json!({ "prompt": "hard", "jobInfoId": job_info.id }),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let events = sse_events(&body);
        let text: String = events
            .iter()
            .filter(|(event, _)| event == "token")
            .map(|(_, data)| serde_json::from_str::<String>(data).unwrap())
            .collect();
        assert_eq!(text, "How would you shard a queue?");

        let (event, data) = events.last().unwrap();
        assert_eq!(event, "data");
        let question_id: Uuid = serde_json::from_str::<serde_json::Value>(data).unwrap()
            ["questionId"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();

        let saved = app.state.repo.list_questions(job_info.id).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, question_id);
        assert_eq!(saved[0].difficulty, QuestionDifficulty::Hard);
    }

    #[tokio::test]
    async fn test_sequential_generations_yield_distinct_ids() {
        let app = TestApp::new(ScriptedModel::replying("Explain backpressure."));
        let job_info = app.job_info_for("user_a").await;
        let token = token_for("user_a", &[UNLIMITED_QUESTIONS]);

        let mut ids = Vec::new();
        for _ in 0..2 {
            let (_, body) = app
                .json(
                    Method::POST,
                    GENERATE,
                    Some(&token),
                    json!({ "prompt": "easy", "jobInfoId": job_info.id }),
                )
                .await;
            let data_events: Vec<_> = sse_events(&body)
                .into_iter()
                .filter(|(event, _)| event == "data")
                .collect();
            assert_eq!(data_events.len(), 1);
            ids.push(data_events[0].1.clone());
        }

        assert_ne!(ids[0], ids[1]);
        assert_eq!(app.store.question_count().await, 2);

        // The second call saw the first question as history.
        let request = app.llm.last_request().unwrap();
        assert_eq!(request.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_foreign_job_info_is_not_found_and_nothing_is_written() {
        let app = TestApp::new(ScriptedModel::replying("unused"));
        let job_info = app.job_info_for("user_a").await;
        let token = token_for("user_b", &[UNLIMITED_QUESTIONS]);

        let (status, body) = app
            .json(
                Method::POST,
                GENERATE,
                Some(&token),
                json!({ "prompt": "easy", "jobInfoId": job_info.id }),
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["message"], JOB_INFO_NOT_FOUND);
        assert_eq!(app.store.question_count().await, 0);
        assert_eq!(app.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_rejected_without_writes() {
        let app = TestApp::new(ScriptedModel::replying("unused"));
        let job_info = app.job_info_for("user_a").await;
        let token = token_for("user_a", &[UNLIMITED_QUESTIONS]);
        let writes_before = app.store.writes();

        for payload in [
            json!({ "prompt": "impossible", "jobInfoId": job_info.id }),
            json!({ "prompt": "easy" }),
            json!({ "prompt": "easy", "jobInfoId": "not-a-uuid" }),
            json!([]),
        ] {
            let (status, _) = app.json(Method::POST, GENERATE, Some(&token), payload).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        assert_eq!(app.store.writes(), writes_before);
        assert_eq!(app.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_precedes_authentication() {
        let app = TestApp::new(ScriptedModel::replying("unused"));
        let job_info = app.job_info_for("user_a").await;

        let (status, _) = app
            .json(Method::POST, GENERATE, None, json!({ "prompt": "nope" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .json(
                Method::POST,
                GENERATE,
                None,
                json!({ "prompt": "easy", "jobInfoId": job_info.id }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plan_limit_blocks_sixth_question() {
        let app = TestApp::new(ScriptedModel::replying("Next question?"));
        let job_info = app.job_info_for("user_a").await;
        let token = token_for("user_a", &[FIVE_QUESTIONS]);

        for _ in 0..5 {
            let (status, _) = app
                .json(
                    Method::POST,
                    GENERATE,
                    Some(&token),
                    json!({ "prompt": "medium", "jobInfoId": job_info.id }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = app
            .json(
                Method::POST,
                GENERATE,
                Some(&token),
                json!({ "prompt": "medium", "jobInfoId": job_info.id }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(app.store.question_count().await, 5);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_sends_error_and_writes_nothing() {
        let app = TestApp::new(ScriptedModel::failing_mid_stream("Partial question text"));
        let job_info = app.job_info_for("user_a").await;
        let token = token_for("user_a", &[UNLIMITED_QUESTIONS]);

        let (status, body) = app
            .json(
                Method::POST,
                GENERATE,
                Some(&token),
                json!({ "prompt": "easy", "jobInfoId": job_info.id }),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let events = sse_events(&body);
        assert_eq!(events.last().unwrap().0, "error");
        assert!(events.iter().all(|(event, _)| event != "data"));
        assert_eq!(app.store.question_count().await, 0);
    }

    #[tokio::test]
    async fn test_feedback_streams_for_owner_only() {
        let app = TestApp::new(ScriptedModel::replying("## Rating: 7/10 Solid answer."));
        let job_info = app.job_info_for("user_a").await;
        let question = app
            .state
            .repo
            .insert_question(NewQuestion {
                job_info_id: job_info.id,
                text: "What is a mutex?".to_string(),
                difficulty: QuestionDifficulty::Easy,
            })
            .await
            .unwrap();

        let (status, body) = app
            .json(
                Method::POST,
                FEEDBACK,
                Some(&token_for("user_a", &[])),
                json!({ "prompt": "A lock.", "questionId": question.id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(sse_events(&body).iter().all(|(event, _)| event == "token"));

        let (status, _) = app
            .json(
                Method::POST,
                FEEDBACK,
                Some(&token_for("user_b", &[])),
                json!({ "prompt": "A lock.", "questionId": question.id }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_feedback_requires_an_answer() {
        let app = TestApp::new(ScriptedModel::replying("unused"));
        let (status, _) = app
            .json(
                Method::POST,
                FEEDBACK,
                Some(&token_for("user_a", &[])),
                json!({ "prompt": "", "questionId": Uuid::new_v4() }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
