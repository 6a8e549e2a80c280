pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::interviews::{actions as interview_actions, handlers as interview_handlers};
use crate::job_infos::handlers as job_infos;
use crate::questions::handlers as questions;
use crate::resumes::handlers::{self as resumes, RESUME_BODY_LIMIT};
use crate::state::AppState;
use crate::users::handlers as users;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Users
        .route(
            "/api/users/me",
            get(users::handle_get_me).put(users::handle_sync_me),
        )
        // Job infos
        .route(
            "/api/job-infos",
            get(job_infos::handle_list_job_infos).post(job_infos::handle_create_job_info),
        )
        .route(
            "/api/job-infos/:id",
            get(job_infos::handle_get_job_info).patch(job_infos::handle_update_job_info),
        )
        .route(
            "/api/job-infos/:id/questions",
            get(questions::handle_list_questions),
        )
        .route(
            "/api/job-infos/:id/interviews",
            get(interview_handlers::handle_list_interviews),
        )
        .route(
            "/api/job-infos/:id/interviews/token",
            post(interview_handlers::handle_voice_token),
        )
        // Interviews
        .route(
            "/api/interviews",
            post(interview_actions::handle_create_interview),
        )
        .route(
            "/api/interviews/:id",
            get(interview_handlers::handle_get_interview)
                .patch(interview_actions::handle_update_interview),
        )
        .route(
            "/api/interviews/:id/feedback",
            post(interview_actions::handle_generate_feedback),
        )
        .route(
            "/api/interviews/:id/messages",
            get(interview_handlers::handle_interview_messages),
        )
        // AI generation
        .route(
            "/ai/questions/generate-question",
            post(questions::handle_generate_question),
        )
        .route(
            "/ai/questions/generate-feedback",
            post(questions::handle_generate_feedback),
        )
        .route(
            "/ai/resumes/analyze",
            post(resumes::handle_analyze_resume).layer(DefaultBodyLimit::max(RESUME_BODY_LIMIT)),
        )
        .with_state(state)
}
