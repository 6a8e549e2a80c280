//! Persistence seam. Handlers and accessors talk to `dyn Store`; `PgStore`
//! is the production backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Interview, InterviewChanges, JobInfo, JobInfoChanges, NewInterview, NewJobInfo, NewQuestion,
    NewUser, Question, User,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

/// A record together with the user id that owns it through its job info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owned<T> {
    pub owner_id: String,
    pub record: T,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<User>, sqlx::Error>;
    async fn upsert_user(&self, user: NewUser) -> Result<User, sqlx::Error>;

    async fn find_job_info(&self, id: Uuid) -> Result<Option<JobInfo>, sqlx::Error>;
    async fn list_job_infos(&self, user_id: &str) -> Result<Vec<JobInfo>, sqlx::Error>;
    async fn insert_job_info(&self, job_info: NewJobInfo) -> Result<JobInfo, sqlx::Error>;
    async fn update_job_info(
        &self,
        id: Uuid,
        changes: JobInfoChanges,
    ) -> Result<JobInfo, sqlx::Error>;

    async fn find_question(&self, id: Uuid) -> Result<Option<Owned<Question>>, sqlx::Error>;
    /// Oldest first.
    async fn list_questions(&self, job_info_id: Uuid) -> Result<Vec<Question>, sqlx::Error>;
    async fn insert_question(&self, question: NewQuestion) -> Result<Question, sqlx::Error>;
    async fn count_questions_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error>;

    async fn find_interview(&self, id: Uuid) -> Result<Option<Owned<Interview>>, sqlx::Error>;
    /// Newest first.
    async fn list_interviews(&self, job_info_id: Uuid) -> Result<Vec<Interview>, sqlx::Error>;
    async fn insert_interview(&self, interview: NewInterview) -> Result<Interview, sqlx::Error>;
    async fn update_interview(
        &self,
        id: Uuid,
        changes: InterviewChanges,
    ) -> Result<Interview, sqlx::Error>;
    /// Counts only interviews that were actually held (have a linked chat).
    async fn count_interviews_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error>;
}
