use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{Owned, Store};
use crate::models::{
    Interview, InterviewChanges, JobInfo, JobInfoChanges, NewInterview, NewJobInfo, NewQuestion,
    NewUser, Question, User,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct QuestionWithOwner {
    #[sqlx(flatten)]
    question: Question,
    owner_id: String,
}

#[derive(FromRow)]
struct InterviewWithOwner {
    #[sqlx(flatten)]
    interview: Interview,
    owner_id: String,
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn upsert_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, image_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name,
                    email = EXCLUDED.email,
                    image_url = EXCLUDED.image_url,
                    updated_at = now()
            RETURNING *
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.image_url)
        .fetch_one(&self.pool)
        .await?;

        info!("Upserted user {}", user.id);
        Ok(user)
    }

    async fn find_job_info(&self, id: Uuid) -> Result<Option<JobInfo>, sqlx::Error> {
        sqlx::query_as::<_, JobInfo>("SELECT * FROM job_infos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_job_infos(&self, user_id: &str) -> Result<Vec<JobInfo>, sqlx::Error> {
        sqlx::query_as::<_, JobInfo>(
            "SELECT * FROM job_infos WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn insert_job_info(&self, job_info: NewJobInfo) -> Result<JobInfo, sqlx::Error> {
        sqlx::query_as::<_, JobInfo>(
            r#"
            INSERT INTO job_infos (user_id, title, description, experience_level)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&job_info.user_id)
        .bind(&job_info.title)
        .bind(&job_info.description)
        .bind(job_info.experience_level)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_job_info(
        &self,
        id: Uuid,
        changes: JobInfoChanges,
    ) -> Result<JobInfo, sqlx::Error> {
        sqlx::query_as::<_, JobInfo>(
            r#"
            UPDATE job_infos
            SET title = $2, description = $3, experience_level = $4, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.experience_level)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Owned<Question>>, sqlx::Error> {
        let row = sqlx::query_as::<_, QuestionWithOwner>(
            r#"
            SELECT q.*, j.user_id AS owner_id
            FROM questions q
            JOIN job_infos j ON j.id = q.job_info_id
            WHERE q.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Owned {
            owner_id: r.owner_id,
            record: r.question,
        }))
    }

    async fn list_questions(&self, job_info_id: Uuid) -> Result<Vec<Question>, sqlx::Error> {
        sqlx::query_as::<_, Question>(
            "SELECT * FROM questions WHERE job_info_id = $1 ORDER BY created_at ASC",
        )
        .bind(job_info_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question, sqlx::Error> {
        sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (job_info_id, text, difficulty)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(question.job_info_id)
        .bind(&question.text)
        .bind(question.difficulty)
        .fetch_one(&self.pool)
        .await
    }

    async fn count_questions_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM questions q
            JOIN job_infos j ON j.id = q.job_info_id
            WHERE j.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_interview(&self, id: Uuid) -> Result<Option<Owned<Interview>>, sqlx::Error> {
        let row = sqlx::query_as::<_, InterviewWithOwner>(
            r#"
            SELECT i.*, j.user_id AS owner_id
            FROM interviews i
            JOIN job_infos j ON j.id = i.job_info_id
            WHERE i.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Owned {
            owner_id: r.owner_id,
            record: r.interview,
        }))
    }

    async fn list_interviews(&self, job_info_id: Uuid) -> Result<Vec<Interview>, sqlx::Error> {
        sqlx::query_as::<_, Interview>(
            "SELECT * FROM interviews WHERE job_info_id = $1 ORDER BY created_at DESC",
        )
        .bind(job_info_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn insert_interview(&self, interview: NewInterview) -> Result<Interview, sqlx::Error> {
        sqlx::query_as::<_, Interview>(
            "INSERT INTO interviews (job_info_id, duration) VALUES ($1, $2) RETURNING *",
        )
        .bind(interview.job_info_id)
        .bind(&interview.duration)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_interview(
        &self,
        id: Uuid,
        changes: InterviewChanges,
    ) -> Result<Interview, sqlx::Error> {
        sqlx::query_as::<_, Interview>(
            r#"
            UPDATE interviews
            SET hume_chat_id = COALESCE($2, hume_chat_id),
                duration = COALESCE($3, duration),
                feedback = COALESCE($4, feedback)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.hume_chat_id)
        .bind(changes.duration)
        .bind(changes.feedback)
        .fetch_one(&self.pool)
        .await
    }

    async fn count_interviews_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM interviews i
            JOIN job_infos j ON j.id = i.job_info_id
            WHERE j.user_id = $1 AND i.hume_chat_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }
}
