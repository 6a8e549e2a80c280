//! In-memory `Store` used by the test suite. It enforces the same foreign
//! key and unique email constraints as the Postgres schema.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Owned, Store};
use crate::models::{
    Interview, InterviewChanges, JobInfo, JobInfoChanges, NewInterview, NewJobInfo, NewQuestion,
    NewUser, Question, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    job_infos: HashMap<Uuid, JobInfo>,
    questions: Vec<Question>,
    interviews: Vec<Interview>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    lookups: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of by-id lookups that reached the store.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of insert/update statements executed.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn question_count(&self) -> usize {
        self.tables.read().await.questions.len()
    }

    fn looked_up(&self) {
        self.lookups.fetch_add(1, Ordering::SeqCst);
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn owner_of(tables: &Tables, job_info_id: Uuid) -> Option<String> {
    tables
        .job_infos
        .get(&job_info_id)
        .map(|j| j.user_id.clone())
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        self.looked_up();
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn upsert_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        self.wrote();
        let mut tables = self.tables.write().await;
        if let Some(email) = &user.email {
            let taken = tables
                .users
                .values()
                .any(|u| u.id != user.id && u.email.as_ref() == Some(email));
            if taken {
                return Err(sqlx::Error::Protocol(
                    "duplicate key value violates unique constraint \"users_email_key\"".to_string(),
                ));
            }
        }
        let now = Utc::now();
        let created_at = tables
            .users
            .get(&user.id)
            .map(|u| u.created_at)
            .unwrap_or(now);
        let record = User {
            id: user.id.clone(),
            name: user.name,
            email: user.email,
            image_url: user.image_url,
            created_at,
            updated_at: now,
        };
        tables.users.insert(user.id, record.clone());
        Ok(record)
    }

    async fn find_job_info(&self, id: Uuid) -> Result<Option<JobInfo>, sqlx::Error> {
        self.looked_up();
        Ok(self.tables.read().await.job_infos.get(&id).cloned())
    }

    async fn list_job_infos(&self, user_id: &str) -> Result<Vec<JobInfo>, sqlx::Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<JobInfo> = tables
            .job_infos
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn insert_job_info(&self, job_info: NewJobInfo) -> Result<JobInfo, sqlx::Error> {
        self.wrote();
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&job_info.user_id) {
            return Err(sqlx::Error::Protocol(
                "insert on table \"job_infos\" violates foreign key constraint \"job_infos_user_id_fkey\""
                    .to_string(),
            ));
        }
        let now = Utc::now();
        let record = JobInfo {
            id: Uuid::new_v4(),
            user_id: job_info.user_id,
            title: job_info.title,
            description: job_info.description,
            experience_level: job_info.experience_level,
            created_at: now,
            updated_at: now,
        };
        tables.job_infos.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_job_info(
        &self,
        id: Uuid,
        changes: JobInfoChanges,
    ) -> Result<JobInfo, sqlx::Error> {
        self.wrote();
        let mut tables = self.tables.write().await;
        let record = tables.job_infos.get_mut(&id).ok_or(sqlx::Error::RowNotFound)?;
        record.title = changes.title;
        record.description = changes.description;
        record.experience_level = changes.experience_level;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Owned<Question>>, sqlx::Error> {
        self.looked_up();
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .iter()
            .find(|q| q.id == id)
            .and_then(|q| {
                owner_of(&tables, q.job_info_id).map(|owner_id| Owned {
                    owner_id,
                    record: q.clone(),
                })
            }))
    }

    async fn list_questions(&self, job_info_id: Uuid) -> Result<Vec<Question>, sqlx::Error> {
        Ok(self
            .tables
            .read()
            .await
            .questions
            .iter()
            .filter(|q| q.job_info_id == job_info_id)
            .cloned()
            .collect())
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question, sqlx::Error> {
        self.wrote();
        let record = Question {
            id: Uuid::new_v4(),
            job_info_id: question.job_info_id,
            text: question.text,
            difficulty: question.difficulty,
            feedback: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.questions.push(record.clone());
        Ok(record)
    }

    async fn count_questions_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let tables = self.tables.read().await;
        let count = tables
            .questions
            .iter()
            .filter(|q| owner_of(&tables, q.job_info_id).as_deref() == Some(user_id))
            .count();
        Ok(count as i64)
    }

    async fn find_interview(&self, id: Uuid) -> Result<Option<Owned<Interview>>, sqlx::Error> {
        self.looked_up();
        let tables = self.tables.read().await;
        Ok(tables
            .interviews
            .iter()
            .find(|i| i.id == id)
            .and_then(|i| {
                owner_of(&tables, i.job_info_id).map(|owner_id| Owned {
                    owner_id,
                    record: i.clone(),
                })
            }))
    }

    async fn list_interviews(&self, job_info_id: Uuid) -> Result<Vec<Interview>, sqlx::Error> {
        Ok(self
            .tables
            .read()
            .await
            .interviews
            .iter()
            .rev()
            .filter(|i| i.job_info_id == job_info_id)
            .cloned()
            .collect())
    }

    async fn insert_interview(&self, interview: NewInterview) -> Result<Interview, sqlx::Error> {
        self.wrote();
        let record = Interview {
            id: Uuid::new_v4(),
            job_info_id: interview.job_info_id,
            duration: interview.duration,
            hume_chat_id: None,
            feedback: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.interviews.push(record.clone());
        Ok(record)
    }

    async fn update_interview(
        &self,
        id: Uuid,
        changes: InterviewChanges,
    ) -> Result<Interview, sqlx::Error> {
        self.wrote();
        let mut tables = self.tables.write().await;
        let record = tables
            .interviews
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(sqlx::Error::RowNotFound)?;
        if let Some(chat_id) = changes.hume_chat_id {
            record.hume_chat_id = Some(chat_id);
        }
        if let Some(duration) = changes.duration {
            record.duration = duration;
        }
        if let Some(feedback) = changes.feedback {
            record.feedback = Some(feedback);
        }
        Ok(record.clone())
    }

    async fn count_interviews_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let tables = self.tables.read().await;
        let count = tables
            .interviews
            .iter()
            .filter(|i| i.hume_chat_id.is_some())
            .filter(|i| owner_of(&tables, i.job_info_id).as_deref() == Some(user_id))
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExperienceLevel;

    fn user(id: &str, email: Option<&str>) -> NewUser {
        NewUser {
            id: id.to_string(),
            name: "Test User".to_string(),
            email: email.map(str::to_string),
            image_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_job_info_requires_existing_user() {
        let store = MemoryStore::new();
        let job_info = || NewJobInfo {
            user_id: "user_1".to_string(),
            title: "SRE".to_string(),
            description: "On-call".to_string(),
            experience_level: ExperienceLevel::MidLevel,
        };

        assert!(store.insert_job_info(job_info()).await.is_err());

        store.upsert_user(user("user_1", None)).await.unwrap();
        assert!(store.insert_job_info(job_info()).await.is_ok());
    }

    #[tokio::test]
    async fn test_email_is_unique_but_optional() {
        let store = MemoryStore::new();
        store.upsert_user(user("user_1", None)).await.unwrap();
        store.upsert_user(user("user_2", None)).await.unwrap();

        store
            .upsert_user(user("user_1", Some("a@example.com")))
            .await
            .unwrap();
        store
            .upsert_user(user("user_1", Some("a@example.com")))
            .await
            .unwrap();
        assert!(store
            .upsert_user(user("user_2", Some("a@example.com")))
            .await
            .is_err());
    }
}
