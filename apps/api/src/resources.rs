//! Ownership-scoped accessors.
//!
//! `Repository::authorized_get` is the one authorization primitive for
//! by-id reads: it loads a record together with the user that owns it
//! through its job info, caches that pair under the record's id tag (and
//! the parent job info tag), then hides the record from anyone but the
//! owner. Missing and foreign records both come back as `None`.
//!
//! Writes assume the caller already authorized the operation. Each write
//! invalidates the tags of the entity it changed right after the statement
//! succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cache::{CacheTag, ResourceKind, TaggedCache, Tagged};
use crate::errors::AppError;
use crate::models::{
    Interview, InterviewChanges, JobInfo, JobInfoChanges, NewInterview, NewJobInfo, NewQuestion,
    NewUser, Question, User,
};
use crate::store::{Owned, Store};

/// A record reachable only through its owner.
#[async_trait]
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    const KIND: ResourceKind;

    async fn fetch(store: &dyn Store, id: Uuid) -> Result<Option<Owned<Self>>, sqlx::Error>;

    /// The job info traversed to reach the owner, if the record is not
    /// itself a job info.
    fn parent_job_info(&self) -> Option<Uuid>;
}

#[async_trait]
impl Resource for JobInfo {
    const KIND: ResourceKind = ResourceKind::JobInfos;

    async fn fetch(store: &dyn Store, id: Uuid) -> Result<Option<Owned<Self>>, sqlx::Error> {
        Ok(store.find_job_info(id).await?.map(|job_info| Owned {
            owner_id: job_info.user_id.clone(),
            record: job_info,
        }))
    }

    fn parent_job_info(&self) -> Option<Uuid> {
        None
    }
}

#[async_trait]
impl Resource for Question {
    const KIND: ResourceKind = ResourceKind::Questions;

    async fn fetch(store: &dyn Store, id: Uuid) -> Result<Option<Owned<Self>>, sqlx::Error> {
        store.find_question(id).await
    }

    fn parent_job_info(&self) -> Option<Uuid> {
        Some(self.job_info_id)
    }
}

#[async_trait]
impl Resource for Interview {
    const KIND: ResourceKind = ResourceKind::Interviews;

    async fn fetch(store: &dyn Store, id: Uuid) -> Result<Option<Owned<Self>>, sqlx::Error> {
        store.find_interview(id).await
    }

    fn parent_job_info(&self) -> Option<Uuid> {
        Some(self.job_info_id)
    }
}

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn Store>,
    cache: TaggedCache,
}

impl Repository {
    pub fn new(store: Arc<dyn Store>, cache: TaggedCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Loads `id` if and only if it belongs to `user_id`.
    pub async fn authorized_get<R: Resource>(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<R>, AppError> {
        let key = format!("{}:{id}", R::KIND);
        let store = Arc::clone(&self.store);

        let owned: Option<Owned<R>> = self
            .cache
            .read_through(&key, || async move {
                let owned = R::fetch(store.as_ref(), id).await?;
                let mut tags = vec![CacheTag::id(R::KIND, id)];
                if let Some(parent) = owned.as_ref().and_then(|o| o.record.parent_job_info()) {
                    tags.push(CacheTag::id(ResourceKind::JobInfos, parent));
                }
                Ok(Tagged::new(owned, tags))
            })
            .await?;

        match owned {
            Some(owned) if owned.owner_id == user_id => Ok(Some(owned.record)),
            Some(_) => {
                debug!("{} {id} is not visible to {user_id}", R::KIND);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    // ── Users ───────────────────────────────────────────────────────────────

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let key = format!("{}:{id}", ResourceKind::Users);
        let store = Arc::clone(&self.store);
        let id = id.to_string();

        self.cache
            .read_through(&key, || async move {
                let user = store.find_user(&id).await?;
                Ok(Tagged::new(user, vec![CacheTag::id(ResourceKind::Users, &id)]))
            })
            .await
    }

    pub async fn upsert_user(&self, user: NewUser) -> Result<User, AppError> {
        let user = self.store.upsert_user(user).await?;
        self.cache
            .invalidate(&[
                CacheTag::global(ResourceKind::Users),
                CacheTag::id(ResourceKind::Users, &user.id),
            ])
            .await;
        Ok(user)
    }

    // ── Job infos ───────────────────────────────────────────────────────────

    pub async fn list_job_infos(&self, user_id: &str) -> Result<Vec<JobInfo>, AppError> {
        let key = format!("{}:user:{user_id}", ResourceKind::JobInfos);
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();

        self.cache
            .read_through(&key, || async move {
                let rows = store.list_job_infos(&user_id).await?;
                Ok(Tagged::new(
                    rows,
                    vec![CacheTag::user(&user_id, ResourceKind::JobInfos)],
                ))
            })
            .await
    }

    pub async fn insert_job_info(&self, job_info: NewJobInfo) -> Result<JobInfo, AppError> {
        let job_info = self.store.insert_job_info(job_info).await?;
        self.cache.invalidate(&job_info_tags(&job_info)).await;
        Ok(job_info)
    }

    pub async fn update_job_info(
        &self,
        id: Uuid,
        changes: JobInfoChanges,
    ) -> Result<JobInfo, AppError> {
        let job_info = self.store.update_job_info(id, changes).await?;
        self.cache.invalidate(&job_info_tags(&job_info)).await;
        Ok(job_info)
    }

    // ── Questions ───────────────────────────────────────────────────────────

    /// Callers must have authorized `job_info_id` first.
    pub async fn list_questions(&self, job_info_id: Uuid) -> Result<Vec<Question>, AppError> {
        let key = format!("{}:jobInfo:{job_info_id}", ResourceKind::Questions);
        let store = Arc::clone(&self.store);

        self.cache
            .read_through(&key, || async move {
                let rows = store.list_questions(job_info_id).await?;
                Ok(Tagged::new(
                    rows,
                    vec![CacheTag::job_info(job_info_id, ResourceKind::Questions)],
                ))
            })
            .await
    }

    pub async fn insert_question(&self, question: NewQuestion) -> Result<Question, AppError> {
        let question = self.store.insert_question(question).await?;
        self.cache
            .invalidate(&[
                CacheTag::global(ResourceKind::Questions),
                CacheTag::job_info(question.job_info_id, ResourceKind::Questions),
                CacheTag::id(ResourceKind::Questions, question.id),
            ])
            .await;
        Ok(question)
    }

    // ── Interviews ──────────────────────────────────────────────────────────

    /// Callers must have authorized `job_info_id` first.
    pub async fn list_interviews(&self, job_info_id: Uuid) -> Result<Vec<Interview>, AppError> {
        let key = format!("{}:jobInfo:{job_info_id}", ResourceKind::Interviews);
        let store = Arc::clone(&self.store);

        self.cache
            .read_through(&key, || async move {
                let rows = store.list_interviews(job_info_id).await?;
                Ok(Tagged::new(
                    rows,
                    vec![CacheTag::job_info(job_info_id, ResourceKind::Interviews)],
                ))
            })
            .await
    }

    pub async fn insert_interview(&self, interview: NewInterview) -> Result<Interview, AppError> {
        let interview = self.store.insert_interview(interview).await?;
        self.cache.invalidate(&interview_tags(&interview)).await;
        Ok(interview)
    }

    pub async fn update_interview(
        &self,
        id: Uuid,
        changes: InterviewChanges,
    ) -> Result<Interview, AppError> {
        let interview = self.store.update_interview(id, changes).await?;
        self.cache.invalidate(&interview_tags(&interview)).await;
        Ok(interview)
    }
}

fn job_info_tags(job_info: &JobInfo) -> [CacheTag; 3] {
    [
        CacheTag::global(ResourceKind::JobInfos),
        CacheTag::user(&job_info.user_id, ResourceKind::JobInfos),
        CacheTag::id(ResourceKind::JobInfos, job_info.id),
    ]
}

fn interview_tags(interview: &Interview) -> [CacheTag; 3] {
    [
        CacheTag::global(ResourceKind::Interviews),
        CacheTag::job_info(interview.job_info_id, ResourceKind::Interviews),
        CacheTag::id(ResourceKind::Interviews, interview.id),
    ]
}
