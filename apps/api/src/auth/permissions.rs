//! Plan-limit checks for metered operations.
//!
//! Entitlements come from the caller's session claims; usage counts come
//! from the store. Denial is reported as `false`, never as an error.

use std::future::Future;

use crate::auth::Identity;
use crate::errors::AppError;
use crate::store::Store;

pub const UNLIMITED_QUESTIONS: &str = "unlimited_questions";
pub const FIVE_QUESTIONS: &str = "5_questions";
pub const UNLIMITED_INTERVIEWS: &str = "unlimited_interviews";
pub const ONE_INTERVIEW: &str = "1_interview";
pub const UNLIMITED_RESUME_ANALYSIS: &str = "unlimited_resume_analysis";

/// A metered feature: either unlimited, or capped at `limit` uses.
struct Quota {
    unlimited: &'static str,
    limited: &'static str,
    limit: i64,
}

const QUESTION_QUOTA: Quota = Quota {
    unlimited: UNLIMITED_QUESTIONS,
    limited: FIVE_QUESTIONS,
    limit: 5,
};

const INTERVIEW_QUOTA: Quota = Quota {
    unlimited: UNLIMITED_INTERVIEWS,
    limited: ONE_INTERVIEW,
    limit: 1,
};

async fn within_quota<F, Fut>(identity: &Identity, quota: &Quota, used: F) -> Result<bool, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<i64, sqlx::Error>>,
{
    if identity.user_id().is_none() {
        return Ok(false);
    }
    if identity.has_permission(quota.unlimited) {
        return Ok(true);
    }
    if identity.has_permission(quota.limited) {
        return Ok(used().await? < quota.limit);
    }
    Ok(false)
}

pub async fn can_create_question(identity: &Identity, store: &dyn Store) -> Result<bool, AppError> {
    within_quota(identity, &QUESTION_QUOTA, || async move {
        store
            .count_questions_for_user(identity.user_id().unwrap_or_default())
            .await
    })
    .await
}

pub async fn can_create_interview(
    identity: &Identity,
    store: &dyn Store,
) -> Result<bool, AppError> {
    within_quota(identity, &INTERVIEW_QUOTA, || async move {
        store
            .count_interviews_for_user(identity.user_id().unwrap_or_default())
            .await
    })
    .await
}

pub fn can_run_resume_analysis(identity: &Identity) -> bool {
    identity.has_permission(UNLIMITED_RESUME_ANALYSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ExperienceLevel, InterviewChanges, JobInfo, NewInterview, NewJobInfo, NewQuestion,
        QuestionDifficulty,
    };
    use crate::store::memory::MemoryStore;
    use crate::test_support::claims_for;

    fn identity(user_id: &str, features: &[&str]) -> Identity {
        Identity::from_claims(claims_for(user_id, features))
    }

    async fn job_info(store: &MemoryStore, user_id: &str) -> JobInfo {
        store
            .upsert_user(claims_for(user_id, &[]).to_new_user())
            .await
            .unwrap();
        store
            .insert_job_info(NewJobInfo {
                user_id: user_id.to_string(),
                title: "SRE".to_string(),
                description: "On-call".to_string(),
                experience_level: ExperienceLevel::Junior,
            })
            .await
            .unwrap()
    }

    async fn seed_questions(store: &MemoryStore, user_id: &str, count: usize) {
        let job_info = job_info(store, user_id).await;
        for i in 0..count {
            store
                .insert_question(NewQuestion {
                    job_info_id: job_info.id,
                    text: format!("Question {i}"),
                    difficulty: QuestionDifficulty::Easy,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_unlimited_questions_always_allowed() {
        let store = MemoryStore::new();
        seed_questions(&store, "user_1", 50).await;
        assert!(can_create_question(&identity("user_1", &[UNLIMITED_QUESTIONS]), &store)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_free_question_quota_counts_only_own_questions() {
        let store = MemoryStore::new();
        seed_questions(&store, "user_1", 4).await;
        seed_questions(&store, "user_2", 10).await;

        let user = identity("user_1", &[FIVE_QUESTIONS]);
        assert!(can_create_question(&user, &store).await.unwrap());

        seed_questions(&store, "user_1", 1).await;
        assert!(!can_create_question(&user, &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_entitlement_denies() {
        let store = MemoryStore::new();
        assert!(!can_create_question(&identity("user_1", &[]), &store)
            .await
            .unwrap());
        assert!(!can_create_interview(&identity("user_1", &[]), &store)
            .await
            .unwrap());
        assert!(!can_run_resume_analysis(&identity("user_1", &[])));
    }

    #[tokio::test]
    async fn test_anonymous_denied_even_without_counts() {
        let store = MemoryStore::new();
        assert!(!can_create_question(&Identity::anonymous(), &store)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_single_interview_quota_ignores_unheld_interviews() {
        let store = MemoryStore::new();
        let job_info = job_info(&store, "user_1").await;
        let interview = store
            .insert_interview(NewInterview {
                job_info_id: job_info.id,
                duration: "00:00:00".to_string(),
            })
            .await
            .unwrap();

        let user = identity("user_1", &[ONE_INTERVIEW]);
        assert!(can_create_interview(&user, &store).await.unwrap());

        store
            .update_interview(
                interview.id,
                InterviewChanges {
                    hume_chat_id: Some("chat_1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!can_create_interview(&user, &store).await.unwrap());
    }

    #[test]
    fn test_resume_analysis_requires_unlimited_entitlement() {
        assert!(can_run_resume_analysis(&identity(
            "user_1",
            &[UNLIMITED_RESUME_ANALYSIS]
        )));
    }
}
