use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "experience_level", rename_all = "kebab-case")]
pub enum ExperienceLevel {
    Junior,
    MidLevel,
    Senior,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Junior => "junior",
            ExperienceLevel::MidLevel => "mid-level",
            ExperienceLevel::Senior => "senior",
        }
    }
}

/// A saved job application context. Owns questions and interviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub experience_level: ExperienceLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJobInfo {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub experience_level: ExperienceLevel,
}

#[derive(Debug, Clone)]
pub struct JobInfoChanges {
    pub title: String,
    pub description: String,
    pub experience_level: ExperienceLevel,
}
