use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Duration recorded for an interview that has not been held yet.
pub const EMPTY_DURATION: &str = "00:00:00";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: Uuid,
    pub job_info_id: Uuid,
    /// `HH:MM:SS`
    pub duration: String,
    pub hume_chat_id: Option<String>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInterview {
    pub job_info_id: Uuid,
    pub duration: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct InterviewChanges {
    pub hume_chat_id: Option<String>,
    pub duration: Option<String>,
    pub feedback: Option<String>,
}

impl InterviewChanges {
    pub fn is_empty(&self) -> bool {
        self.hume_chat_id.is_none() && self.duration.is_none() && self.feedback.is_none()
    }
}
