use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "question_difficulty", rename_all = "lowercase")]
pub enum QuestionDifficulty {
    Easy,
    Medium,
    Hard,
}

impl QuestionDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionDifficulty::Easy => "easy",
            QuestionDifficulty::Medium => "medium",
            QuestionDifficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub job_info_id: Uuid,
    pub text: String,
    pub difficulty: QuestionDifficulty,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub job_info_id: Uuid,
    pub text: String,
    pub difficulty: QuestionDifficulty,
}
