use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Candidate seniority bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Junior,
    #[default]
    Mid,
    Senior,
}

/// Lifecycle of an interview session. The engine only ever creates sessions
/// as `Active`; callers of the surrounding system decide when one is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Assessment bucket produced by the answer evaluator and keyed into rubrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RubricLevel {
    Excellent,
    Average,
    Poor,
}

impl RubricLevel {
    /// Key used to look up the level-specific phrase in a rubric document.
    pub fn as_str(&self) -> &'static str {
        match self {
            RubricLevel::Excellent => "excellent",
            RubricLevel::Average => "average",
            RubricLevel::Poor => "poor",
        }
    }
}

/// One question/answer exchange. Immutable once appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaRecord {
    pub question_id: String,
    pub question_text: String,
    pub answer_text: String,
    pub rubric_level: RubricLevel,
    pub eval_comment: String,
}

/// A live interview session. Owned exclusively by the `SessionStore`;
/// `history` is append-only in interview order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub id: Uuid,
    pub role_id: String,
    pub level: Level,
    pub skills: Vec<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub history: Vec<QaRecord>,
}
