use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A question served to a student. The core only inspects `skill_ids` and
/// `times_shown`; everything else (wording, options, media) is opaque
/// payload owned by the question-rendering collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub skill_ids: Vec<String>,
    pub times_shown: u32,
    pub payload: serde_json::Value,
}

/// A single recorded attempt, appended to a student's bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAttempt {
    pub question_id: String,
    pub skill_ids: Vec<String>,
    pub is_correct: bool,
    pub response_time_seconds: f64,
    pub time_penalty_applied: bool,
    pub timestamp: DateTime<Utc>,
}

impl QuestionAttempt {
    /// Synthetic attempt recorded when cold start initializes a new user.
    pub fn cold_start_init(skill_ids: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            question_id: "cold_start_init".to_string(),
            skill_ids,
            is_correct: true,
            response_time_seconds: 0.0,
            time_penalty_applied: false,
            timestamp,
        }
    }

    /// Synthetic attempt recorded when a grade unlock transition fires.
    pub fn grade_unlock(unlocked_grade: u8, skill_ids: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            question_id: format!("grade_unlock_{unlocked_grade}"),
            skill_ids,
            is_correct: true,
            response_time_seconds: 0.0,
            time_penalty_applied: false,
            timestamp,
        }
    }
}
