use serde::{Deserialize, Serialize};
use tracing::{Level, event};

/// Structured logging helpers for the engine's lifecycle and scheduling
/// events, kept separate from ad-hoc `tracing::info!` calls so every
/// call site logs the same fields for the same kind of event.
pub struct StructuredLogger;

impl StructuredLogger {
    /// A new user profile was created and cold start applied.
    pub fn log_user_created(user_id: &str, grade_level: &str, skills_initialized: usize) {
        event!(
            Level::INFO,
            user_id = user_id,
            grade_level = grade_level,
            skills_initialized = skills_initialized,
            "user profile created"
        );
    }

    /// A scheduling decision: which skill was chosen and why.
    pub fn log_scheduling_decision(details: SchedulingDecision) {
        event!(
            Level::DEBUG,
            user_id = %details.user_id,
            candidate_count = details.candidate_count,
            chosen_skill = ?details.chosen_skill,
            chosen_question = ?details.chosen_question,
            triggered_unlock = details.triggered_unlock,
            "scheduling decision"
        );
    }

    /// A grade was unlocked for a user.
    pub fn log_grade_unlock(user_id: &str, unlocked_grade: u8, skills_unlocked: usize) {
        event!(
            Level::INFO,
            user_id = user_id,
            unlocked_grade = unlocked_grade,
            skills_unlocked = skills_unlocked,
            "grade unlocked"
        );
    }

    /// An attempt was recorded; logs the direct/prerequisite/cascade update
    /// counts for the question.
    pub fn log_attempt_recorded(details: AttemptRecorded) {
        event!(
            Level::INFO,
            user_id = %details.user_id,
            question_id = %details.question_id,
            is_correct = details.is_correct,
            direct_updates = details.direct_updates,
            prerequisite_updates = details.prerequisite_updates,
            cascade_updates = details.cascade_updates,
            time_penalty_applied = details.time_penalty_applied,
            "attempt recorded"
        );
    }

    /// A skill-strength change for a single skill, logged at trace level
    /// so it can be enabled for debugging cascades without flooding
    /// normal operation logs.
    pub fn log_strength_change(
        user_id: &str,
        skill_id: &str,
        previous: f64,
        updated: f64,
        source: UpdateSource,
    ) {
        event!(
            Level::TRACE,
            user_id = user_id,
            skill_id = skill_id,
            previous = previous,
            updated = updated,
            source = ?source,
            "skill strength changed"
        );
    }

    /// A store operation failed; logged with the same context shape as
    /// `ErrorContext` so a log line can be correlated with an error value.
    pub fn log_store_error(operation: &str, error: &dyn std::error::Error) {
        event!(
            Level::ERROR,
            operation = operation,
            error = %error,
            "store operation failed"
        );
    }
}

/// Which phase of the update engine produced a skill strength change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum UpdateSource {
    Direct,
    Prerequisite,
    Breadcrumb,
    ColdStart,
    GradeUnlock,
}

#[derive(Debug, Clone)]
pub struct SchedulingDecision {
    pub user_id: String,
    pub candidate_count: usize,
    pub chosen_skill: Option<String>,
    pub chosen_question: Option<String>,
    pub triggered_unlock: bool,
}

#[derive(Debug, Clone)]
pub struct AttemptRecorded {
    pub user_id: String,
    pub question_id: String,
    pub is_correct: bool,
    pub direct_updates: usize,
    pub prerequisite_updates: usize,
    pub cascade_updates: usize,
    pub time_penalty_applied: bool,
}
