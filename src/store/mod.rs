/// The concrete SQLite-backed persistence adapter.
pub mod sqlite_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{PerSkillState, Question, QuestionAttempt, Skill, Strength, UserProfile};
use crate::utils::error::EngineResult;

pub use sqlite_store::SqliteStore;

#[cfg(test)]
use mockall::automock;

/// The set of store operations the engine depends on. Anything satisfying
/// this trait can back the engine; the concrete `SqliteStore` is one
/// implementation shipped so the engine is runnable without an external
/// document store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Fetch a user's full profile, or `None` if it does not exist.
    async fn get_user(&self, user_id: &str) -> EngineResult<Option<UserProfile>>;

    /// Fetch a single question by id, for inspection/debugging. Returns
    /// `None` rather than an error so callers decide whether a miss is
    /// exceptional.
    async fn get_question(&self, question_id: &str) -> EngineResult<Option<Question>>;

    /// Create a new user with the given initial per-skill states and a
    /// synthetic cold-start attempt already appended.
    async fn create_user(
        &self,
        user_id: &str,
        age: Option<u8>,
        grade_level: u8,
        skill_states: HashMap<String, PerSkillState>,
        cold_start_attempt: QuestionAttempt,
        now: DateTime<Utc>,
    ) -> EngineResult<UserProfile>;

    /// Atomically apply a practice attempt: for each skill in
    /// `strength_updates`, set its strength and increment `practice_count`
    /// off whatever value is freshly read inside the same transaction
    /// (never off a caller-supplied absolute count), increment
    /// `correct_count` only when the attempt was correct and the skill is
    /// in `directly_tested`, and append `attempt` to history (trimmed to
    /// the configured history cap). This is the same atomic
    /// read-increment-write shape `find_unanswered_question` uses for
    /// `times_shown`, so concurrent calls touching the same skill compose
    /// rather than lose an increment.
    async fn bulk_update_skill_states(
        &self,
        user_id: &str,
        strength_updates: &HashMap<String, Strength>,
        directly_tested: &[String],
        attempt: QuestionAttempt,
        history_cap: usize,
    ) -> EngineResult<()>;

    /// Transition the listed skills from locked to active(0.0) without
    /// touching their practice/correct counters, and append `attempt` to
    /// history. Used for the grade-unlock transition, which is not itself
    /// a practice event.
    async fn unlock_skills(
        &self,
        user_id: &str,
        skill_ids: &[String],
        attempt: QuestionAttempt,
        history_cap: usize,
    ) -> EngineResult<()>;

    /// Find one question covering any of `skill_ids`, not already in
    /// `answered_ids`, with `times_shown < max_times_shown`, preferring the
    /// least-shown match; atomically increments its `times_shown`.
    async fn find_unanswered_question(
        &self,
        skill_ids: &[String],
        answered_ids: &[String],
        max_times_shown: u32,
    ) -> EngineResult<Option<Question>>;

    /// The set of question ids already answered by this user.
    async fn get_answered_question_ids(&self, user_id: &str) -> EngineResult<Vec<String>>;

    /// Every curriculum skill document, for flattening into the skill cache.
    async fn list_skill_documents(&self) -> EngineResult<Vec<Skill>>;
}
