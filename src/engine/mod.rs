/// In-process curriculum index, built once at startup.
pub mod skill_cache;
/// Pure decay/prediction/update math.
pub mod memory_model;
/// Three-band cold-start initialization.
pub mod cold_start;
/// Next-question selection, including the grade-unlock transition.
pub mod scheduler;
/// Answer recording: direct update plus prerequisite and breadcrumb cascades.
pub mod update_engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Question, Skill, Strength, UserProfile};
use crate::store::PersistenceAdapter;
use crate::utils::config::EngineConfig;
use crate::utils::error::EngineResult;
use crate::utils::structured_logging::StructuredLogger;
use crate::utils::validation::InputValidator;
use skill_cache::SkillCache;

/// The facade external callers (an HTTP layer, a CLI, a test harness) talk
/// to. Delegates to the skill cache, scheduler, and update engine, and
/// owns no mutable state of its own beyond the immutable skill cache and
/// a handle to the store.
///
/// ## Thread Safety
/// Cloning is cheap: the skill cache is an `Arc`-backed immutable map and
/// the store handle is `Arc`-shared. There are no in-process per-user
/// locks — concurrency safety relies entirely on the store's atomic
/// update semantics (see the store adapter's own documentation).
///
/// ## Error Handling
/// Every method returns `EngineResult<T>`; callers decide whether a given
/// `EngineError` variant is retryable (`StoreUnavailable`), a caller
/// mistake (`InvalidInput`-class variants), or requires operator
/// attention (`IntegrityViolation`).
#[derive(Clone)]
pub struct TutorEngine {
    cache: SkillCache,
    store: std::sync::Arc<dyn PersistenceAdapter>,
    config: EngineConfig,
}

impl TutorEngine {
    /// Build an engine over an already-open store, loading the skill
    /// cache from it.
    pub async fn new(
        store: std::sync::Arc<dyn PersistenceAdapter>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let cache = SkillCache::load(store.as_ref()).await?;
        Ok(Self {
            cache,
            store,
            config,
        })
    }

    pub fn skill_cache(&self) -> &SkillCache {
        &self.cache
    }

    /// Look up a single curriculum skill by id.
    pub fn skill(&self, skill_id: &str) -> EngineResult<Skill> {
        self.cache
            .get(skill_id)
            .cloned()
            .ok_or_else(|| crate::utils::error::EngineError::SkillNotFound {
                skill_id: skill_id.to_string(),
            })
    }

    /// Look up a single question by id, for inspection/debugging.
    pub async fn question(&self, question_id: &str) -> EngineResult<Question> {
        self.store
            .get_question(question_id)
            .await?
            .ok_or_else(|| crate::utils::error::EngineError::QuestionNotFound {
                question_id: question_id.to_string(),
            })
    }

    /// Idempotent: returns the existing profile if one exists, otherwise
    /// creates one and applies cold start.
    pub async fn ensure_user(
        &self,
        user_id: &str,
        age: Option<u8>,
        grade_level: &str,
    ) -> EngineResult<UserProfile> {
        InputValidator::validate_user_id(user_id)?;
        let grade = InputValidator::validate_grade_level(grade_level)?;

        if let Some(existing) = self.store.get_user(user_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let skill_states = cold_start::initial_skill_states(&self.cache, user_id, grade, now);
        let cold_start_attempt = crate::domain::QuestionAttempt::cold_start_init(
            skill_states.keys().cloned().collect(),
            now,
        );
        let skills_initialized = skill_states.len();

        let profile = self
            .store
            .create_user(user_id, age, grade, skill_states, cold_start_attempt, now)
            .await?;

        StructuredLogger::log_user_created(user_id, grade_level, skills_initialized);
        Ok(profile)
    }

    /// Select the next question for a user, or `None` if nothing is eligible.
    pub async fn next_question(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Question>> {
        scheduler::next_question(&self.cache, self.store.as_ref(), &self.config, user_id, now)
            .await
    }

    /// Record an answer and return the ids of every skill whose strength
    /// changed (direct, prerequisite, and breadcrumb updates combined).
    pub async fn record_attempt(
        &self,
        user_id: &str,
        question_id: &str,
        skill_ids: &[String],
        is_correct: bool,
        response_time_seconds: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<String>> {
        update_engine::record_attempt(
            &self.cache,
            self.store.as_ref(),
            &self.config,
            user_id,
            question_id,
            skill_ids,
            is_correct,
            response_time_seconds,
            now,
        )
        .await
    }

    /// Aggregate statistics for a user, computed from the live decayed
    /// strengths rather than the stored base values.
    pub async fn stats(&self, user_id: &str, now: DateTime<Utc>) -> EngineResult<UserStats> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| crate::utils::error::EngineError::UserNotFound {
                user_id: user_id.to_string(),
            })?;

        let total_questions = user.question_history.len();
        let correct = user.question_history.iter().filter(|a| a.is_correct).count();
        let accuracy = if total_questions == 0 {
            0.0
        } else {
            correct as f64 / total_questions as f64
        };

        let mut per_skill = HashMap::new();
        let mut skills_mastered = 0usize;
        let mut skills_needing_practice = 0usize;

        for skill in self.cache.all() {
            let decayed = memory_model::current_strength(&self.cache, &user, &skill.skill_id, now);
            let needs_practice = matches!(decayed, Strength::Active(v) if v < self.config.model.recall_threshold);
            if decayed.is_mastered(self.config.model.mastery_threshold) {
                skills_mastered += 1;
            }
            if needs_practice {
                skills_needing_practice += 1;
            }
            let (practice_count, correct_count) = user
                .skill_states
                .get(&skill.skill_id)
                .map(|s| (s.practice_count, s.correct_count))
                .unwrap_or((0, 0));
            per_skill.insert(
                skill.skill_id.clone(),
                SkillStat {
                    strength: decayed.value(),
                    grade_level: skill.grade_level,
                    needs_practice,
                    practice_count,
                    correct_count,
                },
            );
        }

        Ok(UserStats {
            total_questions,
            correct,
            accuracy,
            skills_mastered,
            skills_needing_practice,
            per_skill,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub total_questions: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub skills_mastered: usize,
    pub skills_needing_practice: usize,
    pub per_skill: HashMap<String, SkillStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillStat {
    pub strength: f64,
    pub grade_level: u8,
    pub needs_practice: bool,
    pub practice_count: u32,
    pub correct_count: u32,
}
