use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{Question, QuestionAttempt, UserProfile};
use crate::engine::memory_model::current_strength;
use crate::engine::skill_cache::SkillCache;
use crate::store::PersistenceAdapter;
use crate::utils::config::EngineConfig;
use crate::utils::error::{EngineError, EngineResult};
use crate::utils::structured_logging::{SchedulingDecision, StructuredLogger, UpdateSource};

/// Select the next question for a user, applying the grade-unlock
/// transition and retrying once if it fires.
pub async fn next_question(
    cache: &SkillCache,
    store: &dyn PersistenceAdapter,
    config: &EngineConfig,
    user_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<Option<Question>> {
    let Some(mut user) = store.get_user(user_id).await? else {
        return Ok(None);
    };

    let mut plan = compute_plan(cache, &user, &config.model, now);
    let mut triggered_unlock = false;

    if plan.candidates.is_empty() && plan.any_locked {
        if let Some((unlocked_grade, unlocked_ids)) =
            try_unlock_next_grade(cache, store, config, &user, now).await?
        {
            triggered_unlock = true;
            StructuredLogger::log_grade_unlock(user_id, unlocked_grade, unlocked_ids.len());
            user = store
                .get_user(user_id)
                .await?
                .ok_or_else(|| EngineError::UserNotFound {
                    user_id: user_id.to_string(),
                })?;
            plan = compute_plan(cache, &user, &config.model, now);
        }
    }

    let mut ordered = plan.candidates;
    ordered.sort_by(|a, b| {
        a.strength
            .partial_cmp(&b.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.grade_level.cmp(&a.grade_level))
            .then_with(|| a.skill_id.cmp(&b.skill_id))
    });

    let answered_ids: Vec<String> = user
        .question_history
        .iter()
        .map(|a| a.question_id.clone())
        .collect();

    for candidate in &ordered {
        if let Some(question) = store
            .find_unanswered_question(
                std::slice::from_ref(&candidate.skill_id),
                &answered_ids,
                config.model.max_times_shown,
            )
            .await?
        {
            StructuredLogger::log_scheduling_decision(SchedulingDecision {
                user_id: user_id.to_string(),
                candidate_count: ordered.len(),
                chosen_skill: Some(candidate.skill_id.clone()),
                chosen_question: Some(question.question_id.clone()),
                triggered_unlock,
            });
            return Ok(Some(question));
        }
    }

    StructuredLogger::log_scheduling_decision(SchedulingDecision {
        user_id: user_id.to_string(),
        candidate_count: ordered.len(),
        chosen_skill: None,
        chosen_question: None,
        triggered_unlock,
    });
    Ok(None)
}

struct Candidate {
    skill_id: String,
    grade_level: u8,
    strength: f64,
}

struct Plan {
    candidates: Vec<Candidate>,
    any_locked: bool,
}

fn compute_plan(
    cache: &SkillCache,
    user: &UserProfile,
    config: &crate::utils::config::ModelConfig,
    now: DateTime<Utc>,
) -> Plan {
    let mut strengths: HashMap<&str, f64> = HashMap::new();
    let mut locked: HashMap<&str, bool> = HashMap::new();
    let mut any_locked = false;

    for skill in cache.all() {
        let decayed = current_strength(cache, user, &skill.skill_id, now);
        locked.insert(skill.skill_id.as_str(), decayed.is_locked());
        if decayed.is_locked() {
            any_locked = true;
        }
        strengths.insert(skill.skill_id.as_str(), decayed.value());
    }

    let mut candidates = Vec::new();
    for skill in cache.all() {
        let strength = strengths[skill.skill_id.as_str()];
        if locked[skill.skill_id.as_str()] || strength >= config.recall_threshold {
            continue;
        }
        let prereqs_met = skill.prerequisites.iter().all(|p| {
            strengths
                .get(p.as_str())
                .is_some_and(|&s| s >= config.recall_threshold)
        });
        if prereqs_met {
            candidates.push(Candidate {
                skill_id: skill.skill_id.clone(),
                grade_level: skill.grade_level,
                strength,
            });
        }
    }

    Plan {
        candidates,
        any_locked,
    }
}

/// If every skill at the user's current grade is at or above mastery,
/// unlock every locked skill at the next grade.
async fn try_unlock_next_grade(
    cache: &SkillCache,
    store: &dyn PersistenceAdapter,
    config: &EngineConfig,
    user: &UserProfile,
    now: DateTime<Utc>,
) -> EngineResult<Option<(u8, Vec<String>)>> {
    let current_grade = user.grade_level;
    let grade_mastered = cache.skills_at_grade(current_grade).all(|skill| {
        let decayed = current_strength(cache, user, &skill.skill_id, now);
        decayed.is_mastered(config.model.mastery_threshold)
    });

    if !grade_mastered {
        return Ok(None);
    }

    let next_grade = current_grade + 1;
    let locked_next_grade: Vec<String> = cache
        .skills_at_grade(next_grade)
        .filter(|skill| {
            user.skill_states
                .get(&skill.skill_id)
                .map(|s| s.memory_strength.is_locked())
                .unwrap_or(false)
        })
        .map(|skill| skill.skill_id.clone())
        .collect();

    if locked_next_grade.is_empty() {
        return Ok(None);
    }

    for skill_id in &locked_next_grade {
        StructuredLogger::log_strength_change(
            &user.user_id,
            skill_id,
            -1.0,
            0.0,
            UpdateSource::GradeUnlock,
        );
    }

    let attempt = QuestionAttempt::grade_unlock(next_grade, locked_next_grade.clone(), now);
    store
        .unlock_skills(
            &user.user_id,
            &locked_next_grade,
            attempt,
            config.model.history_cap,
        )
        .await?;

    Ok(Some((next_grade, locked_next_grade)))
}
