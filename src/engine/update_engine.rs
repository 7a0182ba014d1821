use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::domain::question::QuestionAttempt;
use crate::domain::skill::{classify_relation, parse_skill_key};
use crate::domain::{Strength, UserProfile};
use crate::engine::memory_model::{cascade_update, current_strength, is_slow_response, prerequisite_boost, update_after_answer};
use crate::engine::skill_cache::SkillCache;
use crate::store::PersistenceAdapter;
use crate::utils::config::EngineConfig;
use crate::utils::error::{EngineError, EngineResult, ErrorContext};
use crate::utils::structured_logging::{AttemptRecorded, StructuredLogger, UpdateSource};
use crate::utils::validation::InputValidator;

/// Record an answer: compute the direct, prerequisite-cascade, and
/// breadcrumb-cascade updates in memory, then commit them as a single
/// atomic write. Returns the ids of every skill whose strength changed.
pub async fn record_attempt(
    cache: &SkillCache,
    store: &dyn PersistenceAdapter,
    config: &EngineConfig,
    user_id: &str,
    question_id: &str,
    skill_ids: &[String],
    is_correct: bool,
    response_time_seconds: f64,
    now: DateTime<Utc>,
) -> EngineResult<Vec<String>> {
    InputValidator::validate_user_id(user_id)?;
    InputValidator::validate_response_time(response_time_seconds)?;
    let known_skills: HashSet<String> = cache.skill_ids().cloned().collect();
    InputValidator::validate_skill_ids(skill_ids, &known_skills)?;

    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| EngineError::UserNotFound {
            user_id: user_id.to_string(),
        })?;

    check_integrity(&user)?;

    let mut updates: HashMap<String, f64> = HashMap::new();
    let mut sources: HashMap<String, UpdateSource> = HashMap::new();

    // Phase 1: direct update for each tested skill.
    for skill_id in skill_ids {
        let current = current_strength(cache, &user, skill_id, now).value();
        let updated = update_after_answer(
            current,
            is_correct,
            response_time_seconds,
            &config.model,
        );
        updates.insert(skill_id.clone(), updated);
        sources.insert(skill_id.clone(), UpdateSource::Direct);
    }
    let direct_count = updates.len();

    // Phase 2: prerequisite cascade (correct answers only; no penalty on wrong).
    if is_correct {
        for skill_id in skill_ids {
            for prereq_id in cache.prerequisite_closure(skill_id) {
                if updates.contains_key(&prereq_id) {
                    continue;
                }
                let strength = current_strength(cache, &user, &prereq_id, now);
                if strength.is_locked() {
                    continue;
                }
                let boosted = prerequisite_boost(strength.value(), config.model.prereq_boost);
                updates.insert(prereq_id.clone(), boosted);
                sources.insert(prereq_id, UpdateSource::Prerequisite);
            }
        }
    }
    let prerequisite_count = updates.len() - direct_count;

    // Phase 3: breadcrumb (topical-neighbour) cascade.
    for skill_id in skill_ids {
        let Some(primary_key) = parse_skill_key(skill_id) else {
            continue;
        };
        for other in cache.all() {
            if &other.skill_id == skill_id || updates.contains_key(&other.skill_id) {
                continue;
            }
            let Some(other_key) = parse_skill_key(&other.skill_id) else {
                continue;
            };
            if other_key.subject != primary_key.subject {
                continue;
            }
            let Some(relation) = classify_relation(&primary_key, &other_key) else {
                continue;
            };

            let strength = current_strength(cache, &user, &other.skill_id, now);
            if strength.is_locked() {
                continue;
            }

            let rate = match relation {
                crate::domain::skill::CascadeRelation::SameConceptSibling => {
                    config.model.cascade_same_concept
                }
                crate::domain::skill::CascadeRelation::SameConcept => {
                    config.model.cascade_same_topic
                }
                crate::domain::skill::CascadeRelation::SameTopic => {
                    config.model.cascade_same_grade
                }
                crate::domain::skill::CascadeRelation::LowerGradeGap => {
                    config.model.cascade_lower_grade
                }
            };

            let updated = cascade_update(strength.value(), rate, is_correct);
            updates.insert(other.skill_id.clone(), updated);
            sources.insert(other.skill_id.clone(), UpdateSource::Breadcrumb);
        }
    }
    let cascade_count = updates.len() - direct_count - prerequisite_count;

    for (skill_id, updated) in &updates {
        let previous = current_strength(cache, &user, skill_id, now).value();
        StructuredLogger::log_strength_change(
            user_id,
            skill_id,
            previous,
            *updated,
            sources[skill_id],
        );
    }

    let time_penalty_applied =
        is_slow_response(response_time_seconds, config.model.slow_response_seconds);

    let strength_updates: HashMap<String, Strength> = updates
        .iter()
        .map(|(skill_id, strength)| (skill_id.clone(), Strength::Active(*strength)))
        .collect();

    let attempt = QuestionAttempt {
        question_id: question_id.to_string(),
        skill_ids: skill_ids.to_vec(),
        is_correct,
        response_time_seconds,
        time_penalty_applied,
        timestamp: now,
    };

    let affected: Vec<String> = updates.keys().cloned().collect();

    store
        .bulk_update_skill_states(
            user_id,
            &strength_updates,
            skill_ids,
            attempt,
            config.model.history_cap,
        )
        .await?;

    StructuredLogger::log_attempt_recorded(AttemptRecorded {
        user_id: user_id.to_string(),
        question_id: question_id.to_string(),
        is_correct,
        direct_updates: direct_count,
        prerequisite_updates: prerequisite_count,
        cascade_updates: cascade_count,
        time_penalty_applied,
    });

    Ok(affected)
}

fn check_integrity(user: &UserProfile) -> EngineResult<()> {
    for (skill_id, state) in &user.skill_states {
        if state.correct_count > state.practice_count {
            let context = ErrorContext::new("check_integrity", "update_engine")
                .with_user_id(user.user_id.clone())
                .with_info("skill_id", skill_id);
            tracing::error!(
                operation = %context.operation,
                component = %context.component,
                user_id = ?context.user_id,
                skill_id = %skill_id,
                "integrity violation detected"
            );
            return Err(EngineError::IntegrityViolation {
                user_id: user.user_id.clone(),
                reason: format!(
                    "correct_count exceeds practice_count for skill {skill_id}"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Skill;
    use crate::store::MockPersistenceAdapter;

    #[tokio::test]
    async fn rejects_when_user_missing_without_touching_other_adapter_calls() {
        let cache = SkillCache::from_skills(vec![Skill {
            skill_id: "math_3_1.1.1.1".to_string(),
            name: "addition".to_string(),
            grade_level: 3,
            prerequisites: vec![],
            forgetting_rate: 0.05,
            difficulty: 0.5,
        }]);

        let mut mock = MockPersistenceAdapter::new();
        mock.expect_get_user().times(1).returning(|_| Ok(None));
        mock.expect_bulk_update_skill_states().times(0);

        let config = EngineConfig::default();
        let now = Utc::now();

        let err = record_attempt(
            &cache,
            &mock,
            &config,
            "ghost",
            "q1",
            &["math_3_1.1.1.1".to_string()],
            true,
            5.0,
            now,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::UserNotFound { .. }));
    }
}
