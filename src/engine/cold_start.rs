use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{PerSkillState, Strength};
use crate::engine::skill_cache::SkillCache;
use crate::utils::structured_logging::{StructuredLogger, UpdateSource};

/// Three-band initialization applied once, at user creation: skills
/// below the student's grade are assumed mastered (but still decayable
/// and revisable by cascades), skills at grade are ready to learn, and
/// skills above grade start locked.
pub fn initial_skill_states(
    cache: &SkillCache,
    user_id: &str,
    grade_level: u8,
    now: DateTime<Utc>,
) -> HashMap<String, PerSkillState> {
    cache
        .all()
        .map(|skill| {
            let strength = match skill.grade_level.cmp(&grade_level) {
                std::cmp::Ordering::Less => Strength::Active(0.9),
                std::cmp::Ordering::Equal => Strength::Active(0.0),
                std::cmp::Ordering::Greater => Strength::Locked,
            };
            StructuredLogger::log_strength_change(
                user_id,
                &skill.skill_id,
                strength.value(),
                strength.value(),
                UpdateSource::ColdStart,
            );
            (
                skill.skill_id.clone(),
                PerSkillState::cold_start(strength, now),
            )
        })
        .collect()
}
