use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::question::QuestionAttempt;

/// Memory strength as a sum type rather than an overloaded float: a skill
/// is either locked (above the student's unlocked grade) or active with a
/// mastery level in `[0,1]`. Conversions to/from the store's flat `f64`
/// column happen only at the persistence boundary (see [`Strength::to_raw`]
/// and [`Strength::from_raw`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Strength {
    Locked,
    Active(f64),
}

impl Strength {
    pub fn to_raw(self) -> f64 {
        match self {
            Strength::Locked => -1.0,
            Strength::Active(value) => value,
        }
    }

    pub fn from_raw(value: f64) -> Self {
        if value < 0.0 {
            Strength::Locked
        } else {
            Strength::Active(value.clamp(0.0, 1.0))
        }
    }

    pub fn is_locked(self) -> bool {
        matches!(self, Strength::Locked)
    }

    pub fn value(self) -> f64 {
        match self {
            Strength::Locked => -1.0,
            Strength::Active(value) => value,
        }
    }

    pub fn is_mastered(self, mastery_threshold: f64) -> bool {
        matches!(self, Strength::Active(value) if value >= mastery_threshold)
    }
}

/// Per-student, per-skill practice record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerSkillState {
    pub memory_strength: Strength,
    pub last_practice_time: Option<DateTime<Utc>>,
    pub practice_count: u32,
    pub correct_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl PerSkillState {
    pub fn cold_start(strength: Strength, now: DateTime<Utc>) -> Self {
        Self {
            memory_strength: strength,
            last_practice_time: None,
            practice_count: 0,
            correct_count: 0,
            last_updated: now,
        }
    }
}

/// A student's full record: profile fields plus per-skill state and a
/// bounded history of past attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub age: Option<u8>,
    pub grade_level: u8,
    pub skill_states: HashMap<String, PerSkillState>,
    pub question_history: Vec<QuestionAttempt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_round_trips_through_raw() {
        assert_eq!(Strength::from_raw(-1.0), Strength::Locked);
        assert_eq!(Strength::Locked.to_raw(), -1.0);
    }

    #[test]
    fn active_clamps_on_load() {
        assert_eq!(Strength::from_raw(1.5), Strength::Active(1.0));
        assert_eq!(Strength::from_raw(0.0), Strength::Active(0.0));
    }

    #[test]
    fn mastery_requires_threshold() {
        assert!(Strength::Active(0.85).is_mastered(0.8));
        assert!(!Strength::Active(0.5).is_mastered(0.8));
        assert!(!Strength::Locked.is_mastered(0.8));
    }
}
