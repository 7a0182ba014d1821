use chrono::{DateTime, Utc};

use crate::domain::{Strength, UserProfile};
use crate::engine::skill_cache::SkillCache;
use crate::utils::config::ModelConfig;

/// Current decayed strength of `skill_id` for `user`, looking up the
/// skill's forgetting rate in the cache and defaulting to a fresh,
/// never-practiced state if the user has no record for it yet (the
/// curriculum may have grown after the user was created).
pub fn current_strength(
    cache: &SkillCache,
    user: &UserProfile,
    skill_id: &str,
    now: DateTime<Utc>,
) -> Strength {
    let Some(skill) = cache.get(skill_id) else {
        return user
            .skill_states
            .get(skill_id)
            .map(|s| s.memory_strength)
            .unwrap_or(Strength::Active(0.0));
    };

    match user.skill_states.get(skill_id) {
        Some(state) => decayed_strength(
            state.memory_strength,
            state.last_practice_time,
            skill.forgetting_rate,
            now,
        ),
        None => Strength::Active(0.0),
    }
}

/// Clamp a value into `[0, 1]`.
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Decay a skill's strength for elapsed time since its last practice.
///
/// Locked skills and skills never practiced pass through unchanged.
/// Negative elapsed time (clock skew) is treated as zero.
pub fn decayed_strength(
    strength: Strength,
    last_practice_time: Option<DateTime<Utc>>,
    forgetting_rate: f64,
    now: DateTime<Utc>,
) -> Strength {
    let Strength::Active(base) = strength else {
        return Strength::Locked;
    };

    let Some(last_practice_time) = last_practice_time else {
        return Strength::Active(base);
    };

    let elapsed_seconds = (now - last_practice_time).num_seconds().max(0) as f64;
    let decayed = base * (-forgetting_rate * elapsed_seconds).exp();
    Strength::Active(clamp01(decayed))
}

/// Sigmoid prediction of correctness given a decayed strength and the
/// calibration bias constant.
pub fn predicted_correctness(strength: Strength, sigmoid_bias: f64) -> f64 {
    let value = strength.value().max(0.0);
    sigmoid(value + sigmoid_bias)
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// `clamp(exp(-(response_time - ideal)/10), 0.5, 1.0)`, the multiplier
/// applied to the learning-rate boost on a correct answer.
pub fn time_penalty(response_time_seconds: f64, ideal_response_seconds: f64) -> f64 {
    let raw = (-(response_time_seconds - ideal_response_seconds) / 10.0).exp();
    raw.clamp(0.5, 1.0)
}

/// Whether the slow-response flag should be recorded on the attempt.
pub fn is_slow_response(response_time_seconds: f64, slow_response_seconds: f64) -> bool {
    response_time_seconds > slow_response_seconds
}

/// Update a skill's memory strength after a direct answer, per the
/// correct/incorrect branches of the update rule.
pub fn update_after_answer(
    current: f64,
    is_correct: bool,
    response_time_seconds: f64,
    config: &ModelConfig,
) -> f64 {
    if is_correct {
        let penalty = time_penalty(response_time_seconds, config.ideal_response_seconds);
        let learning_rate = config.learning_rate * (1.0 - current);
        clamp01(current + learning_rate * penalty)
    } else {
        clamp01(current * config.wrong_decay_factor)
    }
}

/// Soft boost applied to a prerequisite when a downstream skill is
/// answered correctly.
pub fn prerequisite_boost(current: f64, prereq_boost: f64) -> f64 {
    clamp01(current + prereq_boost * (1.0 - current))
}

/// Cascade update applied to a topically related skill, in either
/// direction depending on correctness.
pub fn cascade_update(current: f64, rate: f64, is_correct: bool) -> f64 {
    if is_correct {
        clamp01(current + rate * (1.0 - current))
    } else {
        clamp01(current * (1.0 - rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::EngineConfig;

    #[test]
    fn locked_strength_never_decays() {
        let now = Utc::now();
        let result = decayed_strength(Strength::Locked, Some(now), 0.5, now);
        assert_eq!(result, Strength::Locked);
    }

    #[test]
    fn never_practiced_passes_through() {
        let now = Utc::now();
        let result = decayed_strength(Strength::Active(0.7), None, 0.5, now);
        assert_eq!(result, Strength::Active(0.7));
    }

    #[test]
    fn decay_is_monotonic_in_elapsed_time() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::hours(1);
        let t2 = t0 + chrono::Duration::hours(10);
        let s1 = decayed_strength(Strength::Active(0.8), Some(t0), 0.01, t1).value();
        let s2 = decayed_strength(Strength::Active(0.8), Some(t0), 0.01, t2).value();
        assert!(s2 <= s1);
    }

    #[test]
    fn clock_skew_is_treated_as_zero_elapsed() {
        let t0 = Utc::now();
        let earlier = t0 - chrono::Duration::hours(1);
        let result = decayed_strength(Strength::Active(0.5), Some(t0), 0.5, earlier);
        assert_eq!(result, Strength::Active(0.5));
    }

    #[test]
    fn correct_answer_raises_strength() {
        let config = EngineConfig::default().model;
        let updated = update_after_answer(0.5, true, 5.0, &config);
        assert!((updated - (0.5 + 0.3 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn incorrect_answer_decays_strength() {
        let config = EngineConfig::default().model;
        let updated = update_after_answer(0.5, false, 5.0, &config);
        assert!((updated - 0.4).abs() < 1e-9);
    }

    #[test]
    fn slow_response_reduces_learning_boost() {
        let config = EngineConfig::default().model;
        let fast = update_after_answer(0.5, true, 5.0, &config);
        let slow = update_after_answer(0.5, true, 60.0, &config);
        assert!(slow < fast);
    }

    #[test]
    fn strength_always_clamped() {
        let config = EngineConfig::default().model;
        let updated = update_after_answer(0.99, true, 0.0, &config);
        assert!(updated <= 1.0);
    }

    proptest::proptest! {
        #[test]
        fn decayed_strength_is_monotonic_in_elapsed_time(
            base in 0.0f64..=1.0,
            rate in 0.0001f64..1.0,
            t1_secs in 0i64..100_000,
            extra_secs in 0i64..100_000,
        ) {
            let t0 = Utc::now();
            let t1 = t0 + chrono::Duration::seconds(t1_secs);
            let t2 = t1 + chrono::Duration::seconds(extra_secs);
            let s1 = decayed_strength(Strength::Active(base), Some(t0), rate, t1).value();
            let s2 = decayed_strength(Strength::Active(base), Some(t0), rate, t2).value();
            proptest::prop_assert!(s2 <= s1 + 1e-9);
        }

        #[test]
        fn updated_strength_is_always_clamped(
            current in 0.0f64..=1.0,
            is_correct in proptest::prelude::any::<bool>(),
            response_time in 0.0f64..120.0,
        ) {
            let config = EngineConfig::default().model;
            let updated = update_after_answer(current, is_correct, response_time, &config);
            proptest::prop_assert!((0.0..=1.0).contains(&updated));
        }
    }
}
