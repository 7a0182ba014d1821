use crate::utils::error::{EngineError, EngineResult};
use std::collections::HashSet;

/// Input validation for the engine's external-facing operations. Failures
/// here are always `InvalidInput`-class errors: the caller's request is
/// rejected and no state is touched.
pub struct InputValidator;

impl InputValidator {
    /// Validate a `grade_level` token of the form `GRADE_<n>` with
    /// `n` in `[0, 12]` (`GRADE_0` is kindergarten).
    pub fn validate_grade_level(value: &str) -> EngineResult<u8> {
        let digits = value
            .strip_prefix("GRADE_")
            .ok_or_else(|| EngineError::InvalidGradeLevel {
                value: value.to_string(),
            })?;

        let grade: u8 = digits
            .parse()
            .map_err(|_| EngineError::InvalidGradeLevel {
                value: value.to_string(),
            })?;

        if grade > 12 {
            return Err(EngineError::InvalidGradeLevel {
                value: value.to_string(),
            });
        }

        Ok(grade)
    }

    /// Validate a `record_attempt` response time: must be finite and
    /// non-negative.
    pub fn validate_response_time(seconds: f64) -> EngineResult<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(EngineError::NegativeResponseTime { seconds });
        }
        Ok(())
    }

    /// Validate that every skill id referenced by an attempt exists in the
    /// skill cache.
    pub fn validate_skill_ids(
        skill_ids: &[String],
        known_skills: &HashSet<String>,
    ) -> EngineResult<()> {
        if skill_ids.is_empty() {
            return Err(EngineError::MissingField {
                field: "skill_ids".to_string(),
            });
        }
        for skill_id in skill_ids {
            if !known_skills.contains(skill_id) {
                return Err(EngineError::UnknownSkillReference {
                    skill_id: skill_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validate a non-empty user id.
    pub fn validate_user_id(user_id: &str) -> EngineResult<()> {
        if user_id.trim().is_empty() {
            return Err(EngineError::MissingField {
                field: "user_id".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_grade() {
        assert_eq!(InputValidator::validate_grade_level("GRADE_3").unwrap(), 3);
    }

    #[test]
    fn rejects_out_of_range_grade() {
        assert!(InputValidator::validate_grade_level("GRADE_13").is_err());
    }

    #[test]
    fn rejects_malformed_grade() {
        assert!(InputValidator::validate_grade_level("third grade").is_err());
    }

    #[test]
    fn rejects_negative_response_time() {
        assert!(InputValidator::validate_response_time(-1.0).is_err());
    }

    #[test]
    fn rejects_unknown_skill_reference() {
        let known: HashSet<String> = ["math_3_1.1.1.1".to_string()].into_iter().collect();
        let err =
            InputValidator::validate_skill_ids(&["math_3_9.9.9.9".to_string()], &known).unwrap_err();
        assert!(matches!(err, EngineError::UnknownSkillReference { .. }));
    }
}
