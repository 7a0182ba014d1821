use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy for the tutoring engine.
///
/// Every public engine operation returns `EngineResult<T>`. Variants map
/// directly onto the four recovery policies the engine distinguishes:
/// not found (no retry), store unavailable (retryable at the caller),
/// invalid input (rejected, no state change), and integrity violation
/// (logged, aborted, no write).
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum EngineError {
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("skill not found: {skill_id}")]
    SkillNotFound { skill_id: String },

    #[error("question not found: {question_id}")]
    QuestionNotFound { question_id: String },

    #[error("prerequisite cycle detected at skill: {skill_id}")]
    PrerequisiteCycle { skill_id: String },

    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("store operation timed out: {operation}")]
    StoreTimeout { operation: String },

    #[error("invalid grade level: {value}")]
    InvalidGradeLevel { value: String },

    #[error("negative response time: {seconds}")]
    NegativeResponseTime { seconds: f64 },

    #[error("unknown skill id referenced in attempt: {skill_id}")]
    UnknownSkillReference { skill_id: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("profile integrity violation for {user_id}: {reason}")]
    IntegrityViolation { user_id: String, reason: String },

    #[error("configuration error: {reason}")]
    ConfigurationError { reason: String },
}

/// Result type alias used by every engine-facing function.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::StoreUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::StoreUnavailable {
            reason: format!("document decode failed: {err}"),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::StoreUnavailable {
            reason: err.to_string(),
        }
    }
}

/// Structured context attached to an error before it is logged, mirroring
/// the request/operation/component triple the rest of the ambient stack logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub component: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub user_id: Option<String>,
    pub additional_info: std::collections::HashMap<String, String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(operation: &str, component: &str) -> Self {
        Self {
            operation: operation.to_string(),
            component: component.to_string(),
            timestamp: chrono::Utc::now(),
            user_id: None,
            additional_info: std::collections::HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.additional_info
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Adds an operation/component label to any error convertible to a string,
/// wrapping it as a `StoreUnavailable` (the only variant general enough to
/// carry an arbitrary upstream failure).
pub trait ResultExt<T> {
    fn with_context(self, operation: &str, component: &str) -> EngineResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_context(self, operation: &str, component: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::StoreUnavailable {
            reason: format!("{operation} in {component}: {e}"),
        })
    }
}
