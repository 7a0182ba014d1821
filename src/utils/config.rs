use crate::utils::error::{EngineError, EngineResult};

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Configuration for the tutoring engine: the tunable constants from the
/// memory/scheduling/cascade model plus the ambient store and logging
/// settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model: ModelConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub recall_threshold: f64,
    pub mastery_threshold: f64,
    pub sigmoid_bias: f64,
    pub learning_rate: f64,
    pub wrong_decay_factor: f64,
    pub prereq_boost: f64,
    pub cascade_same_concept: f64,
    pub cascade_same_topic: f64,
    pub cascade_same_grade: f64,
    pub cascade_lower_grade: f64,
    pub history_cap: usize,
    pub max_times_shown: u32,
    pub ideal_response_seconds: f64,
    pub slow_response_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                recall_threshold: 0.7,
                mastery_threshold: 0.8,
                sigmoid_bias: -2.0,
                learning_rate: 0.3,
                wrong_decay_factor: 0.8,
                prereq_boost: 0.05,
                cascade_same_concept: 0.03,
                cascade_same_topic: 0.02,
                cascade_same_grade: 0.01,
                cascade_lower_grade: 0.03,
                history_cap: 1000,
                max_times_shown: 100,
                ideal_response_seconds: 5.0,
                slow_response_seconds: 15.0,
            },
            store: StoreConfig {
                database_path: "data/dash_tutor.sqlite3".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables layered on defaults.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();
        config.load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| EngineError::ConfigurationError {
                reason: format!("failed to read config file: {e}"),
            })?;

        let config: Self =
            toml::from_str(&content).map_err(|e| EngineError::ConfigurationError {
                reason: format!("failed to parse config file: {e}"),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: file -> env -> defaults.
    pub fn load() -> EngineResult<Self> {
        let mut config = Self::default();

        let environment = env::var("DASH_ENV").unwrap_or_else(|_| "default".to_string());

        let default_path = Path::new("settings/default.toml");
        if default_path.exists() {
            config = Self::from_file(default_path)?;
        }

        let env_path_str = format!("settings/{environment}.toml");
        let env_path = Path::new(&env_path_str);
        if env_path.exists() {
            let env_config = Self::from_file(env_path)?;
            config = Self::merge(config, env_config);
        }

        if let Ok(config_path) = env::var("DASH_CONFIG_FILE") {
            if Path::new(&config_path).exists() {
                let custom_config = Self::from_file(config_path)?;
                config = Self::merge(config, custom_config);
            }
        }

        config.load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge two configs, preferring `override_config` wherever it deviates
    /// from the built-in default (the same "non-default wins" merge rule
    /// used across the rest of this stack's layered configuration).
    fn merge(base: Self, override_config: Self) -> Self {
        let default_model = ModelConfig::default_values();
        Self {
            model: ModelConfig {
                recall_threshold: pick(
                    override_config.model.recall_threshold,
                    default_model.recall_threshold,
                    base.model.recall_threshold,
                ),
                mastery_threshold: pick(
                    override_config.model.mastery_threshold,
                    default_model.mastery_threshold,
                    base.model.mastery_threshold,
                ),
                sigmoid_bias: pick(
                    override_config.model.sigmoid_bias,
                    default_model.sigmoid_bias,
                    base.model.sigmoid_bias,
                ),
                learning_rate: pick(
                    override_config.model.learning_rate,
                    default_model.learning_rate,
                    base.model.learning_rate,
                ),
                wrong_decay_factor: pick(
                    override_config.model.wrong_decay_factor,
                    default_model.wrong_decay_factor,
                    base.model.wrong_decay_factor,
                ),
                prereq_boost: pick(
                    override_config.model.prereq_boost,
                    default_model.prereq_boost,
                    base.model.prereq_boost,
                ),
                cascade_same_concept: pick(
                    override_config.model.cascade_same_concept,
                    default_model.cascade_same_concept,
                    base.model.cascade_same_concept,
                ),
                cascade_same_topic: pick(
                    override_config.model.cascade_same_topic,
                    default_model.cascade_same_topic,
                    base.model.cascade_same_topic,
                ),
                cascade_same_grade: pick(
                    override_config.model.cascade_same_grade,
                    default_model.cascade_same_grade,
                    base.model.cascade_same_grade,
                ),
                cascade_lower_grade: pick(
                    override_config.model.cascade_lower_grade,
                    default_model.cascade_lower_grade,
                    base.model.cascade_lower_grade,
                ),
                history_cap: if override_config.model.history_cap == default_model.history_cap {
                    base.model.history_cap
                } else {
                    override_config.model.history_cap
                },
                max_times_shown: if override_config.model.max_times_shown
                    == default_model.max_times_shown
                {
                    base.model.max_times_shown
                } else {
                    override_config.model.max_times_shown
                },
                ideal_response_seconds: pick(
                    override_config.model.ideal_response_seconds,
                    default_model.ideal_response_seconds,
                    base.model.ideal_response_seconds,
                ),
                slow_response_seconds: pick(
                    override_config.model.slow_response_seconds,
                    default_model.slow_response_seconds,
                    base.model.slow_response_seconds,
                ),
            },
            store: StoreConfig {
                database_path: if override_config.store.database_path
                    == EngineConfig::default().store.database_path
                {
                    base.store.database_path
                } else {
                    override_config.store.database_path
                },
            },
            logging: LoggingConfig {
                level: if override_config.logging.level == "info" {
                    base.logging.level
                } else {
                    override_config.logging.level
                },
                format: if override_config.logging.format == "json" {
                    base.logging.format
                } else {
                    override_config.logging.format
                },
            },
        }
    }

    fn load_from_env(&mut self) -> EngineResult<()> {
        if let Ok(path) = env::var("DASH_DB_PATH") {
            self.store.database_path = path;
        }
        if let Ok(level) = env::var("DASH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(threshold) = env::var("DASH_RECALL_THRESHOLD") {
            self.model.recall_threshold =
                threshold
                    .parse()
                    .map_err(|_| EngineError::ConfigurationError {
                        reason: format!("invalid DASH_RECALL_THRESHOLD: {threshold}"),
                    })?;
        }
        if let Ok(threshold) = env::var("DASH_MASTERY_THRESHOLD") {
            self.model.mastery_threshold =
                threshold
                    .parse()
                    .map_err(|_| EngineError::ConfigurationError {
                        reason: format!("invalid DASH_MASTERY_THRESHOLD: {threshold}"),
                    })?;
        }
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.model.recall_threshold) {
            return Err(EngineError::ConfigurationError {
                reason: "recall_threshold must be in [0,1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.model.mastery_threshold) {
            return Err(EngineError::ConfigurationError {
                reason: "mastery_threshold must be in [0,1]".to_string(),
            });
        }
        if self.model.history_cap == 0 {
            return Err(EngineError::ConfigurationError {
                reason: "history_cap must be greater than 0".to_string(),
            });
        }
        if self.store.database_path.trim().is_empty() {
            return Err(EngineError::ConfigurationError {
                reason: "store.database_path cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| EngineError::ConfigurationError {
                reason: format!("failed to serialize config: {e}"),
            })?;
        fs::write(path.as_ref(), content).map_err(|e| EngineError::ConfigurationError {
            reason: format!("failed to write config file: {e}"),
        })?;
        Ok(())
    }
}

impl ModelConfig {
    fn default_values() -> Self {
        EngineConfig::default().model
    }
}

fn pick(override_value: f64, default_value: f64, base_value: f64) -> f64 {
    if (override_value - default_value).abs() > f64::EPSILON {
        override_value
    } else {
        base_value
    }
}
