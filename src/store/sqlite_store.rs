use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use super::PersistenceAdapter;
use crate::domain::{PerSkillState, Question, QuestionAttempt, Skill, Strength, UserProfile};
use crate::utils::error::{EngineError, EngineResult, ResultExt};
use crate::utils::structured_logging::StructuredLogger;

/// How long a caller waits for the connection mutex before the operation
/// surfaces as a retryable `StoreTimeout` instead of blocking forever.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrap a foreign error with the operation/component label `ResultExt`
/// carries, and log it through the same structured-logging path a store
/// failure would otherwise only surface as a bare `Err` return.
fn log_and_convert<E>(operation: &'static str) -> impl Fn(E) -> EngineError
where
    E: std::error::Error,
    EngineError: From<E>,
{
    move |e| {
        StructuredLogger::log_store_error(operation, &e);
        EngineError::from(e)
    }
}

/// SQLite-backed implementation of [`PersistenceAdapter`]. Mirrors the
/// store's native document shape (nested per-skill state, a bounded
/// history array) as JSON columns rather than a normalized schema, since
/// the engine never queries into those structures beyond whole-row
/// reads — only `questions` needs a relational index, for the
/// skill_ids/times_shown lookup `find_unanswered_question` performs.
pub struct SqliteStore {
    database_path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn new(database_path: PathBuf) -> EngineResult<Self> {
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context("create_database_directory", "sqlite_store")?;
            }
        }

        let conn = Connection::open(&database_path)
            .with_context("open_connection", "sqlite_store")?;

        Self::init_schema(&conn)?;

        Ok(Self {
            database_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests; each instance is a distinct database.
    pub async fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()
            .with_context("open_in_memory_connection", "sqlite_store")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            database_path: PathBuf::from(":memory:"),
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn database_path(&self) -> &std::path::Path {
        &self.database_path
    }

    /// Acquire the connection mutex, surfacing lock contention that
    /// outlasts `LOCK_TIMEOUT` as a retryable `StoreTimeout` rather than
    /// blocking the caller indefinitely.
    async fn acquire(&self, operation: &'static str) -> EngineResult<MutexGuard<'_, Connection>> {
        tokio::time::timeout(LOCK_TIMEOUT, self.connection.lock())
            .await
            .map_err(|_| EngineError::StoreTimeout {
                operation: operation.to_string(),
            })
    }

    fn init_schema(conn: &Connection) -> EngineResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS skills (
                skill_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                grade_level INTEGER NOT NULL,
                prerequisites TEXT NOT NULL,
                forgetting_rate REAL NOT NULL,
                difficulty REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_skills_grade ON skills(grade_level);

            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                age INTEGER,
                grade_level INTEGER NOT NULL,
                skill_states TEXT NOT NULL,
                question_history TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS questions (
                question_id TEXT PRIMARY KEY,
                times_shown INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS question_skills (
                question_id TEXT NOT NULL REFERENCES questions(question_id),
                skill_id TEXT NOT NULL,
                PRIMARY KEY (question_id, skill_id)
            );
            CREATE INDEX IF NOT EXISTS idx_question_skills_lookup
                ON question_skills(skill_id, question_id);
            ",
        )
        .map_err(|e| EngineError::StoreUnavailable {
            reason: format!("failed to initialize schema: {e}"),
        })?;
        Ok(())
    }

    /// Insert or replace a curriculum skill document. Not part of the
    /// engine-facing trait (curriculum ingestion is an external
    /// collaborator) but needed to seed a usable database.
    pub async fn upsert_skill(&self, skill: &Skill) -> EngineResult<()> {
        let conn = self.acquire("upsert_skill").await?;
        let prerequisites = serde_json::to_string(&skill.prerequisites)?;
        conn.execute(
            "INSERT INTO skills (skill_id, name, grade_level, prerequisites, forgetting_rate, difficulty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(skill_id) DO UPDATE SET
                name = excluded.name,
                grade_level = excluded.grade_level,
                prerequisites = excluded.prerequisites,
                forgetting_rate = excluded.forgetting_rate,
                difficulty = excluded.difficulty",
            params![
                skill.skill_id,
                skill.name,
                skill.grade_level,
                prerequisites,
                skill.forgetting_rate,
                skill.difficulty,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a question document, along with its skill_ids
    /// join rows. Not part of the engine-facing trait; question authoring
    /// is an external collaborator.
    pub async fn upsert_question(&self, question: &Question) -> EngineResult<()> {
        let conn = self.acquire("upsert_question").await?;
        let payload = serde_json::to_string(&question.payload)?;
        conn.execute(
            "INSERT INTO questions (question_id, times_shown, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(question_id) DO UPDATE SET
                times_shown = excluded.times_shown,
                payload = excluded.payload",
            params![question.question_id, question.times_shown, payload],
        )?;
        conn.execute(
            "DELETE FROM question_skills WHERE question_id = ?1",
            params![question.question_id],
        )?;
        for skill_id in &question.skill_ids {
            conn.execute(
                "INSERT INTO question_skills (question_id, skill_id) VALUES (?1, ?2)",
                params![question.question_id, skill_id],
            )?;
        }
        Ok(())
    }

    fn row_to_user(
        user_id: String,
        created_at: String,
        last_updated: String,
        age: Option<u8>,
        grade_level: u8,
        skill_states_json: String,
        history_json: String,
    ) -> EngineResult<UserProfile> {
        Ok(UserProfile {
            user_id,
            created_at: parse_timestamp(&created_at)?,
            last_updated: parse_timestamp(&last_updated)?,
            age,
            grade_level,
            skill_states: serde_json::from_str(&skill_states_json)?,
            question_history: serde_json::from_str(&history_json)?,
        })
    }
}

fn parse_timestamp(value: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::StoreUnavailable {
            reason: format!("corrupt timestamp column: {e}"),
        })
}

#[async_trait]
impl PersistenceAdapter for SqliteStore {
    async fn get_user(&self, user_id: &str) -> EngineResult<Option<UserProfile>> {
        let conn = self.acquire("get_user").await?;
        let row = conn
            .query_row(
                "SELECT user_id, created_at, last_updated, age, grade_level, skill_states, question_history
                 FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<u8>>(3)?,
                        row.get::<_, u8>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(log_and_convert("get_user"))?;

        match row {
            Some((user_id, created_at, last_updated, age, grade_level, skill_states, history)) => {
                Ok(Some(Self::row_to_user(
                    user_id,
                    created_at,
                    last_updated,
                    age,
                    grade_level,
                    skill_states,
                    history,
                )?))
            }
            None => Ok(None),
        }
    }

    async fn create_user(
        &self,
        user_id: &str,
        age: Option<u8>,
        grade_level: u8,
        skill_states: HashMap<String, PerSkillState>,
        cold_start_attempt: QuestionAttempt,
        now: DateTime<Utc>,
    ) -> EngineResult<UserProfile> {
        let conn = self.acquire("create_user").await?;
        let skill_states_json = serde_json::to_string(&skill_states)?;
        let history = vec![cold_start_attempt.clone()];
        let history_json = serde_json::to_string(&history)?;

        conn.execute(
            "INSERT INTO users (user_id, created_at, last_updated, age, grade_level, skill_states, question_history)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
                age,
                grade_level,
                skill_states_json,
                history_json,
            ],
        )
        .map_err(log_and_convert("create_user"))?;

        Ok(UserProfile {
            user_id: user_id.to_string(),
            created_at: now,
            last_updated: now,
            age,
            grade_level,
            skill_states,
            question_history: history,
        })
    }

    async fn bulk_update_skill_states(
        &self,
        user_id: &str,
        strength_updates: &HashMap<String, Strength>,
        directly_tested: &[String],
        attempt: QuestionAttempt,
        history_cap: usize,
    ) -> EngineResult<()> {
        let mut conn = self.acquire("bulk_update_skill_states").await?;
        let tx = conn.transaction().map_err(log_and_convert("bulk_update_skill_states"))?;

        let (skill_states_json, history_json): (String, String) = tx
            .query_row(
                "SELECT skill_states, question_history FROM users WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(log_and_convert("bulk_update_skill_states"))?
            .ok_or_else(|| EngineError::UserNotFound {
                user_id: user_id.to_string(),
            })?;

        let mut skill_states: HashMap<String, PerSkillState> =
            serde_json::from_str(&skill_states_json)?;
        let mut history: Vec<QuestionAttempt> = serde_json::from_str(&history_json)?;

        // Increment off the value just read inside this transaction, not
        // off anything the caller computed beforehand, so two concurrent
        // attempts touching the same skill both land instead of one
        // clobbering the other.
        for (skill_id, strength) in strength_updates {
            let existing = skill_states
                .get(skill_id)
                .cloned()
                .unwrap_or_else(|| PerSkillState::cold_start(*strength, attempt.timestamp));
            let practice_count = existing.practice_count + 1;
            let correct_count = existing.correct_count
                + u32::from(attempt.is_correct && directly_tested.contains(skill_id));
            skill_states.insert(
                skill_id.clone(),
                PerSkillState {
                    memory_strength: *strength,
                    last_practice_time: Some(attempt.timestamp),
                    practice_count,
                    correct_count,
                    last_updated: attempt.timestamp,
                },
            );
        }

        history.push(attempt);
        if history.len() > history_cap {
            let overflow = history.len() - history_cap;
            history.drain(0..overflow);
        }

        let skill_states_json = serde_json::to_string(&skill_states)?;
        let history_json = serde_json::to_string(&history)?;

        tx.execute(
            "UPDATE users SET skill_states = ?1, question_history = ?2, last_updated = ?3 WHERE user_id = ?4",
            params![skill_states_json, history_json, Utc::now().to_rfc3339(), user_id],
        )
        .map_err(log_and_convert("bulk_update_skill_states"))?;

        tx.commit().map_err(log_and_convert("bulk_update_skill_states"))?;
        Ok(())
    }

    async fn unlock_skills(
        &self,
        user_id: &str,
        skill_ids: &[String],
        attempt: QuestionAttempt,
        history_cap: usize,
    ) -> EngineResult<()> {
        let mut conn = self.acquire("unlock_skills").await?;
        let tx = conn.transaction().map_err(log_and_convert("unlock_skills"))?;

        let (skill_states_json, history_json): (String, String) = tx
            .query_row(
                "SELECT skill_states, question_history FROM users WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(log_and_convert("unlock_skills"))?
            .ok_or_else(|| EngineError::UserNotFound {
                user_id: user_id.to_string(),
            })?;

        let mut skill_states: HashMap<String, PerSkillState> =
            serde_json::from_str(&skill_states_json)?;
        let mut history: Vec<QuestionAttempt> = serde_json::from_str(&history_json)?;

        for skill_id in skill_ids {
            let entry = skill_states
                .entry(skill_id.clone())
                .or_insert_with(|| PerSkillState::cold_start(Strength::Active(0.0), attempt.timestamp));
            entry.memory_strength = Strength::Active(0.0);
            entry.last_updated = attempt.timestamp;
        }

        history.push(attempt);
        if history.len() > history_cap {
            let overflow = history.len() - history_cap;
            history.drain(0..overflow);
        }

        let skill_states_json = serde_json::to_string(&skill_states)?;
        let history_json = serde_json::to_string(&history)?;

        tx.execute(
            "UPDATE users SET skill_states = ?1, question_history = ?2, last_updated = ?3 WHERE user_id = ?4",
            params![skill_states_json, history_json, Utc::now().to_rfc3339(), user_id],
        )
        .map_err(log_and_convert("unlock_skills"))?;

        tx.commit().map_err(log_and_convert("unlock_skills"))?;
        Ok(())
    }

    async fn get_question(&self, question_id: &str) -> EngineResult<Option<Question>> {
        let conn = self.acquire("get_question").await?;
        let found: Option<(u32, String)> = conn
            .query_row(
                "SELECT times_shown, payload FROM questions WHERE question_id = ?1",
                params![question_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(log_and_convert("get_question"))?;

        let Some((times_shown, payload_json)) = found else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT skill_id FROM question_skills WHERE question_id = ?1")
            .map_err(log_and_convert("get_question"))?;
        let skill_id_rows = stmt
            .query_map(params![question_id], |row| row.get::<_, String>(0))
            .map_err(log_and_convert("get_question"))?;
        let mut skill_ids = Vec::new();
        for row in skill_id_rows {
            skill_ids.push(row.map_err(log_and_convert("get_question"))?);
        }

        Ok(Some(Question {
            question_id: question_id.to_string(),
            skill_ids,
            times_shown,
            payload: serde_json::from_str(&payload_json)?,
        }))
    }

    async fn find_unanswered_question(
        &self,
        skill_ids: &[String],
        answered_ids: &[String],
        max_times_shown: u32,
    ) -> EngineResult<Option<Question>> {
        if skill_ids.is_empty() {
            return Ok(None);
        }

        let mut conn = self.acquire("find_unanswered_question").await?;
        let tx = conn
            .transaction()
            .map_err(log_and_convert("find_unanswered_question"))?;

        let skill_placeholders = placeholders(skill_ids.len());
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::new();
        for id in skill_ids {
            params_vec.push(id);
        }
        params_vec.push(&max_times_shown);

        let answered_clause = if answered_ids.is_empty() {
            String::new()
        } else {
            format!(
                " AND q.question_id NOT IN ({})",
                placeholders(answered_ids.len())
            )
        };
        for id in answered_ids {
            params_vec.push(id);
        }

        let sql = format!(
            "SELECT DISTINCT q.question_id, q.times_shown, q.payload
             FROM questions q
             JOIN question_skills qs ON qs.question_id = q.question_id
             WHERE qs.skill_id IN ({skill_placeholders})
               AND q.times_shown < ?{param_idx}{answered_clause}
             ORDER BY q.times_shown ASC
             LIMIT 1",
            param_idx = skill_ids.len() + 1,
        );

        let found: Option<(String, u32, String)> = tx
            .query_row(&sql, params_vec.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?;

        let Some((question_id, times_shown, payload_json)) = found else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE questions SET times_shown = times_shown + 1 WHERE question_id = ?1",
            params![question_id],
        )?;

        let mut stmt =
            tx.prepare("SELECT skill_id FROM question_skills WHERE question_id = ?1")?;
        let skill_id_rows = stmt.query_map(params![question_id], |row| row.get::<_, String>(0))?;
        let mut all_skill_ids = Vec::new();
        for row in skill_id_rows {
            all_skill_ids.push(row?);
        }
        drop(stmt);

        tx.commit()?;

        Ok(Some(Question {
            question_id,
            skill_ids: all_skill_ids,
            times_shown: times_shown + 1,
            payload: serde_json::from_str(&payload_json)?,
        }))
    }

    async fn get_answered_question_ids(&self, user_id: &str) -> EngineResult<Vec<String>> {
        let conn = self.acquire("get_answered_question_ids").await?;
        let history_json: Option<String> = conn
            .query_row(
                "SELECT question_history FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(history_json) = history_json else {
            return Err(EngineError::UserNotFound {
                user_id: user_id.to_string(),
            });
        };

        let history: Vec<QuestionAttempt> = serde_json::from_str(&history_json)?;
        Ok(history.into_iter().map(|a| a.question_id).collect())
    }

    async fn list_skill_documents(&self) -> EngineResult<Vec<Skill>> {
        let conn = self.acquire("list_skill_documents").await?;
        let mut stmt = conn.prepare(
            "SELECT skill_id, name, grade_level, prerequisites, forgetting_rate, difficulty FROM skills",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?;

        let mut skills = Vec::new();
        for row in rows {
            let (skill_id, name, grade_level, prerequisites_json, forgetting_rate, difficulty) =
                row?;
            let prerequisites: Vec<String> = serde_json::from_str(&prerequisites_json)?;
            skills.push(Skill {
                skill_id,
                name,
                grade_level,
                prerequisites,
                forgetting_rate,
                difficulty,
            });
        }
        Ok(skills)
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}
