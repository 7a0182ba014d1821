#![allow(clippy::module_name_repetitions)]

//! An adaptive learning engine: skill-state estimation and question
//! scheduling over a curriculum graph of prerequisite and topical
//! relationships.
//!
//! ## Architecture Overview
//!
//! - [`domain`]: the data model — curriculum skills, per-student
//!   per-skill state, and question/attempt records.
//! - [`engine`]: the algorithm — an immutable skill cache, pure
//!   memory-model math, the scheduler that picks the next question, and
//!   the update engine that applies an answer's direct and cascaded
//!   effects. [`engine::TutorEngine`] is the facade tying them together.
//! - [`store`]: the [`store::PersistenceAdapter`] contract the engine
//!   depends on, plus a concrete SQLite-backed implementation.
//! - [`utils`]: configuration, error handling, structured logging, and
//!   input validation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dash_tutor_engine::engine::TutorEngine;
//! use dash_tutor_engine::store::SqliteStore;
//! use dash_tutor_engine::utils::config::EngineConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let store = SqliteStore::new(config.store.database_path.clone().into()).await?;
//!     let engine = TutorEngine::new(Arc::new(store), config).await?;
//!
//!     let profile = engine.ensure_user("student-1", Some(9), "GRADE_3").await?;
//!     let _ = engine.next_question(&profile.user_id, chrono::Utc::now()).await?;
//!     Ok(())
//! }
//! ```

/// Curriculum, per-student state, and question/attempt data model.
pub mod domain;
/// Skill cache, memory model, scheduler, and update engine.
pub mod engine;
/// The persistence adapter contract and its SQLite implementation.
pub mod store;
/// Configuration, error handling, structured logging, and validation.
pub mod utils;
