//! Demo entry point for the tutoring engine.
//!
//! Loads configuration, opens the SQLite store, seeds a small curriculum
//! and question bank if the database is empty, and exercises the engine
//! API once end to end. There is no HTTP facade here — serving the
//! engine over a network is an external collaborator's job.

use chrono::Utc;
use dash_tutor_engine::domain::{Question, Skill};
use dash_tutor_engine::engine::TutorEngine;
use dash_tutor_engine::store::SqliteStore;
use dash_tutor_engine::utils::config::EngineConfig;
use std::sync::Arc;
use tracing::{Level, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load().unwrap_or_else(|e| {
        eprintln!("configuration error: {e}");
        std::process::exit(1);
    });

    let log_level = match config.logging.level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!(database_path = %config.store.database_path, "starting dash tutor engine demo");

    let store = SqliteStore::new(config.store.database_path.clone().into()).await?;
    seed_curriculum(&store).await?;

    let engine = TutorEngine::new(Arc::new(store), config).await?;
    info!(skills_loaded = engine.skill_cache().len(), "skill cache ready");

    let user_id = "demo-student";
    let profile = engine.ensure_user(user_id, Some(9), "GRADE_3").await?;
    info!(user_id = %profile.user_id, grade = profile.grade_level, "user ready");

    let now = Utc::now();
    if let Some(question) = engine.next_question(user_id, now).await? {
        info!(question_id = %question.question_id, skills = ?question.skill_ids, "serving question");
        let affected = engine
            .record_attempt(
                user_id,
                &question.question_id,
                &question.skill_ids,
                true,
                6.0,
                now,
            )
            .await?;
        info!(affected_skills = affected.len(), "attempt recorded");
    } else {
        info!("no eligible question found");
    }

    let stats = engine.stats(user_id, now).await?;
    info!(
        total_questions = stats.total_questions,
        accuracy = stats.accuracy,
        skills_mastered = stats.skills_mastered,
        "final stats"
    );

    Ok(())
}

async fn seed_curriculum(store: &SqliteStore) -> anyhow::Result<()> {
    let skills = vec![
        Skill {
            skill_id: "math_2_1.1.1.1".to_string(),
            name: "Addition within 20".to_string(),
            grade_level: 2,
            prerequisites: vec![],
            forgetting_rate: 0.02,
            difficulty: 0.3,
        },
        Skill {
            skill_id: "math_3_1.1.1.1".to_string(),
            name: "Multiplication facts".to_string(),
            grade_level: 3,
            prerequisites: vec!["math_2_1.1.1.1".to_string()],
            forgetting_rate: 0.03,
            difficulty: 0.5,
        },
        Skill {
            skill_id: "math_3_1.1.1.2".to_string(),
            name: "Multiplication word problems".to_string(),
            grade_level: 3,
            prerequisites: vec!["math_3_1.1.1.1".to_string()],
            forgetting_rate: 0.03,
            difficulty: 0.6,
        },
        Skill {
            skill_id: "math_4_1.1.1.1".to_string(),
            name: "Long division".to_string(),
            grade_level: 4,
            prerequisites: vec!["math_3_1.1.1.1".to_string()],
            forgetting_rate: 0.03,
            difficulty: 0.7,
        },
    ];

    for skill in &skills {
        store.upsert_skill(skill).await?;
    }

    let questions = vec![
        Question {
            question_id: "q-mult-1".to_string(),
            skill_ids: vec!["math_3_1.1.1.1".to_string()],
            times_shown: 0,
            payload: serde_json::json!({"prompt": "What is 6 x 7?"}),
        },
        Question {
            question_id: "q-mult-2".to_string(),
            skill_ids: vec!["math_3_1.1.1.1".to_string()],
            times_shown: 0,
            payload: serde_json::json!({"prompt": "What is 8 x 9?"}),
        },
    ];

    for question in &questions {
        store.upsert_question(question).await?;
    }

    Ok(())
}
