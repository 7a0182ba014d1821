use chrono::Utc;
use dash_tutor_engine::domain::{Question, Skill, Strength};
use dash_tutor_engine::engine::TutorEngine;
use dash_tutor_engine::store::SqliteStore;
use dash_tutor_engine::utils::config::EngineConfig;
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn seeded_engine(skills: Vec<Skill>, questions: Vec<Question>) -> TutorEngine {
    let store = SqliteStore::open_in_memory().await.unwrap();
    for skill in &skills {
        store.upsert_skill(skill).await.unwrap();
    }
    for question in &questions {
        store.upsert_question(question).await.unwrap();
    }
    TutorEngine::new(Arc::new(store), EngineConfig::default())
        .await
        .unwrap()
}

fn skill(id: &str, grade: u8, prereqs: &[&str]) -> Skill {
    Skill {
        skill_id: id.to_string(),
        name: id.to_string(),
        grade_level: grade,
        prerequisites: prereqs.iter().map(|s| s.to_string()).collect(),
        forgetting_rate: 0.01,
        difficulty: 0.5,
    }
}

fn question(id: &str, skill_ids: &[&str]) -> Question {
    Question {
        question_id: id.to_string(),
        skill_ids: skill_ids.iter().map(|s| s.to_string()).collect(),
        times_shown: 0,
        payload: serde_json::json!({}),
    }
}

// S1 — cold start at grade 3.
#[tokio::test]
async fn cold_start_applies_three_band_strategy() {
    let engine = seeded_engine(
        vec![
            skill("math_2_1.1.1.1", 2, &[]),
            skill("math_3_1.1.1.1", 3, &[]),
            skill("math_4_1.1.1.1", 4, &[]),
        ],
        vec![],
    )
    .await;

    let profile = engine
        .ensure_user("u1", Some(9), "GRADE_3")
        .await
        .unwrap();

    assert_eq!(
        profile.skill_states["math_2_1.1.1.1"].memory_strength,
        Strength::Active(0.9)
    );
    assert_eq!(
        profile.skill_states["math_3_1.1.1.1"].memory_strength,
        Strength::Active(0.0)
    );
    assert_eq!(
        profile.skill_states["math_4_1.1.1.1"].memory_strength,
        Strength::Locked
    );
}

// ensure_user is idempotent.
#[tokio::test]
async fn ensure_user_is_idempotent() {
    let engine = seeded_engine(vec![skill("math_3_1.1.1.1", 3, &[])], vec![]).await;
    let first = engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let second = engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    assert_eq!(first.created_at, second.created_at);
}

// S2/S3 — direct update plus prerequisite cascade, correct vs incorrect.
#[tokio::test]
async fn correct_answer_boosts_direct_and_softly_boosts_prerequisite() {
    let engine = seeded_engine(
        vec![
            skill("math_3_1.1.1.1", 3, &[]),
            skill("math_3_1.1.1.2", 3, &["math_3_1.1.1.1"]),
        ],
        vec![],
    )
    .await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();

    // Both skills start at 0.0 under cold start (same grade); push them to 0.5
    // by recording one correct attempt each directly, then test the cascade.
    let now = Utc::now();
    engine
        .record_attempt("u1", "seed-a", &["math_3_1.1.1.1".to_string()], true, 5.0, now)
        .await
        .unwrap();
    engine
        .record_attempt("u1", "seed-b", &["math_3_1.1.1.2".to_string()], true, 5.0, now)
        .await
        .unwrap();

    let before = engine.stats("u1", now).await.unwrap();
    let prereq_before = before.per_skill["math_3_1.1.1.1"].strength;

    engine
        .record_attempt(
            "u1",
            "q-main",
            &["math_3_1.1.1.2".to_string()],
            true,
            5.0,
            now,
        )
        .await
        .unwrap();

    let after = engine.stats("u1", now).await.unwrap();
    assert!(after.per_skill["math_3_1.1.1.2"].strength > before.per_skill["math_3_1.1.1.2"].strength);
    assert!(after.per_skill["math_3_1.1.1.1"].strength > prereq_before);
}

#[tokio::test]
async fn incorrect_answer_does_not_penalize_prerequisite() {
    let engine = seeded_engine(
        vec![
            skill("math_3_1.1.1.1", 3, &[]),
            skill("math_3_1.1.1.2", 3, &["math_3_1.1.1.1"]),
        ],
        vec![],
    )
    .await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    let before = engine.stats("u1", now).await.unwrap();
    let prereq_before = before.per_skill["math_3_1.1.1.1"].strength;

    engine
        .record_attempt(
            "u1",
            "q-wrong",
            &["math_3_1.1.1.2".to_string()],
            false,
            5.0,
            now,
        )
        .await
        .unwrap();

    let after = engine.stats("u1", now).await.unwrap();
    assert_eq!(after.per_skill["math_3_1.1.1.1"].strength, prereq_before);
}

// S4 — locked skill excluded from cascade.
#[tokio::test]
async fn locked_skill_is_never_touched_by_cascade() {
    let engine = seeded_engine(
        vec![
            skill("math_3_1.1.1.1", 3, &[]),
            skill("math_4_1.1.1.1", 4, &[]),
        ],
        vec![],
    )
    .await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    engine
        .record_attempt(
            "u1",
            "q1",
            &["math_3_1.1.1.1".to_string()],
            true,
            5.0,
            now,
        )
        .await
        .unwrap();

    let stats = engine.stats("u1", now).await.unwrap();
    assert_eq!(stats.per_skill["math_4_1.1.1.1"].strength, -1.0);
}

// S5 — grade unlock once the current grade is fully mastered.
#[tokio::test]
async fn grade_unlocks_once_current_grade_is_mastered() {
    let engine = seeded_engine(
        vec![
            skill("math_3_1.1.1.1", 3, &[]),
            skill("math_4_1.1.1.1", 4, &[]),
        ],
        vec![question("q4", &["math_4_1.1.1.1"])],
    )
    .await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    // Drive the single grade-3 skill to mastery.
    for i in 0..10 {
        engine
            .record_attempt(
                "u1",
                &format!("drill-{i}"),
                &["math_3_1.1.1.1".to_string()],
                true,
                5.0,
                now,
            )
            .await
            .unwrap();
    }

    let stats = engine.stats("u1", now).await.unwrap();
    assert!(stats.per_skill["math_3_1.1.1.1"].strength >= 0.8);

    let next = engine.next_question("u1", now).await.unwrap();
    assert_eq!(next.map(|q| q.question_id), Some("q4".to_string()));

    let after_unlock = engine.stats("u1", now).await.unwrap();
    assert!(after_unlock.per_skill["math_4_1.1.1.1"].strength >= 0.0);
}

// S6 — question exhaustion falls through, then returns null.
#[tokio::test]
async fn falls_through_to_next_candidate_then_returns_none() {
    let engine = seeded_engine(
        vec![
            skill("math_3_1.1.1.1", 3, &[]),
            skill("math_3_1.1.1.2", 3, &[]),
        ],
        vec![question("q-only-second", &["math_3_1.1.1.2"])],
    )
    .await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    let question = engine.next_question("u1", now).await.unwrap();
    assert_eq!(question.map(|q| q.question_id), Some("q-only-second".to_string()));
}

#[tokio::test]
async fn returns_none_when_no_questions_available() {
    let engine = seeded_engine(vec![skill("math_3_1.1.1.1", 3, &[])], vec![]).await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();
    assert!(engine.next_question("u1", now).await.unwrap().is_none());
}

// S7 — concurrent scheduling requests never lose a `times_shown` increment.
#[tokio::test]
async fn concurrent_next_question_increments_times_shown_atomically() {
    let engine = seeded_engine(
        vec![skill("math_3_1.1.1.1", 3, &[])],
        vec![question("q-solo", &["math_3_1.1.1.1"])],
    )
    .await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    let engine_a = engine.clone();
    let engine_b = engine.clone();
    let (a, b) = tokio::join!(
        engine_a.next_question("u1", now),
        engine_b.next_question("u1", now)
    );

    let questions: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(questions.len(), 2, "both concurrent callers should receive the question");
    let mut times_shown: Vec<_> = questions.iter().map(|q| q.times_shown).collect();
    times_shown.sort_unstable();
    assert_eq!(
        times_shown,
        vec![1, 2],
        "the shared times_shown counter must not lose an increment under concurrent access"
    );
}

#[tokio::test]
async fn rejects_unknown_skill_reference() {
    let engine = seeded_engine(vec![skill("math_3_1.1.1.1", 3, &[])], vec![]).await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    let err = engine
        .record_attempt("u1", "q1", &["unknown_skill".to_string()], true, 5.0, now)
        .await
        .unwrap_err();
    assert_matches::assert_matches!(
        err,
        dash_tutor_engine::utils::error::EngineError::UnknownSkillReference { .. }
    );
}

#[tokio::test]
async fn rejects_negative_response_time() {
    let engine = seeded_engine(vec![skill("math_3_1.1.1.1", 3, &[])], vec![]).await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    let err = engine
        .record_attempt(
            "u1",
            "q1",
            &["math_3_1.1.1.1".to_string()],
            true,
            -1.0,
            now,
        )
        .await
        .unwrap_err();
    assert_matches::assert_matches!(
        err,
        dash_tutor_engine::utils::error::EngineError::NegativeResponseTime { .. }
    );
}

// Concurrent record_attempt calls on the same skill must never lose a
// practice_count increment (the same compose-under-concurrency guarantee
// S7 tests for times_shown, but for the skill-state counters instead).
#[tokio::test]
async fn concurrent_record_attempt_never_loses_a_practice_count_increment() {
    let engine = seeded_engine(vec![skill("math_3_1.1.1.1", 3, &[])], vec![]).await;
    engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
    let now = Utc::now();

    let engine_a = engine.clone();
    let engine_b = engine.clone();
    let (a, b) = tokio::join!(
        engine_a.record_attempt("u1", "qa", &["math_3_1.1.1.1".to_string()], true, 5.0, now),
        engine_b.record_attempt("u1", "qb", &["math_3_1.1.1.1".to_string()], true, 5.0, now)
    );
    a.unwrap();
    b.unwrap();

    let stats = engine.stats("u1", now).await.unwrap();
    let stat = &stats.per_skill["math_3_1.1.1.1"];
    assert_eq!(
        stat.practice_count, 2,
        "both concurrent attempts must be counted, none lost"
    );
    assert_eq!(stat.correct_count, 2);
}

#[tokio::test]
async fn skill_and_question_lookups_hit_and_miss() {
    let engine = seeded_engine(
        vec![skill("math_3_1.1.1.1", 3, &[])],
        vec![question("q1", &["math_3_1.1.1.1"])],
    )
    .await;

    assert!(engine.skill("math_3_1.1.1.1").is_ok());
    assert_matches::assert_matches!(
        engine.skill("missing"),
        Err(dash_tutor_engine::utils::error::EngineError::SkillNotFound { .. })
    );

    assert_eq!(engine.question("q1").await.unwrap().question_id, "q1");
    assert_matches::assert_matches!(
        engine.question("missing").await,
        Err(dash_tutor_engine::utils::error::EngineError::QuestionNotFound { .. })
    );
}

proptest::proptest! {
    // Invariants 1 and 2: across any sequence of attempts on one skill,
    // correct_count never exceeds practice_count and strength stays in
    // [0, 1].
    #[test]
    fn attempt_sequence_preserves_counter_and_strength_invariants(
        is_corrects in proptest::collection::vec(proptest::prelude::any::<bool>(), 1..12)
    ) {
        let (correct_count, practice_count, strength) = tokio_test::block_on(async {
            let engine = seeded_engine(vec![skill("math_3_1.1.1.1", 3, &[])], vec![]).await;
            engine.ensure_user("u1", None, "GRADE_3").await.unwrap();
            let now = Utc::now();

            for (i, is_correct) in is_corrects.iter().enumerate() {
                engine
                    .record_attempt(
                        "u1",
                        &format!("q{i}"),
                        &["math_3_1.1.1.1".to_string()],
                        *is_correct,
                        5.0,
                        now,
                    )
                    .await
                    .unwrap();
            }

            let stats = engine.stats("u1", now).await.unwrap();
            let stat = stats.per_skill["math_3_1.1.1.1"].clone();
            (stat.correct_count, stat.practice_count, stat.strength)
        });

        proptest::prop_assert!(correct_count <= practice_count);
        proptest::prop_assert!((0.0..=1.0).contains(&strength));
    }
}
