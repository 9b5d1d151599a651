//! End-to-end scenarios over the full engine: in-memory store, fixed clock,
//! scripted evaluator.

mod common;

use chrono::Duration;
use uuid::Uuid;

use examina_engine::engine::types::{
    Difficulty, EngineError, MasteryScope, QuizFilters, QuizType, SubmitOptions,
};

use common::{
    fixed_now, seed_course, seed_exercise, seed_loop, seed_topic, set_loop_mastery, setup,
    COURSE, STUDENT,
};

// =============================================================================
// Scenario 1: fresh student, review quiz on empty state
// =============================================================================

#[tokio::test]
async fn review_quiz_on_fresh_state_returns_everything() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 3).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Review, 3, QuizFilters::default(), false)
        .await
        .expect("create review session");

    assert_eq!(session.question_ids.len(), 3);
    let mut sorted = session.question_ids.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["cs101-ex-0", "cs101-ex-1", "cs101-ex-2"]);
}

// =============================================================================
// Scenarios 2 + 3: perfect streak then failure reset
// =============================================================================

async fn answer_once(h: &common::Harness, score: &str) -> examina_engine::engine::types::SubmitOutcome {
    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 1, QuizFilters::default(), false)
        .await
        .expect("create session");
    let exercise_id = session.question_ids[0].clone();
    h.engine
        .submit_answer(session.id, &exercise_id, score, 30.0, false, SubmitOptions::default())
        .await
        .expect("submit answer")
}

#[tokio::test]
async fn perfect_streak_then_failure_reset() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    // Three perfect answers: intervals 1, 6, 15; EF pinned at the 2.5 clamp.
    let mut intervals = Vec::new();
    let mut masteries = Vec::new();
    for _ in 0..3 {
        let outcome = answer_once(&h, "1.0").await;
        intervals.push(outcome.review_state.interval_days);
        masteries.push(outcome.review_state.mastery_score);
    }
    assert_eq!(intervals, vec![1, 6, 15]);

    let state = h
        .engine
        .store()
        .review_state(STUDENT, "cs101-loop-0")
        .await
        .unwrap()
        .expect("state exists");
    assert_eq!(state.repetition_number, 3);
    assert_eq!(state.easiness_factor, 2.5);
    assert_eq!(state.next_review, Some(fixed_now() + Duration::days(15)));
    assert!(masteries.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(state.total_attempts, 3);
    assert_eq!(state.correct_attempts, 3);

    // A failing answer resets the schedule but leaves EF at the clamp.
    let outcome = answer_once(&h, "0.1").await;
    assert_eq!(outcome.review_state.repetition_number, 0);
    assert_eq!(outcome.review_state.interval_days, 1);
    assert_eq!(outcome.review_state.easiness_factor, 2.5);
    assert_eq!(
        outcome.review_state.next_review,
        Some(fixed_now() + Duration::days(1))
    );
    assert!(!outcome.correct);
}

// =============================================================================
// Scenario 4: cascade across two core loops
// =============================================================================

#[tokio::test]
async fn cascade_touches_every_linked_loop() {
    let h = setup().await;
    seed_topic(&h.engine, "t1", COURSE).await;
    seed_loop(&h.engine, "c1", "t1").await;
    seed_loop(&h.engine, "c2", "t1").await;
    seed_exercise(&h.engine, "ex-multi", COURSE, "t1", &["c1", "c2"], Difficulty::Medium).await;

    for _ in 0..2 {
        answer_once(&h, "1.0").await;
    }

    let primary = h
        .engine
        .store()
        .review_state(STUDENT, "c1")
        .await
        .unwrap()
        .expect("primary state");
    let secondary = h
        .engine
        .store()
        .review_state(STUDENT, "c2")
        .await
        .unwrap()
        .expect("secondary state");

    assert_eq!(primary.total_attempts, 2);
    assert_eq!(secondary.total_attempts, 2);
    assert!(primary.mastery_score > secondary.mastery_score);
    // EWMA with alpha 0.3 / 0.15 from zero
    assert!((primary.mastery_score - 0.51).abs() < 1e-9);
    assert!((secondary.mastery_score - 0.2775).abs() < 1e-9);

    // Topic mastery is the attempt-weighted mean of its loops.
    let (topic_mastery, _) = h
        .engine
        .store()
        .topic_mastery(STUDENT, "t1")
        .await
        .unwrap()
        .expect("topic aggregate");
    let expected = (primary.mastery_score * 2.0 + secondary.mastery_score * 2.0) / 4.0;
    assert!((topic_mastery - expected).abs() < 1e-9);

    let report = h
        .engine
        .mastery(STUDENT, MasteryScope::Course(COURSE.to_string()))
        .await
        .unwrap();
    assert!((report.mastery_score - expected).abs() < 1e-9);
    assert_eq!(report.total_attempts, 4);
}

#[tokio::test]
async fn secondary_movement_is_at_most_half_of_primary() {
    let h = setup().await;
    seed_topic(&h.engine, "t1", COURSE).await;
    seed_loop(&h.engine, "c1", "t1").await;
    seed_loop(&h.engine, "c2", "t1").await;
    seed_exercise(&h.engine, "ex-multi", COURSE, "t1", &["c1", "c2"], Difficulty::Medium).await;

    answer_once(&h, "1.0").await;

    let primary = h.engine.store().review_state(STUDENT, "c1").await.unwrap().unwrap();
    let secondary = h.engine.store().review_state(STUDENT, "c2").await.unwrap().unwrap();
    assert_eq!(primary.total_attempts, 1);
    assert_eq!(secondary.total_attempts, 1);
    assert!(secondary.mastery_score <= primary.mastery_score / 2.0 + 1e-12);
}

// =============================================================================
// Scenario 5: adaptive quiz mix
// =============================================================================

#[tokio::test]
async fn adaptive_quiz_hits_the_target_mix() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 20).await;

    for i in 0..20 {
        let mastery = if i < 8 {
            0.2 // weak
        } else if i < 14 {
            0.6 // learning
        } else {
            0.8 // strong
        };
        set_loop_mastery(&h.engine, STUDENT, &format!("cs101-loop-{i}"), mastery).await;
    }

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Adaptive, 10, QuizFilters::default(), false)
        .await
        .expect("create adaptive session");
    assert_eq!(session.question_ids.len(), 10);

    let mut weak = 0;
    let mut learning = 0;
    let mut strong = 0;
    for question_id in &session.question_ids {
        let exercise = h
            .engine
            .store()
            .exercise(question_id)
            .await
            .unwrap()
            .expect("exercise");
        let state = h
            .engine
            .store()
            .review_state(STUDENT, exercise.primary_core_loop())
            .await
            .unwrap()
            .expect("state");
        if state.mastery_score < 0.5 {
            weak += 1;
        } else if state.mastery_score < 0.7 {
            learning += 1;
        } else {
            strong += 1;
        }
    }
    assert_eq!((weak, learning, strong), (4, 4, 2));
}

// =============================================================================
// Scenario 6: prerequisite gate
// =============================================================================

#[tokio::test]
async fn weak_prerequisite_blocks_learning_unless_forced() {
    let h = setup().await;
    seed_topic(&h.engine, "t1", COURSE).await;
    seed_loop(&h.engine, "c1", "t1").await;
    seed_loop(&h.engine, "c2", "t1").await;

    h.engine.add_prerequisite("c1", "c2").await.expect("add edge");
    set_loop_mastery(&h.engine, STUDENT, "c1", 0.15).await;

    let blocked = h.engine.gate_learn(STUDENT, "c2", false).await;
    match blocked {
        Err(EngineError::PrerequisiteBlocked { weak_prereqs }) => {
            assert_eq!(weak_prereqs, vec!["c1".to_string()]);
        }
        other => panic!("expected PrerequisiteBlocked, got {other:?}"),
    }

    h.engine
        .gate_learn(STUDENT, "c2", true)
        .await
        .expect("forced learn proceeds");
}

#[tokio::test]
async fn cycle_rejected_and_graph_unchanged() {
    let h = setup().await;
    seed_topic(&h.engine, "t1", COURSE).await;
    for id in ["a", "b", "c"] {
        seed_loop(&h.engine, id, "t1").await;
    }
    h.engine.add_prerequisite("a", "b").await.unwrap();
    h.engine.add_prerequisite("b", "c").await.unwrap();

    let rejected = h.engine.add_prerequisite("c", "a").await;
    assert!(matches!(rejected, Err(EngineError::WouldCreateCycle { .. })));

    let edges = h.engine.store().prereq_edges().await.unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(h.engine.prereqs_of("c").await.unwrap(), vec!["b", "a"]);
    assert_eq!(h.engine.dependents_of("a").await.unwrap(), vec!["b", "c"]);
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn question_list_is_frozen_at_creation() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 3).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 10, QuizFilters::default(), false)
        .await
        .unwrap();
    let original = session.question_ids.clone();
    assert_eq!(original.len(), 3);

    // New ingest after creation does not change the frozen list.
    seed_loop(&h.engine, "late-loop", "t1").await;
    seed_exercise(&h.engine, "late-ex", COURSE, "t1", &["late-loop"], Difficulty::Easy).await;

    let reloaded = h.engine.session_status(session.id).await.unwrap();
    assert_eq!(reloaded.session.question_ids, original);
}

#[tokio::test]
async fn submissions_are_ordered_and_idempotent() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 3).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 3, QuizFilters::default(), false)
        .await
        .unwrap();
    let first = session.question_ids[0].clone();
    let second = session.question_ids[1].clone();

    // Answering the second question before the first is rejected.
    let out_of_order = h
        .engine
        .submit_answer(session.id, &second, "1.0", 10.0, false, SubmitOptions::default())
        .await;
    assert!(matches!(
        out_of_order,
        Err(EngineError::OutOfOrderSubmission { expected_index: 0, .. })
    ));

    h.engine
        .submit_answer(session.id, &first, "1.0", 10.0, false, SubmitOptions::default())
        .await
        .expect("first submission");

    // Re-submitting the answered question is AlreadyAnswered, not overwrite.
    let duplicate = h
        .engine
        .submit_answer(session.id, &first, "0.2", 10.0, false, SubmitOptions::default())
        .await;
    assert!(matches!(
        duplicate,
        Err(EngineError::AlreadyAnswered { question_index: 0 })
    ));

    let answers = h.engine.store().answers_for_session(session.id).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert!((answers[0].score - 1.0).abs() < 1e-12);

    let next = h.engine.next_question(session.id).await.unwrap().expect("next");
    assert_eq!(next.question_index, 1);
    assert_eq!(next.exercise_id, second);
}

#[tokio::test]
async fn completion_is_idempotent() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 2).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 2, QuizFilters::default(), false)
        .await
        .unwrap();
    for question_id in session.question_ids.clone() {
        h.engine
            .submit_answer(session.id, &question_id, "0.8", 20.0, false, SubmitOptions::default())
            .await
            .unwrap();
    }

    let first = h.engine.complete_session(session.id).await.unwrap();
    assert_eq!(first.total_questions, 2);
    assert_eq!(first.answered, 2);
    assert!((first.percent - 80.0).abs() < 1e-9);
    assert!(first.passed);

    let second = h.engine.complete_session(session.id).await.unwrap();
    assert_eq!(first, second);

    // No further submissions once complete.
    let refused = h
        .engine
        .submit_answer(
            session.id,
            &session.question_ids[0],
            "1.0",
            5.0,
            false,
            SubmitOptions::default(),
        )
        .await;
    assert!(matches!(refused, Err(EngineError::SessionComplete)));
}

#[tokio::test]
async fn incomplete_sessions_count_unanswered_as_zero() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 4).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 4, QuizFilters::default(), false)
        .await
        .unwrap();
    h.engine
        .submit_answer(
            session.id,
            &session.question_ids[0].clone(),
            "1.0",
            10.0,
            false,
            SubmitOptions::default(),
        )
        .await
        .unwrap();

    let summary = h.engine.complete_session(session.id).await.unwrap();
    assert_eq!(summary.answered, 1);
    assert!((summary.percent - 25.0).abs() < 1e-9);
    assert!(!summary.passed);
}

#[tokio::test]
async fn abandoned_sessions_refuse_work() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 1, QuizFilters::default(), false)
        .await
        .unwrap();
    h.engine.abandon_session(session.id).await.unwrap();
    // idempotent
    h.engine.abandon_session(session.id).await.unwrap();

    let refused = h
        .engine
        .submit_answer(
            session.id,
            &session.question_ids[0],
            "1.0",
            5.0,
            false,
            SubmitOptions::default(),
        )
        .await;
    assert!(matches!(refused, Err(EngineError::SessionComplete)));
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let h = setup().await;
    let missing = h.engine.next_question(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(EngineError::SessionNotFound(_))));
}

// =============================================================================
// Evaluator failure handling
// =============================================================================

#[tokio::test]
async fn evaluator_failure_mutates_nothing_without_fallback() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 1, QuizFilters::default(), false)
        .await
        .unwrap();

    h.evaluator.set_fail(true);
    let refused = h
        .engine
        .submit_answer(
            session.id,
            &session.question_ids[0],
            "1.0",
            5.0,
            false,
            SubmitOptions::default(),
        )
        .await;
    assert!(matches!(refused, Err(EngineError::EvaluatorUnavailable(_))));

    assert!(h
        .engine
        .store()
        .review_state(STUDENT, "cs101-loop-0")
        .await
        .unwrap()
        .is_none());
    assert!(h
        .engine
        .store()
        .answers_for_session(session.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn evaluator_failure_with_fallback_records_a_failed_attempt() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 1, QuizFilters::default(), false)
        .await
        .unwrap();

    h.evaluator.set_fail(true);
    let outcome = h
        .engine
        .submit_answer(
            session.id,
            &session.question_ids[0],
            "1.0",
            5.0,
            false,
            SubmitOptions {
                evaluator_fallback: true,
                ..Default::default()
            },
        )
        .await
        .expect("fallback submission");

    assert!(!outcome.correct);
    assert_eq!(outcome.score, 0.0);
    assert!(outcome.feedback.contains("unavailable"));

    // The failed attempt still drives SM-2.
    let state = h
        .engine
        .store()
        .review_state(STUDENT, "cs101-loop-0")
        .await
        .unwrap()
        .expect("state recorded");
    assert_eq!(state.total_attempts, 1);
    assert_eq!(state.repetition_number, 0);
    assert_eq!(state.interval_days, 1);
}

#[tokio::test]
async fn dry_run_previews_without_persisting() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 1, QuizFilters::default(), false)
        .await
        .unwrap();

    let outcome = h
        .engine
        .submit_answer(
            session.id,
            &session.question_ids[0],
            "1.0",
            5.0,
            false,
            SubmitOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.review_state.total_attempts, 1); // preview only

    assert!(h
        .engine
        .store()
        .review_state(STUDENT, "cs101-loop-0")
        .await
        .unwrap()
        .is_none());
    assert!(h
        .engine
        .store()
        .answers_for_session(session.id)
        .await
        .unwrap()
        .is_empty());
    // The question is still open.
    let next = h.engine.next_question(session.id).await.unwrap().expect("still open");
    assert_eq!(next.question_index, 0);
}

// =============================================================================
// Selector behavior
// =============================================================================

#[tokio::test]
async fn review_mode_only_returns_due_exercises() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 6).await;

    // Loops 0-2 are due in the future, 3-4 overdue, 5 untouched.
    for i in 0..3 {
        set_loop_mastery(&h.engine, STUDENT, &format!("cs101-loop-{i}"), 0.6).await;
    }
    for i in 3..5 {
        let mut state = examina_engine::engine::types::ReviewState::new(
            STUDENT,
            format!("cs101-loop-{i}"),
        );
        state.total_attempts = 1;
        state.mastery_score = 0.4;
        state.next_review = Some(fixed_now() - Duration::days(2));
        h.engine.store().upsert_review_state(&state).await.unwrap();
    }

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Review, 10, QuizFilters::default(), false)
        .await
        .unwrap();

    let mut expected = vec!["cs101-ex-3", "cs101-ex-4", "cs101-ex-5"];
    let mut got = session.question_ids.clone();
    expected.sort();
    got.sort();
    assert_eq!(got, expected);
    // Never-reviewed first, then the overdue ones by review date.
    assert_eq!(session.question_ids[0], "cs101-ex-5");
}

#[tokio::test]
async fn different_sessions_shuffle_differently() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 12).await;

    let mut orders = Vec::new();
    for _ in 0..3 {
        let session = h
            .engine
            .create_session(STUDENT, COURSE, QuizType::Review, 12, QuizFilters::default(), false)
            .await
            .unwrap();
        orders.push(session.question_ids);
    }
    assert!(
        orders[0] != orders[1] || orders[1] != orders[2],
        "three sessions produced identical orderings"
    );
}

#[tokio::test]
async fn filters_are_validated_and_can_exhaust_the_pool() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 2).await;

    let unknown_topic = h
        .engine
        .create_session(
            STUDENT,
            COURSE,
            QuizType::Topic,
            5,
            QuizFilters {
                topic_id: Some("nope".to_string()),
                ..Default::default()
            },
            false,
        )
        .await;
    assert!(matches!(unknown_topic, Err(EngineError::InvalidFilter(_))));

    let empty = h
        .engine
        .create_session(
            STUDENT,
            COURSE,
            QuizType::Random,
            5,
            QuizFilters {
                difficulty: Some(Difficulty::Hard),
                ..Default::default()
            },
            false,
        )
        .await;
    assert!(matches!(empty, Err(EngineError::NoCandidates)));
}

// =============================================================================
// Advisor queries
// =============================================================================

#[tokio::test]
async fn depth_follows_mastery_bands() {
    use examina_engine::engine::types::TutoringDepth;

    let h = setup().await;
    seed_topic(&h.engine, "t1", COURSE).await;
    for id in ["novice", "middle", "expert"] {
        seed_loop(&h.engine, id, "t1").await;
    }
    set_loop_mastery(&h.engine, STUDENT, "middle", 0.5).await;
    set_loop_mastery(&h.engine, STUDENT, "expert", 0.85).await;

    assert_eq!(
        h.engine.recommended_depth(STUDENT, "novice").await.unwrap(),
        TutoringDepth::Basic
    );
    assert_eq!(
        h.engine.recommended_depth(STUDENT, "middle").await.unwrap(),
        TutoringDepth::Medium
    );
    assert_eq!(
        h.engine.recommended_depth(STUDENT, "expert").await.unwrap(),
        TutoringDepth::Advanced
    );

    assert!(h
        .engine
        .should_show_prerequisites(STUDENT, "novice")
        .await
        .unwrap());
    assert!(!h
        .engine
        .should_show_prerequisites(STUDENT, "expert")
        .await
        .unwrap());
}

#[tokio::test]
async fn learning_path_orders_by_urgency_and_dedupes() {
    use examina_engine::engine::types::PathReason;

    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 4).await;

    // loop-0 overdue (weak too: dedupe keeps the overdue entry), loop-1 weak,
    // loop-2 strong and not due, loop-3 untouched.
    let mut overdue = examina_engine::engine::types::ReviewState::new(STUDENT, "cs101-loop-0");
    overdue.total_attempts = 2;
    overdue.mastery_score = 0.3;
    overdue.next_review = Some(fixed_now() - Duration::days(4));
    h.engine.store().upsert_review_state(&overdue).await.unwrap();
    set_loop_mastery(&h.engine, STUDENT, "cs101-loop-1", 0.35).await;
    set_loop_mastery(&h.engine, STUDENT, "cs101-loop-2", 0.9).await;

    let path = h.engine.learning_path(STUDENT, COURSE, 10).await.unwrap();

    assert_eq!(path[0].core_loop_id, "cs101-loop-0");
    assert_eq!(path[0].reason, PathReason::OverdueReview);
    assert_eq!(path[0].days_overdue, Some(4));
    assert_eq!(path[1].core_loop_id, "cs101-loop-1");
    assert_eq!(path[1].reason, PathReason::WeakArea);
    let fresh: Vec<_> = path
        .iter()
        .filter(|i| i.reason == PathReason::NewContent)
        .collect();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].core_loop_id, "cs101-loop-3");

    // Each loop appears once.
    let mut ids: Vec<_> = path.iter().map(|i| i.core_loop_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), path.len());
}

#[tokio::test]
async fn knowledge_gaps_grade_by_severity() {
    use examina_engine::engine::types::GapSeverity;

    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 4).await;
    set_loop_mastery(&h.engine, STUDENT, "cs101-loop-0", 0.1).await;
    set_loop_mastery(&h.engine, STUDENT, "cs101-loop-1", 0.25).await;
    set_loop_mastery(&h.engine, STUDENT, "cs101-loop-2", 0.45).await;
    set_loop_mastery(&h.engine, STUDENT, "cs101-loop-3", 0.8).await;

    let gaps = h.engine.knowledge_gaps(STUDENT, COURSE).await.unwrap();
    assert_eq!(gaps.len(), 3);
    assert_eq!(gaps[0].severity, GapSeverity::High);
    assert_eq!(gaps[1].severity, GapSeverity::Medium);
    assert_eq!(gaps[2].severity, GapSeverity::Low);
}

#[tokio::test]
async fn due_items_report_overdue_days() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 2).await;

    let mut state = examina_engine::engine::types::ReviewState::new(STUDENT, "cs101-loop-0");
    state.total_attempts = 1;
    state.next_review = Some(fixed_now() - Duration::days(3));
    h.engine.store().upsert_review_state(&state).await.unwrap();

    let items = h.engine.due_items(STUDENT, COURSE, fixed_now()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].core_loop_id, "cs101-loop-0");
    assert_eq!(items[0].days_overdue, 3);
}

// =============================================================================
// Reset + analytics + hygiene
// =============================================================================

#[tokio::test]
async fn reset_restores_defaults_and_aggregates() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    for _ in 0..2 {
        answer_once(&h, "1.0").await;
    }
    let state = h
        .engine
        .reset_review_state(STUDENT, "cs101-loop-0")
        .await
        .unwrap();
    assert_eq!(state.total_attempts, 0);
    assert_eq!(state.mastery_score, 0.0);
    assert_eq!(state.repetition_number, 0);
    assert_eq!(state.next_review, None);

    let (topic_mastery, _) = h
        .engine
        .store()
        .topic_mastery(STUDENT, "t1")
        .await
        .unwrap()
        .expect("aggregate recomputed");
    assert_eq!(topic_mastery, 0.0);
}

#[tokio::test]
async fn course_summary_counts_progress() {
    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 3).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 3, QuizFilters::default(), false)
        .await
        .unwrap();
    for question_id in session.question_ids.clone() {
        h.engine
            .submit_answer(session.id, &question_id, "1.0", 30.0, false, SubmitOptions::default())
            .await
            .unwrap();
    }
    h.engine.complete_session(session.id).await.unwrap();

    let summary = h.engine.course_summary(STUDENT, COURSE).await.unwrap();
    assert_eq!(summary.total_exercises, 3);
    assert_eq!(summary.exercises_attempted, 3);
    assert_eq!(summary.quiz_sessions_completed, 1);
    assert_eq!(summary.core_loops_attempted, 3);
    assert!((summary.avg_session_percent - 100.0).abs() < 1e-9);
    assert!((summary.total_time_spent_s - 90.0).abs() < 1e-9);
    assert!(summary.overall_mastery > 0.0);

    let suggestions = h.engine.study_suggestions(STUDENT, COURSE).await.unwrap();
    assert!(!suggestions.is_empty());
}

#[tokio::test]
async fn stale_open_sessions_are_abandoned() {
    use examina_engine::engine::types::SessionState;

    let h = setup().await;
    seed_course(&h.engine, COURSE, "t1", 1).await;

    let session = h
        .engine
        .create_session(STUDENT, COURSE, QuizType::Random, 1, QuizFilters::default(), false)
        .await
        .unwrap();

    h.clock.advance_days(2);
    let abandoned = h
        .engine
        .abandon_stale_sessions(std::time::Duration::from_secs(24 * 3600))
        .await
        .unwrap();
    assert_eq!(abandoned, 1);

    let status = h.engine.session_status(session.id).await.unwrap();
    assert_eq!(status.session.state, SessionState::Abandoned);
}
