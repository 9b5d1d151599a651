#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use examina_engine::db::Database;
use examina_engine::engine::clock::FixedClock;
use examina_engine::engine::evaluator::{AnswerEvaluator, EvaluatorError};
use examina_engine::engine::store::MasteryStore;
use examina_engine::engine::types::{
    CoreLoop, Difficulty, Evaluation, Exercise, ExerciseKind, LoopKind, ReviewState, Topic,
};
use examina_engine::engine::LearningEngine;

pub const STUDENT: &str = "student-1";
pub const COURSE: &str = "cs101";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Evaluator that grades by parsing the submitted answer as a score in
/// [0, 1], so each test drives the outcome it wants. Flip `fail` to simulate
/// an unavailable backend.
pub struct ScriptedEvaluator {
    fail: AtomicBool,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnswerEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _exercise_id: &str,
        user_answer: &str,
        _language: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EvaluatorError::EmptyChoices);
        }
        let score = user_answer.trim().parse::<f64>().unwrap_or(0.0).clamp(0.0, 1.0);
        Ok(Evaluation {
            score,
            correct: score >= 0.7,
            feedback: format!("scored {score}"),
        })
    }
}

pub struct Harness {
    pub engine: LearningEngine,
    pub clock: Arc<FixedClock>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub db: Database,
}

pub async fn setup() -> Harness {
    let db = Database::in_memory().await.expect("in-memory database");
    let clock = Arc::new(FixedClock::new(fixed_now()));
    let evaluator = Arc::new(ScriptedEvaluator::new());
    let engine = LearningEngine::new(
        MasteryStore::new(db.pool().clone()),
        Arc::clone(&evaluator) as Arc<dyn AnswerEvaluator>,
        Arc::clone(&clock) as Arc<dyn examina_engine::engine::clock::Clock>,
    );
    Harness {
        engine,
        clock,
        evaluator,
        db,
    }
}

pub async fn seed_topic(engine: &LearningEngine, id: &str, course_id: &str) {
    engine
        .store()
        .insert_topic(&Topic {
            id: id.to_string(),
            course_id: course_id.to_string(),
            name: format!("Topic {id}"),
            language: "en".to_string(),
        })
        .await
        .expect("insert topic");
}

pub async fn seed_loop(engine: &LearningEngine, id: &str, topic_id: &str) {
    engine
        .store()
        .insert_core_loop(&CoreLoop {
            id: id.to_string(),
            name: format!("Loop {id}"),
            kind: LoopKind::Design,
            topic_id: topic_id.to_string(),
            language: "en".to_string(),
        })
        .await
        .expect("insert core loop");
}

pub async fn seed_exercise(
    engine: &LearningEngine,
    id: &str,
    course_id: &str,
    topic_id: &str,
    core_loop_ids: &[&str],
    difficulty: Difficulty,
) {
    engine
        .store()
        .insert_exercise(&Exercise {
            id: id.to_string(),
            course_id: course_id.to_string(),
            topic_id: topic_id.to_string(),
            core_loop_ids: core_loop_ids.iter().map(|s| s.to_string()).collect(),
            difficulty,
            kind: ExerciseKind::Procedural,
            tags: Vec::new(),
            analyzed: true,
        })
        .await
        .expect("insert exercise");
}

/// One topic, `n` loops, one exercise per loop.
pub async fn seed_course(engine: &LearningEngine, course_id: &str, topic_id: &str, n: usize) {
    seed_topic(engine, topic_id, course_id).await;
    for i in 0..n {
        let loop_id = format!("{course_id}-loop-{i}");
        seed_loop(engine, &loop_id, topic_id).await;
        seed_exercise(
            engine,
            &format!("{course_id}-ex-{i}"),
            course_id,
            topic_id,
            &[loop_id.as_str()],
            Difficulty::Medium,
        )
        .await;
    }
}

/// Pin a loop's mastery directly: one prior attempt, next review in three
/// days (so it is neither new nor due).
pub async fn set_loop_mastery(engine: &LearningEngine, student_id: &str, loop_id: &str, mastery: f64) {
    let now = fixed_now();
    let state = ReviewState {
        student_id: student_id.to_string(),
        core_loop_id: loop_id.to_string(),
        easiness_factor: 2.5,
        repetition_number: 1,
        interval_days: 3,
        next_review: Some(now + Duration::days(3)),
        last_reviewed: Some(now - Duration::days(1)),
        total_attempts: 1,
        correct_attempts: if mastery >= 0.7 { 1 } else { 0 },
        mastery_score: mastery,
    };
    engine
        .store()
        .upsert_review_state(&state)
        .await
        .expect("upsert review state");
}
