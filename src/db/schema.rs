//! Idempotent schema bootstrap. Timestamps are integer milliseconds UTC;
//! tag lists and session payloads are JSON text.

use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS topics (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        name TEXT NOT NULL,
        language TEXT NOT NULL DEFAULT 'en'
    )",
    "CREATE TABLE IF NOT EXISTS core_loops (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        topic_id TEXT NOT NULL REFERENCES topics(id),
        language TEXT NOT NULL DEFAULT 'en'
    )",
    "CREATE TABLE IF NOT EXISTS exercises (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        topic_id TEXT NOT NULL REFERENCES topics(id),
        primary_core_loop_id TEXT NOT NULL REFERENCES core_loops(id),
        difficulty TEXT NOT NULL,
        type TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        analyzed INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS exercise_core_loops (
        exercise_id TEXT NOT NULL REFERENCES exercises(id),
        core_loop_id TEXT NOT NULL REFERENCES core_loops(id),
        step_number INTEGER NOT NULL,
        PRIMARY KEY (exercise_id, core_loop_id)
    )",
    "CREATE TABLE IF NOT EXISTS review_state (
        student_id TEXT NOT NULL,
        core_loop_id TEXT NOT NULL REFERENCES core_loops(id),
        easiness_factor REAL NOT NULL DEFAULT 2.5,
        repetition_number INTEGER NOT NULL DEFAULT 0,
        interval_days INTEGER NOT NULL DEFAULT 0,
        next_review INTEGER,
        last_reviewed INTEGER,
        total_attempts INTEGER NOT NULL DEFAULT 0,
        correct_attempts INTEGER NOT NULL DEFAULT 0,
        mastery_score REAL NOT NULL DEFAULT 0,
        PRIMARY KEY (student_id, core_loop_id)
    )",
    "CREATE TABLE IF NOT EXISTS topic_mastery (
        student_id TEXT NOT NULL,
        topic_id TEXT NOT NULL,
        mastery_score REAL NOT NULL DEFAULT 0,
        last_updated INTEGER NOT NULL,
        PRIMARY KEY (student_id, topic_id)
    )",
    "CREATE TABLE IF NOT EXISTS course_mastery (
        student_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        mastery_score REAL NOT NULL DEFAULT 0,
        last_updated INTEGER NOT NULL,
        PRIMARY KEY (student_id, course_id)
    )",
    "CREATE TABLE IF NOT EXISTS quiz_sessions (
        id TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        quiz_type TEXT NOT NULL,
        filters_json TEXT NOT NULL DEFAULT '{}',
        question_ids_json TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL,
        completed_at INTEGER,
        state TEXT NOT NULL DEFAULT 'open'
    )",
    "CREATE TABLE IF NOT EXISTS quiz_answers (
        session_id TEXT NOT NULL REFERENCES quiz_sessions(id),
        question_index INTEGER NOT NULL,
        exercise_id TEXT NOT NULL,
        user_answer TEXT NOT NULL,
        score REAL NOT NULL,
        correct INTEGER NOT NULL,
        hint_used INTEGER NOT NULL DEFAULT 0,
        time_taken_s REAL NOT NULL DEFAULT 0,
        submitted_at INTEGER NOT NULL,
        PRIMARY KEY (session_id, question_index)
    )",
    "CREATE TABLE IF NOT EXISTS prerequisite_edges (
        prereq_core_loop_id TEXT NOT NULL,
        dependent_core_loop_id TEXT NOT NULL,
        PRIMARY KEY (prereq_core_loop_id, dependent_core_loop_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_exercises_course_primary
        ON exercises(course_id, primary_core_loop_id)",
    "CREATE INDEX IF NOT EXISTS idx_review_state_student_due
        ON review_state(student_id, next_review)",
    "CREATE INDEX IF NOT EXISTS idx_exercise_core_loops_loop
        ON exercise_core_loops(core_loop_id)",
    "CREATE INDEX IF NOT EXISTS idx_quiz_sessions_student
        ON quiz_sessions(student_id, course_id, created_at)",
];

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = STATEMENTS.len(), "schema migration complete");
    Ok(())
}
