//! Single source of truth for all engine state.
//!
//! Every multi-row mutation happens inside one transaction so readers observe
//! either the pre- or post-cascade snapshot, never a mix. Timestamps are
//! stored as integer milliseconds UTC.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::engine::types::{
    CoreLoop, Difficulty, EngineError, Exercise, ExerciseKind, LoopKind, QuizAnswer, QuizFilters,
    QuizSession, QuizType, ReviewState, SessionState, Topic,
};

#[derive(Clone)]
pub struct MasteryStore {
    pool: SqlitePool,
}

/// Per-loop exercise statistics used to order new content.
#[derive(Debug, Clone)]
pub struct LoopExerciseStats {
    pub core_loop_id: String,
    pub exercise_count: i64,
    pub easiest_difficulty: Difficulty,
}

impl MasteryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---------------------------------------------------------------- ingest

    pub async fn insert_topic(&self, topic: &Topic) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO topics (id, course_id, name, language) VALUES (?, ?, ?, ?)",
        )
        .bind(&topic.id)
        .bind(&topic.course_id)
        .bind(&topic.name)
        .bind(&topic.language)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_core_loop(&self, core_loop: &CoreLoop) -> Result<(), EngineError> {
        if !self.topic_exists(&core_loop.topic_id).await? {
            return Err(EngineError::InvalidFilter(format!(
                "unknown topic '{}'",
                core_loop.topic_id
            )));
        }
        sqlx::query(
            "INSERT INTO core_loops (id, name, type, topic_id, language) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&core_loop.id)
        .bind(&core_loop.name)
        .bind(core_loop.kind.as_str())
        .bind(&core_loop.topic_id)
        .bind(&core_loop.language)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Exercises are immutable after ingest; the primary core loop is
    /// materialized in its own column for indexed lookup.
    pub async fn insert_exercise(&self, exercise: &Exercise) -> Result<(), EngineError> {
        if exercise.core_loop_ids.is_empty() {
            return Err(EngineError::InternalInvariantViolated(format!(
                "exercise '{}' references no core loops",
                exercise.id
            )));
        }
        for loop_id in &exercise.core_loop_ids {
            if !self.core_loop_exists(loop_id).await? {
                return Err(EngineError::InvalidFilter(format!(
                    "unknown core loop '{loop_id}'"
                )));
            }
        }

        let tags = serde_json::to_string(&exercise.tags).unwrap_or_else(|_| "[]".to_string());
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO exercises \
             (id, course_id, topic_id, primary_core_loop_id, difficulty, type, tags, analyzed) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&exercise.id)
        .bind(&exercise.course_id)
        .bind(&exercise.topic_id)
        .bind(exercise.primary_core_loop())
        .bind(exercise.difficulty.as_str())
        .bind(exercise.kind.as_str())
        .bind(&tags)
        .bind(exercise.analyzed)
        .execute(&mut *tx)
        .await?;

        for (step, loop_id) in exercise.core_loop_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO exercise_core_loops (exercise_id, core_loop_id, step_number) \
                 VALUES (?, ?, ?)",
            )
            .bind(&exercise.id)
            .bind(loop_id)
            .bind(step as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---------------------------------------------------------------- corpus

    pub async fn topic(&self, id: &str) -> Result<Option<Topic>, EngineError> {
        let row = sqlx::query(
            "SELECT id, course_id, name, language FROM topics WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_topic_row))
    }

    pub async fn topic_exists(&self, id: &str) -> Result<bool, EngineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn topics_for_course(&self, course_id: &str) -> Result<Vec<Topic>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, course_id, name, language FROM topics WHERE course_id = ? ORDER BY id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(map_topic_row).collect())
    }

    pub async fn core_loop(&self, id: &str) -> Result<Option<CoreLoop>, EngineError> {
        let row = sqlx::query(
            "SELECT id, name, type, topic_id, language FROM core_loops WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_core_loop_row))
    }

    pub async fn core_loop_exists(&self, id: &str) -> Result<bool, EngineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM core_loops WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn core_loops_for_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<CoreLoop>, EngineError> {
        let rows = sqlx::query(
            "SELECT cl.id, cl.name, cl.type, cl.topic_id, cl.language \
             FROM core_loops cl JOIN topics t ON t.id = cl.topic_id \
             WHERE t.course_id = ? ORDER BY cl.id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(map_core_loop_row).collect())
    }

    pub async fn exercise(&self, id: &str) -> Result<Option<Exercise>, EngineError> {
        let row = sqlx::query(
            "SELECT id, course_id, topic_id, difficulty, type, tags, analyzed \
             FROM exercises WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut exercises = self.attach_core_loops(vec![map_exercise_row(row)]).await?;
        Ok(exercises.pop())
    }

    /// Analyzed exercises for a course, optionally narrowed by filters. The
    /// core-loop filter matches any linked loop, not only the primary.
    pub async fn exercises_for_course(
        &self,
        course_id: &str,
        filters: &QuizFilters,
    ) -> Result<Vec<Exercise>, EngineError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, course_id, topic_id, difficulty, type, tags, analyzed \
             FROM exercises WHERE analyzed = 1 AND course_id = ",
        );
        qb.push_bind(course_id);
        if let Some(topic_id) = &filters.topic_id {
            qb.push(" AND topic_id = ");
            qb.push_bind(topic_id);
        }
        if let Some(difficulty) = filters.difficulty {
            qb.push(" AND difficulty = ");
            qb.push_bind(difficulty.as_str());
        }
        if let Some(kind) = filters.kind {
            qb.push(" AND type = ");
            qb.push_bind(kind.as_str());
        }
        if let Some(core_loop_id) = &filters.core_loop_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM exercise_core_loops ecl \
                 WHERE ecl.exercise_id = exercises.id AND ecl.core_loop_id = ",
            );
            qb.push_bind(core_loop_id);
            qb.push(")");
        }
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let exercises = rows.into_iter().map(map_exercise_row).collect();
        self.attach_core_loops(exercises).await
    }

    async fn attach_core_loops(
        &self,
        mut exercises: Vec<Exercise>,
    ) -> Result<Vec<Exercise>, EngineError> {
        if exercises.is_empty() {
            return Ok(exercises);
        }
        let ids: Vec<String> = exercises.iter().map(|e| e.id.clone()).collect();
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT exercise_id, core_loop_id FROM exercise_core_loops WHERE exercise_id IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for id in &ids {
                sep.push_bind(id);
            }
            sep.push_unseparated(")");
        }
        qb.push(" ORDER BY exercise_id, step_number");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut by_exercise: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let exercise_id: String = row.try_get("exercise_id").unwrap_or_default();
            let core_loop_id: String = row.try_get("core_loop_id").unwrap_or_default();
            by_exercise.entry(exercise_id).or_default().push(core_loop_id);
        }
        for exercise in &mut exercises {
            exercise.core_loop_ids = by_exercise.remove(&exercise.id).unwrap_or_default();
        }
        Ok(exercises)
    }

    pub async fn loop_exercise_stats(
        &self,
        course_id: &str,
    ) -> Result<Vec<LoopExerciseStats>, EngineError> {
        let rows = sqlx::query(
            "SELECT ecl.core_loop_id, e.difficulty, COUNT(*) AS n \
             FROM exercise_core_loops ecl \
             JOIN exercises e ON e.id = ecl.exercise_id \
             WHERE e.course_id = ? AND e.analyzed = 1 \
             GROUP BY ecl.core_loop_id, e.difficulty",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats: HashMap<String, LoopExerciseStats> = HashMap::new();
        for row in rows {
            let loop_id: String = row.try_get("core_loop_id").unwrap_or_default();
            let difficulty =
                Difficulty::from_str(&row.try_get::<String, _>("difficulty").unwrap_or_default());
            let count: i64 = row.try_get("n").unwrap_or(0);
            let entry = stats
                .entry(loop_id.clone())
                .or_insert_with(|| LoopExerciseStats {
                    core_loop_id: loop_id,
                    exercise_count: 0,
                    easiest_difficulty: difficulty,
                });
            entry.exercise_count += count;
            if difficulty.rank() < entry.easiest_difficulty.rank() {
                entry.easiest_difficulty = difficulty;
            }
        }
        Ok(stats.into_values().collect())
    }

    // --------------------------------------------------------- review state

    pub async fn review_state(
        &self,
        student_id: &str,
        core_loop_id: &str,
    ) -> Result<Option<ReviewState>, EngineError> {
        let row = sqlx::query(
            "SELECT student_id, core_loop_id, easiness_factor, repetition_number, interval_days, \
             next_review, last_reviewed, total_attempts, correct_attempts, mastery_score \
             FROM review_state WHERE student_id = ? AND core_loop_id = ? LIMIT 1",
        )
        .bind(student_id)
        .bind(core_loop_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_review_state_row))
    }

    pub async fn review_states(
        &self,
        student_id: &str,
        core_loop_ids: &[String],
    ) -> Result<HashMap<String, ReviewState>, EngineError> {
        if core_loop_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT student_id, core_loop_id, easiness_factor, repetition_number, interval_days, \
             next_review, last_reviewed, total_attempts, correct_attempts, mastery_score \
             FROM review_state WHERE student_id = ",
        );
        qb.push_bind(student_id);
        qb.push(" AND core_loop_id IN (");
        {
            let mut sep = qb.separated(", ");
            for id in core_loop_ids {
                sep.push_bind(id);
            }
            sep.push_unseparated(")");
        }
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(map_review_state_row)
            .map(|state| (state.core_loop_id.clone(), state))
            .collect())
    }

    pub async fn review_states_for_topic(
        &self,
        student_id: &str,
        topic_id: &str,
    ) -> Result<Vec<ReviewState>, EngineError> {
        let rows = sqlx::query(
            "SELECT rs.student_id, rs.core_loop_id, rs.easiness_factor, rs.repetition_number, \
             rs.interval_days, rs.next_review, rs.last_reviewed, rs.total_attempts, \
             rs.correct_attempts, rs.mastery_score \
             FROM review_state rs \
             JOIN core_loops cl ON cl.id = rs.core_loop_id \
             WHERE rs.student_id = ? AND cl.topic_id = ? \
             ORDER BY rs.core_loop_id",
        )
        .bind(student_id)
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(map_review_state_row).collect())
    }

    pub async fn review_states_for_course(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<ReviewState>, EngineError> {
        let rows = sqlx::query(
            "SELECT rs.student_id, rs.core_loop_id, rs.easiness_factor, rs.repetition_number, \
             rs.interval_days, rs.next_review, rs.last_reviewed, rs.total_attempts, \
             rs.correct_attempts, rs.mastery_score \
             FROM review_state rs \
             JOIN core_loops cl ON cl.id = rs.core_loop_id \
             JOIN topics t ON t.id = cl.topic_id \
             WHERE rs.student_id = ? AND t.course_id = ? \
             ORDER BY rs.core_loop_id",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(map_review_state_row).collect())
    }

    pub async fn upsert_review_state(&self, state: &ReviewState) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;
        upsert_review_state_tx(&mut tx, state).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Restore SM-2 defaults for one loop and recompute the affected
    /// aggregates, all in one transaction.
    pub async fn reset_review_state(
        &self,
        student_id: &str,
        core_loop_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReviewState, EngineError> {
        let Some(core_loop) = self.core_loop(core_loop_id).await? else {
            return Err(EngineError::InvalidFilter(format!(
                "unknown core loop '{core_loop_id}'"
            )));
        };
        let Some(topic) = self.topic(&core_loop.topic_id).await? else {
            return Err(EngineError::InternalInvariantViolated(format!(
                "core loop '{core_loop_id}' references missing topic '{}'",
                core_loop.topic_id
            )));
        };

        let fresh = ReviewState::new(student_id, core_loop_id);
        let mut tx = self.pool.begin().await?;
        upsert_review_state_tx(&mut tx, &fresh).await?;
        recompute_topic_mastery_tx(&mut tx, student_id, &topic.id, now).await?;
        recompute_course_mastery_tx(&mut tx, student_id, &topic.course_id, now).await?;
        tx.commit().await?;
        Ok(fresh)
    }

    // -------------------------------------------------------------- cascade

    /// Write one answered question: every touched review state, the topic and
    /// course aggregates, and the answer row, atomically. A duplicate answer
    /// for the same question index aborts the whole transaction.
    pub async fn apply_answer_cascade(
        &self,
        states: &[ReviewState],
        answer: &QuizAnswer,
    ) -> Result<(), EngineError> {
        let Some(first) = states.first() else {
            return Err(EngineError::InternalInvariantViolated(
                "cascade invoked with no review states".to_string(),
            ));
        };
        let student_id = first.student_id.clone();

        let mut tx = self.pool.begin().await?;

        for state in states {
            upsert_review_state_tx(&mut tx, state).await?;
        }

        let loop_ids: Vec<String> = states.iter().map(|s| s.core_loop_id.clone()).collect();
        let topics = topics_of_loops_tx(&mut tx, &loop_ids).await?;
        let mut courses: HashSet<String> = HashSet::new();
        for (topic_id, course_id) in &topics {
            recompute_topic_mastery_tx(&mut tx, &student_id, topic_id, answer.submitted_at)
                .await?;
            courses.insert(course_id.clone());
        }
        for course_id in &courses {
            recompute_course_mastery_tx(&mut tx, &student_id, course_id, answer.submitted_at)
                .await?;
        }

        let inserted = sqlx::query(
            "INSERT INTO quiz_answers \
             (session_id, question_index, exercise_id, user_answer, score, correct, hint_used, \
              time_taken_s, submitted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(answer.session_id.to_string())
        .bind(answer.question_index)
        .bind(&answer.exercise_id)
        .bind(&answer.user_answer)
        .bind(answer.score)
        .bind(answer.correct)
        .bind(answer.hint_used)
        .bind(answer.time_taken_s)
        .bind(answer.submitted_at.timestamp_millis())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(EngineError::AlreadyAnswered {
                    question_index: answer.question_index,
                });
            }
            Err(err) => return Err(err.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn topic_mastery(
        &self,
        student_id: &str,
        topic_id: &str,
    ) -> Result<Option<(f64, DateTime<Utc>)>, EngineError> {
        let row = sqlx::query(
            "SELECT mastery_score, last_updated FROM topic_mastery \
             WHERE student_id = ? AND topic_id = ? LIMIT 1",
        )
        .bind(student_id)
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_mastery_row))
    }

    pub async fn course_mastery(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<(f64, DateTime<Utc>)>, EngineError> {
        let row = sqlx::query(
            "SELECT mastery_score, last_updated FROM course_mastery \
             WHERE student_id = ? AND course_id = ? LIMIT 1",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_mastery_row))
    }

    // ------------------------------------------------------------- sessions

    pub async fn insert_session(&self, session: &QuizSession) -> Result<(), EngineError> {
        let filters =
            serde_json::to_string(&session.filters).unwrap_or_else(|_| "{}".to_string());
        let questions =
            serde_json::to_string(&session.question_ids).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO quiz_sessions \
             (id, student_id, course_id, quiz_type, filters_json, question_ids_json, created_at, \
              completed_at, state) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(&session.student_id)
        .bind(&session.course_id)
        .bind(session.quiz_type.as_str())
        .bind(&filters)
        .bind(&questions)
        .bind(session.created_at.timestamp_millis())
        .bind(session.completed_at.map(|dt| dt.timestamp_millis()))
        .bind(session.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn session(&self, id: Uuid) -> Result<Option<QuizSession>, EngineError> {
        let row = sqlx::query(
            "SELECT id, student_id, course_id, quiz_type, filters_json, question_ids_json, \
             created_at, completed_at, state \
             FROM quiz_sessions WHERE id = ? LIMIT 1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_session_row))
    }

    pub async fn set_session_state(
        &self,
        id: Uuid,
        state: SessionState,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE quiz_sessions SET state = ?, completed_at = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(completed_at.map(|dt| dt.timestamp_millis()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn answers_for_session(&self, id: Uuid) -> Result<Vec<QuizAnswer>, EngineError> {
        let rows = sqlx::query(
            "SELECT session_id, question_index, exercise_id, user_answer, score, correct, \
             hint_used, time_taken_s, submitted_at \
             FROM quiz_answers WHERE session_id = ? ORDER BY question_index",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(map_answer_row).collect())
    }

    pub async fn completed_sessions_for_course(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<QuizSession>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, student_id, course_id, quiz_type, filters_json, question_ids_json, \
             created_at, completed_at, state \
             FROM quiz_sessions \
             WHERE student_id = ? AND course_id = ? AND state = 'complete' \
             ORDER BY created_at DESC",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(map_session_row).collect())
    }

    /// Abandon open sessions created before the cutoff; returns how many.
    pub async fn abandon_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "UPDATE quiz_sessions SET state = 'abandoned' \
             WHERE state = 'open' AND created_at < ?",
        )
        .bind(cutoff.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Most recent answer scores touching one core loop, newest first.
    pub async fn recent_loop_scores(
        &self,
        student_id: &str,
        core_loop_id: &str,
        limit: i64,
    ) -> Result<Vec<f64>, EngineError> {
        let rows = sqlx::query(
            "SELECT qa.score FROM quiz_answers qa \
             JOIN quiz_sessions qs ON qs.id = qa.session_id \
             JOIN exercise_core_loops ecl ON ecl.exercise_id = qa.exercise_id \
             WHERE qs.student_id = ? AND ecl.core_loop_id = ? \
             ORDER BY qa.submitted_at DESC, qa.question_index DESC LIMIT ?",
        )
        .bind(student_id)
        .bind(core_loop_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.try_get::<f64, _>("score").unwrap_or(0.0))
            .collect())
    }

    // ------------------------------------------------------------ analytics

    pub async fn count_exercises(&self, course_id: &str) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exercises WHERE course_id = ? AND analyzed = 1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_core_loops(&self, course_id: &str) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM core_loops cl JOIN topics t ON t.id = cl.topic_id \
             WHERE t.course_id = ?",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_topics(&self, course_id: &str) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM topics WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_exercises_attempted(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT qa.exercise_id) FROM quiz_answers qa \
             JOIN quiz_sessions qs ON qs.id = qa.session_id \
             WHERE qs.student_id = ? AND qs.course_id = ?",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Exercises whose primary loop has crossed the mastery threshold.
    pub async fn count_exercises_mastered(
        &self,
        student_id: &str,
        course_id: &str,
        threshold: f64,
    ) -> Result<i64, EngineError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exercises e \
             JOIN review_state rs ON rs.core_loop_id = e.primary_core_loop_id \
             WHERE e.course_id = ? AND e.analyzed = 1 \
               AND rs.student_id = ? AND rs.mastery_score >= ?",
        )
        .bind(course_id)
        .bind(student_id)
        .bind(threshold)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn total_time_spent_s(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<f64, EngineError> {
        let total: Option<f64> = sqlx::query_scalar(
            "SELECT SUM(qa.time_taken_s) FROM quiz_answers qa \
             JOIN quiz_sessions qs ON qs.id = qa.session_id \
             WHERE qs.student_id = ? AND qs.course_id = ?",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0.0))
    }

    // --------------------------------------------------------- prerequisites

    pub async fn prereq_edges(&self) -> Result<Vec<(String, String)>, EngineError> {
        let rows = sqlx::query(
            "SELECT prereq_core_loop_id, dependent_core_loop_id FROM prerequisite_edges \
             ORDER BY prereq_core_loop_id, dependent_core_loop_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.try_get("prereq_core_loop_id").unwrap_or_default(),
                    row.try_get("dependent_core_loop_id").unwrap_or_default(),
                )
            })
            .collect())
    }

    pub async fn insert_prereq_edge(
        &self,
        prereq: &str,
        dependent: &str,
    ) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT OR IGNORE INTO prerequisite_edges \
             (prereq_core_loop_id, dependent_core_loop_id) VALUES (?, ?)",
        )
        .bind(prereq)
        .bind(dependent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ------------------------------------------------------------ tx helpers

async fn upsert_review_state_tx(
    tx: &mut Transaction<'_, Sqlite>,
    state: &ReviewState,
) -> Result<(), EngineError> {
    sqlx::query(
        "INSERT INTO review_state \
         (student_id, core_loop_id, easiness_factor, repetition_number, interval_days, \
          next_review, last_reviewed, total_attempts, correct_attempts, mastery_score) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(student_id, core_loop_id) DO UPDATE SET \
           easiness_factor = excluded.easiness_factor, \
           repetition_number = excluded.repetition_number, \
           interval_days = excluded.interval_days, \
           next_review = excluded.next_review, \
           last_reviewed = excluded.last_reviewed, \
           total_attempts = excluded.total_attempts, \
           correct_attempts = excluded.correct_attempts, \
           mastery_score = excluded.mastery_score",
    )
    .bind(&state.student_id)
    .bind(&state.core_loop_id)
    .bind(state.easiness_factor)
    .bind(state.repetition_number)
    .bind(state.interval_days)
    .bind(state.next_review.map(|dt| dt.timestamp_millis()))
    .bind(state.last_reviewed.map(|dt| dt.timestamp_millis()))
    .bind(state.total_attempts)
    .bind(state.correct_attempts)
    .bind(state.mastery_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn topics_of_loops_tx(
    tx: &mut Transaction<'_, Sqlite>,
    loop_ids: &[String],
) -> Result<Vec<(String, String)>, EngineError> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT DISTINCT t.id, t.course_id FROM core_loops cl \
         JOIN topics t ON t.id = cl.topic_id WHERE cl.id IN (",
    );
    {
        let mut sep = qb.separated(", ");
        for id in loop_ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(")");
    }
    let rows = qb.build().fetch_all(&mut **tx).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.try_get("id").unwrap_or_default(),
                row.try_get("course_id").unwrap_or_default(),
            )
        })
        .collect())
}

/// Topic mastery = mean of the topic's loop masteries weighted by attempts
/// (minimum weight 1), over loops with a review-state row.
async fn recompute_topic_mastery_tx(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: &str,
    topic_id: &str,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    sqlx::query(
        "INSERT INTO topic_mastery (student_id, topic_id, mastery_score, last_updated) \
         SELECT ?, ?, \
           COALESCE(SUM(rs.mastery_score * MAX(rs.total_attempts, 1)) \
                    / SUM(MAX(rs.total_attempts, 1)), 0.0), ? \
         FROM review_state rs \
         JOIN core_loops cl ON cl.id = rs.core_loop_id \
         WHERE rs.student_id = ? AND cl.topic_id = ? \
         ON CONFLICT(student_id, topic_id) DO UPDATE SET \
           mastery_score = excluded.mastery_score, \
           last_updated = excluded.last_updated",
    )
    .bind(student_id)
    .bind(topic_id)
    .bind(now.timestamp_millis())
    .bind(student_id)
    .bind(topic_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn recompute_course_mastery_tx(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: &str,
    course_id: &str,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    sqlx::query(
        "INSERT INTO course_mastery (student_id, course_id, mastery_score, last_updated) \
         SELECT ?, ?, \
           COALESCE(SUM(rs.mastery_score * MAX(rs.total_attempts, 1)) \
                    / SUM(MAX(rs.total_attempts, 1)), 0.0), ? \
         FROM review_state rs \
         JOIN core_loops cl ON cl.id = rs.core_loop_id \
         JOIN topics t ON t.id = cl.topic_id \
         WHERE rs.student_id = ? AND t.course_id = ? \
         ON CONFLICT(student_id, course_id) DO UPDATE SET \
           mastery_score = excluded.mastery_score, \
           last_updated = excluded.last_updated",
    )
    .bind(student_id)
    .bind(course_id)
    .bind(now.timestamp_millis())
    .bind(student_id)
    .bind(course_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ------------------------------------------------------------ row mapping

fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn map_topic_row(row: SqliteRow) -> Topic {
    Topic {
        id: row.try_get("id").unwrap_or_default(),
        course_id: row.try_get("course_id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        language: row.try_get("language").unwrap_or_default(),
    }
}

fn map_core_loop_row(row: SqliteRow) -> CoreLoop {
    CoreLoop {
        id: row.try_get("id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        kind: LoopKind::from_str(&row.try_get::<String, _>("type").unwrap_or_default()),
        topic_id: row.try_get("topic_id").unwrap_or_default(),
        language: row.try_get("language").unwrap_or_default(),
    }
}

fn map_exercise_row(row: SqliteRow) -> Exercise {
    let tags: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("tags").unwrap_or_default())
            .unwrap_or_default();
    Exercise {
        id: row.try_get("id").unwrap_or_default(),
        course_id: row.try_get("course_id").unwrap_or_default(),
        topic_id: row.try_get("topic_id").unwrap_or_default(),
        core_loop_ids: Vec::new(),
        difficulty: Difficulty::from_str(
            &row.try_get::<String, _>("difficulty").unwrap_or_default(),
        ),
        kind: ExerciseKind::from_str(&row.try_get::<String, _>("type").unwrap_or_default()),
        tags,
        analyzed: row.try_get("analyzed").unwrap_or(false),
    }
}

fn map_review_state_row(row: SqliteRow) -> ReviewState {
    ReviewState {
        student_id: row.try_get("student_id").unwrap_or_default(),
        core_loop_id: row.try_get("core_loop_id").unwrap_or_default(),
        easiness_factor: row.try_get("easiness_factor").unwrap_or(2.5),
        repetition_number: row.try_get("repetition_number").unwrap_or(0),
        interval_days: row.try_get("interval_days").unwrap_or(0),
        next_review: row
            .try_get::<Option<i64>, _>("next_review")
            .unwrap_or(None)
            .map(from_ms),
        last_reviewed: row
            .try_get::<Option<i64>, _>("last_reviewed")
            .unwrap_or(None)
            .map(from_ms),
        total_attempts: row.try_get("total_attempts").unwrap_or(0),
        correct_attempts: row.try_get("correct_attempts").unwrap_or(0),
        mastery_score: row.try_get("mastery_score").unwrap_or(0.0),
    }
}

fn map_session_row(row: SqliteRow) -> QuizSession {
    let filters: QuizFilters =
        serde_json::from_str(&row.try_get::<String, _>("filters_json").unwrap_or_default())
            .unwrap_or_default();
    let question_ids: Vec<String> = serde_json::from_str(
        &row.try_get::<String, _>("question_ids_json").unwrap_or_default(),
    )
    .unwrap_or_default();
    QuizSession {
        id: Uuid::parse_str(&row.try_get::<String, _>("id").unwrap_or_default())
            .unwrap_or_default(),
        student_id: row.try_get("student_id").unwrap_or_default(),
        course_id: row.try_get("course_id").unwrap_or_default(),
        quiz_type: QuizType::from_str(&row.try_get::<String, _>("quiz_type").unwrap_or_default()),
        filters,
        question_ids,
        created_at: from_ms(row.try_get("created_at").unwrap_or(0)),
        completed_at: row
            .try_get::<Option<i64>, _>("completed_at")
            .unwrap_or(None)
            .map(from_ms),
        state: SessionState::from_str(&row.try_get::<String, _>("state").unwrap_or_default()),
    }
}

fn map_answer_row(row: SqliteRow) -> QuizAnswer {
    QuizAnswer {
        session_id: Uuid::parse_str(&row.try_get::<String, _>("session_id").unwrap_or_default())
            .unwrap_or_default(),
        question_index: row.try_get("question_index").unwrap_or(0),
        exercise_id: row.try_get("exercise_id").unwrap_or_default(),
        user_answer: row.try_get("user_answer").unwrap_or_default(),
        score: row.try_get("score").unwrap_or(0.0),
        correct: row.try_get("correct").unwrap_or(false),
        hint_used: row.try_get("hint_used").unwrap_or(false),
        time_taken_s: row.try_get("time_taken_s").unwrap_or(0.0),
        submitted_at: from_ms(row.try_get("submitted_at").unwrap_or(0)),
    }
}

fn map_mastery_row(row: SqliteRow) -> (f64, DateTime<Utc>) {
    (
        row.try_get("mastery_score").unwrap_or(0.0),
        from_ms(row.try_get("last_updated").unwrap_or(0)),
    )
}
