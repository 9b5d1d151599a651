//! Quiz session lifecycle: create → next → submit → complete, with per-
//! session serialization and idempotent completion.
//!
//! The evaluator call happens before any transaction is opened, so database
//! locks are only held for the cascade write itself. A canceled or failed
//! evaluation therefore leaves no partial state behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::engine::cascade::{self, LoopRole};
use crate::engine::quality::map_quality;
use crate::engine::selector;
use crate::engine::types::{
    Difficulty, DifficultyBreakdown, EngineError, Evaluation, Exercise, NextQuestion, QuizAnswer,
    QuizFilters, QuizSession, QuizType, ReviewState, SessionState, SessionStatus, SessionSummary,
    SubmitOptions, SubmitOutcome,
};
use crate::engine::LearningEngine;

/// Pass mark for a completed session.
pub const PASS_PERCENT: f64 = 60.0;

const MAX_QUESTIONS_PER_SESSION: usize = 50;

/// One async mutex per live session id; `try_lock` failure surfaces as
/// `SessionBusy` instead of queueing a second writer.
#[derive(Default)]
pub(crate) struct SessionLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub(crate) fn lock_for(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        self.inner
            .lock()
            .entry(id)
            .or_insert_with(Default::default)
            .clone()
    }
}

impl LearningEngine {
    /// Select and freeze the question list, persist the session, return it.
    pub async fn create_session(
        &self,
        student_id: &str,
        course_id: &str,
        quiz_type: QuizType,
        count: usize,
        filters: QuizFilters,
        prioritize_due: bool,
    ) -> Result<QuizSession, EngineError> {
        if count == 0 {
            return Err(EngineError::InvalidFilter(
                "question count must be positive".to_string(),
            ));
        }
        let count = count.min(MAX_QUESTIONS_PER_SESSION);

        let id = Uuid::new_v4();
        let question_ids = selector::select_questions(
            &self.store,
            student_id,
            course_id,
            quiz_type,
            count,
            &filters,
            prioritize_due,
            selector::session_seed(&id),
            self.now(),
        )
        .await?;

        let session = QuizSession {
            id,
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            quiz_type,
            filters,
            question_ids,
            created_at: self.now(),
            completed_at: None,
            state: SessionState::Open,
        };
        self.store.insert_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            student_id = %student_id,
            course_id = %course_id,
            quiz_type = quiz_type.as_str(),
            questions = session.question_ids.len(),
            "quiz session created"
        );
        Ok(session)
    }

    /// First question index without a recorded answer, or `None` when every
    /// question has one.
    pub async fn next_question(
        &self,
        session_id: Uuid,
    ) -> Result<Option<NextQuestion>, EngineError> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.state != SessionState::Open {
            return Ok(None);
        }
        let answers = self.store.answers_for_session(session_id).await?;
        Ok(first_unanswered(&session, &answers))
    }

    /// Grade the expected next question and run the mastery cascade.
    ///
    /// Ordering is strict: the submitted exercise must be the first
    /// unanswered question. A re-submission of an answered index is rejected,
    /// never overwritten.
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        exercise_id: &str,
        user_answer: &str,
        time_taken_s: f64,
        hint_used: bool,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, EngineError> {
        let lock = self.session_locks.lock_for(session_id);
        let _guard = lock.try_lock().map_err(|_| EngineError::SessionBusy)?;

        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.state != SessionState::Open {
            return Err(EngineError::SessionComplete);
        }

        let answers = self.store.answers_for_session(session_id).await?;
        let answered: HashSet<i64> = answers.iter().map(|a| a.question_index).collect();
        let Some(next) = first_unanswered(&session, &answers) else {
            return Err(EngineError::SessionComplete);
        };

        if exercise_id != next.exercise_id {
            if let Some(position) = session
                .question_ids
                .iter()
                .position(|id| id == exercise_id)
            {
                if answered.contains(&(position as i64)) {
                    return Err(EngineError::AlreadyAnswered {
                        question_index: position as i64,
                    });
                }
            }
            return Err(EngineError::OutOfOrderSubmission {
                expected_index: next.question_index,
                expected_exercise: next.exercise_id,
                got: exercise_id.to_string(),
            });
        }

        let exercise = self
            .store
            .exercise(exercise_id)
            .await?
            .ok_or_else(|| {
                EngineError::InternalInvariantViolated(format!(
                    "session {session_id} references missing exercise '{exercise_id}'"
                ))
            })?;
        let language = self
            .store
            .topic(&exercise.topic_id)
            .await?
            .map(|t| t.language)
            .unwrap_or_else(|| "en".to_string());

        // The evaluator may block for seconds; it runs outside any
        // transaction and a failure here leaves no trace in the store.
        let evaluation = match self
            .evaluator
            .evaluate(exercise_id, user_answer, &language)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(err) if options.evaluator_fallback => {
                tracing::warn!(
                    session_id = %session_id,
                    exercise_id = %exercise_id,
                    error = %err,
                    "evaluator failed, recording a zero-score attempt"
                );
                Evaluation {
                    score: 0.0,
                    correct: false,
                    feedback: format!("[evaluation unavailable] {err}"),
                }
            }
            Err(err) => return Err(EngineError::EvaluatorUnavailable(err.to_string())),
        };

        let score = evaluation.score.clamp(0.0, 1.0);
        let time_ratio = options
            .expected_time_s
            .filter(|expected| *expected > 0.0)
            .map(|expected| time_taken_s / expected);
        let quality = map_quality(score, hint_used, time_ratio);
        let now = self.now();

        let current = self
            .store
            .review_states(&session.student_id, &exercise.core_loop_ids)
            .await?;
        let new_states: Vec<ReviewState> = exercise
            .core_loop_ids
            .iter()
            .enumerate()
            .map(|(index, loop_id)| {
                let state = current.get(loop_id).cloned().unwrap_or_else(|| {
                    ReviewState::new(session.student_id.clone(), loop_id.clone())
                });
                let role = if index == 0 {
                    LoopRole::Primary
                } else {
                    LoopRole::Secondary
                };
                cascade::advance_review_state(&state, role, quality, score, now)
            })
            .collect();

        let remaining = session.question_ids.len() - answered.len() - 1;

        if options.dry_run {
            return Ok(SubmitOutcome {
                correct: evaluation.correct,
                score,
                feedback: evaluation.feedback,
                review_state: new_states[0].clone(),
                remaining: remaining + 1,
            });
        }

        let answer = QuizAnswer {
            session_id,
            question_index: next.question_index,
            exercise_id: exercise_id.to_string(),
            user_answer: user_answer.to_string(),
            score,
            correct: evaluation.correct,
            hint_used,
            time_taken_s,
            submitted_at: now,
        };
        self.store.apply_answer_cascade(&new_states, &answer).await?;

        tracing::info!(
            session_id = %session_id,
            question_index = next.question_index,
            exercise_id = %exercise_id,
            score = score,
            quality = quality,
            remaining = remaining,
            "answer recorded"
        );

        Ok(SubmitOutcome {
            correct: evaluation.correct,
            score,
            feedback: evaluation.feedback,
            review_state: new_states[0].clone(),
            remaining,
        })
    }

    /// Close the session and return its summary. Completing an already
    /// completed session returns the same summary.
    pub async fn complete_session(
        &self,
        session_id: Uuid,
    ) -> Result<SessionSummary, EngineError> {
        let lock = self.session_locks.lock_for(session_id);
        let _guard = lock.try_lock().map_err(|_| EngineError::SessionBusy)?;

        let mut session = self
            .store
            .session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;

        match session.state {
            SessionState::Abandoned => return Err(EngineError::SessionComplete),
            SessionState::Complete => {}
            SessionState::Open => {
                let now = self.now();
                self.store
                    .set_session_state(session_id, SessionState::Complete, Some(now))
                    .await?;
                session.state = SessionState::Complete;
                session.completed_at = Some(now);
                tracing::info!(session_id = %session_id, "quiz session completed");
            }
        }

        self.build_summary(&session).await
    }

    /// Walk away from an open session. Idempotent.
    pub async fn abandon_session(&self, session_id: Uuid) -> Result<(), EngineError> {
        let lock = self.session_locks.lock_for(session_id);
        let _guard = lock.try_lock().map_err(|_| EngineError::SessionBusy)?;

        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;
        match session.state {
            SessionState::Complete => Err(EngineError::SessionComplete),
            SessionState::Abandoned => Ok(()),
            SessionState::Open => {
                self.store
                    .set_session_state(session_id, SessionState::Abandoned, None)
                    .await?;
                tracing::info!(session_id = %session_id, "quiz session abandoned");
                Ok(())
            }
        }
    }

    pub async fn session_status(
        &self,
        session_id: Uuid,
    ) -> Result<SessionStatus, EngineError> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;
        let answers = self.store.answers_for_session(session_id).await?;
        let next_question = if session.state == SessionState::Open {
            first_unanswered(&session, &answers)
        } else {
            None
        };
        let summary = if session.state == SessionState::Complete {
            Some(self.build_summary(&session).await?)
        } else {
            None
        };
        Ok(SessionStatus {
            answered: answers.len(),
            next_question,
            summary,
            session,
        })
    }

    /// Abandon open sessions older than `max_age`; used by the hygiene
    /// worker.
    pub async fn abandon_stale_sessions(&self, max_age: Duration) -> Result<u64, EngineError> {
        let cutoff = self.now()
            - chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        self.store.abandon_stale_sessions(cutoff).await
    }

    async fn build_summary(
        &self,
        session: &QuizSession,
    ) -> Result<SessionSummary, EngineError> {
        let answers = self.store.answers_for_session(session.id).await?;
        let answer_by_exercise: HashMap<&str, &QuizAnswer> = answers
            .iter()
            .map(|a| (a.exercise_id.as_str(), a))
            .collect();

        let mut exercises: Vec<Exercise> = Vec::with_capacity(session.question_ids.len());
        for question_id in &session.question_ids {
            let exercise = self.store.exercise(question_id).await?.ok_or_else(|| {
                EngineError::InternalInvariantViolated(format!(
                    "session {} references missing exercise '{question_id}'",
                    session.id
                ))
            })?;
            exercises.push(exercise);
        }

        let total_questions = session.question_ids.len();
        let score_sum: f64 = answers.iter().map(|a| a.score).sum();
        let percent = if total_questions == 0 {
            0.0
        } else {
            score_sum / total_questions as f64 * 100.0
        };

        let mut buckets: HashMap<Difficulty, DifficultyBreakdown> = HashMap::new();
        for exercise in &exercises {
            let bucket = buckets
                .entry(exercise.difficulty)
                .or_insert_with(|| DifficultyBreakdown {
                    difficulty: exercise.difficulty,
                    total: 0,
                    answered: 0,
                    correct: 0,
                    avg_score: 0.0,
                });
            bucket.total += 1;
            if let Some(answer) = answer_by_exercise.get(exercise.id.as_str()) {
                bucket.answered += 1;
                if answer.correct {
                    bucket.correct += 1;
                }
                bucket.avg_score += answer.score;
            }
        }
        let mut by_difficulty: Vec<DifficultyBreakdown> = buckets
            .into_values()
            .map(|mut b| {
                if b.answered > 0 {
                    b.avg_score /= b.answered as f64;
                }
                b
            })
            .collect();
        by_difficulty.sort_by_key(|b| b.difficulty.rank());

        Ok(SessionSummary {
            session_id: session.id,
            total_questions,
            answered: answers.len(),
            percent,
            passed: percent >= PASS_PERCENT,
            by_difficulty,
            completed_at: session.completed_at.unwrap_or_else(|| self.now()),
        })
    }
}

fn first_unanswered(session: &QuizSession, answers: &[QuizAnswer]) -> Option<NextQuestion> {
    let answered: HashSet<i64> = answers.iter().map(|a| a.question_index).collect();
    (0..session.question_ids.len() as i64)
        .find(|index| !answered.contains(index))
        .map(|index| NextQuestion {
            question_index: index,
            exercise_id: session.question_ids[index as usize].clone(),
        })
}
