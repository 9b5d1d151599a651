//! Per-answer mastery cascade arithmetic.
//!
//! An answered exercise touches the review state of every core loop it is
//! linked to. The SM-2 schedule advances with the same quality grade for all
//! of them; the mastery EWMA moves at full rate for the primary loop and at
//! half rate for secondary loops. The transactional write-out lives in the
//! store; this module is pure.

use chrono::{DateTime, Utc};

use crate::engine::sm2::{self, Sm2State};
use crate::engine::types::ReviewState;

/// EWMA rate for an exercise's primary core loop.
pub const ALPHA_PRIMARY: f64 = 0.3;
/// EWMA rate for secondary loops (half weight).
pub const ALPHA_SECONDARY: f64 = 0.15;
/// A score at or above this counts as a correct attempt.
pub const CORRECT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRole {
    Primary,
    Secondary,
}

impl LoopRole {
    fn alpha(self) -> f64 {
        match self {
            Self::Primary => ALPHA_PRIMARY,
            Self::Secondary => ALPHA_SECONDARY,
        }
    }
}

/// Advance one loop's review state by one answer.
pub fn advance_review_state(
    state: &ReviewState,
    role: LoopRole,
    quality: u8,
    score: f64,
    now: DateTime<Utc>,
) -> ReviewState {
    let sm2_out = sm2::schedule(
        quality,
        Sm2State {
            easiness_factor: state.easiness_factor,
            repetition_number: state.repetition_number,
            interval_days: state.interval_days,
        },
        now,
    );

    let alpha = role.alpha();
    let mastery = ((1.0 - alpha) * state.mastery_score + alpha * score).clamp(0.0, 1.0);

    ReviewState {
        student_id: state.student_id.clone(),
        core_loop_id: state.core_loop_id.clone(),
        easiness_factor: sm2_out.state.easiness_factor,
        repetition_number: sm2_out.state.repetition_number,
        interval_days: sm2_out.state.interval_days,
        next_review: Some(sm2_out.due),
        last_reviewed: Some(now),
        total_attempts: state.total_attempts + 1,
        correct_attempts: state.correct_attempts
            + if score >= CORRECT_THRESHOLD { 1 } else { 0 },
        mastery_score: mastery,
    }
}
