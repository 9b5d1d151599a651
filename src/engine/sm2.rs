//! SM-2 spaced-repetition scheduler.
//!
//! Pure arithmetic over (quality, easiness, repetition count, interval); the
//! only clock is the `now` argument, so outputs are fully deterministic.

use chrono::{DateTime, Duration, Utc};

pub const MIN_EASINESS: f64 = 1.3;
pub const MAX_EASINESS: f64 = 2.5;
pub const INITIAL_EASINESS: f64 = 2.5;

/// Quality at or above this counts as a passing answer.
pub const PASS_QUALITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2State {
    pub easiness_factor: f64,
    pub repetition_number: i64,
    pub interval_days: i64,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            easiness_factor: INITIAL_EASINESS,
            repetition_number: 0,
            interval_days: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2Outcome {
    pub state: Sm2State,
    pub due: DateTime<Utc>,
}

/// Advance an SM-2 record by one graded answer.
///
/// A failing answer (quality < 3) resets the repetition count and schedules a
/// retry in one day; the easiness factor moves only on passing answers and is
/// clamped to [1.3, 2.5] in every case. The interval for the third repetition
/// onward multiplies by the easiness the record entered the review with.
pub fn schedule(quality: u8, state: Sm2State, now: DateTime<Utc>) -> Sm2Outcome {
    let quality = quality.min(5);

    let next = if quality < PASS_QUALITY {
        Sm2State {
            easiness_factor: clamp_easiness(state.easiness_factor),
            repetition_number: 0,
            interval_days: 1,
        }
    } else {
        let interval_days = match state.repetition_number {
            0 => 1,
            1 => 6,
            _ => (state.interval_days as f64 * state.easiness_factor).round() as i64,
        };
        Sm2State {
            easiness_factor: clamp_easiness(adjust_easiness(state.easiness_factor, quality)),
            repetition_number: state.repetition_number + 1,
            interval_days,
        }
    };

    Sm2Outcome {
        due: now + Duration::days(next.interval_days),
        state: next,
    }
}

fn adjust_easiness(easiness: f64, quality: u8) -> f64 {
    let q = quality as f64;
    easiness + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02))
}

fn clamp_easiness(easiness: f64) -> f64 {
    easiness.clamp(MIN_EASINESS, MAX_EASINESS)
}
